mod config;
mod error;
mod retry;

pub(crate) use config::*;
pub use error::*;
pub use retry::*;
