//! The contract between the core and provider drivers, plus the drivers
//! that ship with the crate.

mod capabilities;
mod registry;
mod traits;

pub mod bind;
pub mod cloudflare;
pub mod jsonfile;
pub mod none;

pub use capabilities::*;
pub use registry::*;
pub use traits::*;
