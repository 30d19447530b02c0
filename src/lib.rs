pub mod audit;
pub mod common;
pub mod config;
pub mod diff;
pub mod dnscache;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod registrar;
pub mod soa;
pub mod spflib;
pub mod zonefile;

pub use config::*;
