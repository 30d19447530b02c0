//! A registrar whose delegations live in a local JSON document.

mod config;
mod registrar;

pub use config::Config;
pub use registrar::JSONFileRegistrar;

use crate::audit::Auditor;
use crate::common::Result;
use crate::providers::{Features, Limits, ProviderType, Registrar, RegistrarConstructor, Settings};

pub const PROVIDER_NAME: &str = "JSONFILE";

fn new_registrar(name: &str, settings: &Settings) -> Result<Box<dyn Registrar>> {
    Ok(Box::new(JSONFileRegistrar::from(Config::from_settings(name, settings)?)))
}

pub fn provider_type() -> ProviderType {
    ProviderType {
        name: PROVIDER_NAME,
        features: Features::new(),
        limits: Limits::default(),
        auditor: Auditor::new(),
        dns: None,
        registrar: Some(new_registrar as RegistrarConstructor),
        custom_rtypes: &[],
    }
}
