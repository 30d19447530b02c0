use std::path::PathBuf;

use crate::common::{ConfigSnafu, Result};
use crate::providers::Settings;

#[derive(Clone)]
pub struct Config {
    /// JSON document mapping each domain to its name servers.
    pub source: PathBuf,
}

impl Config {
    pub fn from_settings(name: &str, settings: &Settings) -> Result<Self> {
        match settings.get("source") {
            Some(source) => Ok(Self {
                source: PathBuf::from(source),
            }),
            None => ConfigSnafu {
                message: "missing required setting source",
                prefix: name,
            }
            .fail(),
        }
    }
}
