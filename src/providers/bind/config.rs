use std::path::PathBuf;

use crate::common::{numeric_setting, Result};
use crate::models::{nameservers_from, Nameserver};
use crate::providers::Settings;
use crate::soa::SoaDefaults;

const DEFAULT_DIRECTORY: &str = "zones";

#[derive(Clone, Debug)]
pub struct Config {
    /// Where `<zone>.zone` files live.
    pub directory: PathBuf,
    pub nameservers: Vec<Nameserver>,
    pub soa: SoaDefaults,
}

impl Config {
    /// Reads `directory`, `nameservers` (comma separated) and the
    /// `soa_*` defaults.
    pub fn from_settings(name: &str, settings: &Settings) -> Result<Self> {
        let directory = settings
            .get("directory")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY));
        let nameservers: Vec<&str> = settings
            .get("nameservers")
            .map(|list| list.split(',').map(str::trim).filter(|ns| !ns.is_empty()).collect())
            .unwrap_or_default();

        let number = |key: &str| -> Result<u32> {
            Ok(numeric_setting::<u32>(settings, key, name)?.unwrap_or(0))
        };
        let text = |key: &str| settings.get(key).cloned().unwrap_or_default();
        let soa = SoaDefaults {
            ns: text("soa_ns"),
            mbox: text("soa_mbox"),
            serial: 0,
            refresh: number("soa_refresh")?,
            retry: number("soa_retry")?,
            expire: number("soa_expire")?,
            minttl: number("soa_minttl")?,
            ttl: number("soa_ttl")?,
        };

        Ok(Self {
            directory,
            nameservers: nameservers_from(&nameservers),
            soa,
        })
    }
}
