use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::common::{ConfigSnafu, IoSnafu, ProviderSnafu, Result};
use crate::dnscache::{CacheMode, DnsCache};
use crate::models::{normalize_origin, DomainConfig};
use crate::providers::{ProviderInstance, RegistrarInstance, Registry, Settings};
use crate::zonefile::parse_dsl_file;

/// One configured provider: its type plus driver settings. Settings
/// starting with `@` are read from that file.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: Settings,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Domains processed at once when every provider allows it.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub spf_cache: Option<PathBuf>,
    #[serde(default)]
    pub spf_cache_mode: CacheMode,
    /// A DSL file declaring more domains. Relative paths are resolved
    /// against the directory of the configuration file.
    pub dsl: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    1
}

/// Provider instances built from a [`Config`], by instance name.
pub struct Providers {
    pub dns: BTreeMap<String, ProviderInstance>,
    pub registrars: BTreeMap<String, RegistrarInstance>,
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).boxed().context(ProviderSnafu {
            provider: "config",
            message: "Failed to parse configuration",
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).context(IoSnafu { path })?;
        let mut config = Self::from_json_str(&text)?;
        config.load_dsl(path.parent().unwrap_or(Path::new(".")))?;
        Ok(config)
    }

    /// Appends the domains of the `dsl` file, if one is configured. A
    /// domain may only be declared once across both sources.
    pub fn load_dsl(&mut self, base: &Path) -> Result<()> {
        let Some(dsl) = &self.dsl else {
            return Ok(());
        };
        let path = base.join(dsl);
        let declared = parse_dsl_file(&path)?;
        tracing::debug!(path = %path.display(), domains = declared.len(), "Loaded DSL");
        for dc in declared {
            let name = normalize_origin(&dc.name);
            if self.domains.iter().any(|existing| normalize_origin(&existing.name) == name) {
                return ConfigSnafu {
                    message: format!("{name} is declared in both the configuration and the DSL"),
                    prefix: path.display().to_string(),
                }
                .fail();
            }
            self.domains.push(dc);
        }
        Ok(())
    }

    /// Loads a JSON file overlaid with `ZONESYNC__*` environment variables,
    /// e.g. `ZONESYNC__PROVIDERS__CF__API_TOKEN`.
    #[cfg(feature = "cli")]
    pub fn load(path: &Path) -> Result<Self> {
        let to_error = |err: config::ConfigError| {
            crate::common::ConfigSnafu {
                message: err.to_string(),
                prefix: path.display().to_string(),
            }
            .build()
        };
        let mut loaded: Self = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(config::Environment::with_prefix("ZONESYNC").separator("__"))
            .build()
            .map_err(to_error)?
            .try_deserialize()
            .map_err(to_error)?;
        loaded.load_dsl(path.parent().unwrap_or(Path::new(".")))?;
        Ok(loaded)
    }

    /// Instantiates every configured provider. A type that is both a DNS
    /// provider and a registrar yields both.
    pub fn build_providers(&self, registry: &Registry) -> Result<Providers> {
        let mut providers = Providers {
            dns: BTreeMap::new(),
            registrars: BTreeMap::new(),
        };
        for (name, provider) in &self.providers {
            let Some(provider_type) = registry.get(&provider.kind) else {
                return ConfigSnafu {
                    message: format!("unknown provider type {}", provider.kind),
                    prefix: name,
                }
                .fail();
            };
            if provider_type.dns.is_some() {
                let instance = registry.dns_provider(name, &provider.kind, &provider.settings)?;
                providers.dns.insert(name.clone(), instance);
            }
            if provider_type.registrar.is_some() {
                let instance = registry.registrar(name, &provider.kind, &provider.settings)?;
                providers.registrars.insert(name.clone(), instance);
            }
        }
        Ok(providers)
    }

    /// The lookup cache SPF flattening resolves through.
    pub fn dns_cache(&self) -> Result<DnsCache> {
        match &self.spf_cache {
            Some(path) => DnsCache::load(path, self.spf_cache_mode),
            None => Ok(DnsCache::new(self.spf_cache_mode)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "providers": {
            "zones": {"type": "bind", "directory": "/var/named"},
            "off": {"type": "NONE"},
            "delegations": {"type": "jsonfile", "source": "/tmp/delegations.json"}
        },
        "domains": [
            {"name": "example.com", "registrar": "delegations", "dns_providers": {"zones": -1}}
        ],
        "concurrency": 4,
        "spf_cache_mode": "preloaded"
    }"#;

    #[test]
    fn parses_json() {
        let config = Config::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.domains.len(), 1);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.spf_cache_mode, CacheMode::Preloaded);
        let zones = &config.providers["zones"];
        assert_eq!(zones.kind, "bind");
        assert_eq!(zones.settings["directory"], "/var/named");
        assert!(!zones.settings.contains_key("type"));
    }

    #[test]
    fn defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.spf_cache_mode, CacheMode::Live);
        assert!(config.dns_cache().unwrap().is_empty());
    }

    #[test]
    fn builds_instances_by_role() {
        let config = Config::from_json_str(SAMPLE).unwrap();
        let providers = config.build_providers(&Registry::with_builtin()).unwrap();
        assert_eq!(providers.dns.keys().collect::<Vec<_>>(), vec!["off", "zones"]);
        assert_eq!(providers.registrars.keys().collect::<Vec<_>>(), vec!["delegations", "off"]);
    }

    #[test]
    fn unknown_types_are_config_errors() {
        let config = Config::from_json_str(r#"{"providers": {"x": {"type": "ROUTE53"}}}"#).unwrap();
        let err = config.build_providers(&Registry::with_builtin()).err().unwrap();
        assert!(err.to_string().starts_with("x: unknown provider type"), "{err}");
    }

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zonesync.json");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().providers.len(), 3);
        assert!(Config::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn dsl_domains_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("zones.js"),
            "var BIND = NewDnsProvider('zones');\nD('example.org', 'delegations', DnsProvider(BIND), A('@', '192.0.2.1'))",
        )
        .unwrap();
        let with_dsl = SAMPLE.replacen('{', r#"{"dsl": "zones.js","#, 1);
        let path = dir.path().join("zonesync.json");
        std::fs::write(&path, &with_dsl).unwrap();

        let config = Config::from_file(&path).unwrap();
        let names: Vec<_> = config.domains.iter().map(|dc| dc.name.as_str()).collect();
        assert_eq!(names, vec!["example.com", "example.org"]);
        assert_eq!(config.domains[1].dns_providers["zones"], -1);
        assert_eq!(config.domains[1].records.len(), 1);

        std::fs::write(dir.path().join("zones.js"), "D('example.com', 'none')").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("declared in both"), "{err}");

        std::fs::write(dir.path().join("zones.js"), "D('example.net', 'none', BOGUS)").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("BOGUS is not defined"), "{err}");
    }
}
