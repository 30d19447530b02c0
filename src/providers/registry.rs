use std::collections::BTreeMap;

use crate::audit::Auditor;
use crate::common::{ConfigSnafu, RecordSnafu, Result};
use crate::models::RecordType;

use super::{Capability, DnsProvider, Features, Registrar};

pub type Settings = BTreeMap<String, String>;
pub type DnsConstructor = fn(&str, &Settings) -> Result<Box<dyn DnsProvider>>;
pub type RegistrarConstructor = fn(&str, &Settings) -> Result<Box<dyn Registrar>>;

/// Numeric and placement limits of a provider, applied to desired records
/// before they are audited.
#[derive(Clone, Debug)]
pub struct Limits {
    pub min_ttl: u32,
    pub max_ttl: u32,
    pub alias_off_apex: bool,
    pub apex_ns_editable: bool,
    /// Split TXT strings longer than 255 octets instead of rejecting them.
    pub split_txt: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_ttl: 1,
            max_ttl: u32::MAX,
            alias_off_apex: false,
            apex_ns_editable: true,
            split_txt: false,
        }
    }
}

/// Everything known about one kind of provider.
pub struct ProviderType {
    pub name: &'static str,
    pub features: Features,
    pub limits: Limits,
    pub auditor: Auditor,
    pub dns: Option<DnsConstructor>,
    pub registrar: Option<RegistrarConstructor>,
    /// Synthetic record types only this provider type understands.
    pub custom_rtypes: &'static [&'static str],
}

/// A configured DNS provider.
pub struct ProviderInstance {
    pub name: String,
    pub type_name: &'static str,
    pub features: Features,
    pub limits: Limits,
    pub auditor: Auditor,
    pub driver: Box<dyn DnsProvider>,
}

/// A configured registrar.
pub struct RegistrarInstance {
    pub name: String,
    pub type_name: &'static str,
    pub driver: Box<dyn Registrar>,
}

/// Provider types by name, plus the custom record types they own.
#[derive(Default)]
pub struct Registry {
    types: BTreeMap<&'static str, ProviderType>,
    custom_rtypes: BTreeMap<String, &'static str>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the drivers shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::providers::bind::provider_type());
        registry.register(crate::providers::cloudflare::provider_type());
        registry.register(crate::providers::jsonfile::provider_type());
        registry.register(crate::providers::none::provider_type());
        registry
    }

    pub fn register(&mut self, provider_type: ProviderType) {
        tracing::debug!(provider = provider_type.name, "Registered provider type");
        for rtype in provider_type.custom_rtypes {
            self.custom_rtypes
                .insert(rtype.to_ascii_uppercase(), provider_type.name);
        }
        self.types.insert(provider_type.name, provider_type);
    }

    pub fn get(&self, type_name: &str) -> Option<&ProviderType> {
        self.types.get(type_name.to_ascii_uppercase().as_str())
    }

    /// Makes `name` a record type that only `type_name` providers accept.
    pub fn register_custom_rtype(&mut self, name: &str, type_name: &str) -> Result<()> {
        let rtype: RecordType = name.parse().map_err(|message| RecordSnafu { message }.build())?;
        let RecordType::Custom(upper) = rtype else {
            return RecordSnafu {
                message: format!("{name} is a builtin record type"),
            }
            .fail();
        };
        let Some(owner) = self.get(type_name).map(|t| t.name) else {
            return RecordSnafu {
                message: format!("cannot register {upper} for unknown provider type {type_name}"),
            }
            .fail();
        };
        match self.custom_rtypes.get(&upper) {
            Some(existing) if *existing != owner => RecordSnafu {
                message: format!("{upper} is already registered by {existing}"),
            }
            .fail(),
            _ => {
                self.custom_rtypes.insert(upper, owner);
                Ok(())
            }
        }
    }

    /// The provider type owning a custom record type.
    pub fn custom_rtype_owner(&self, rtype: &RecordType) -> Option<&'static str> {
        match rtype {
            RecordType::Custom(name) => self.custom_rtypes.get(name).copied(),
            _ => None,
        }
    }

    fn lookup(&self, name: &str, type_name: &str) -> Result<&ProviderType> {
        self.get(type_name).ok_or_else(|| {
            ConfigSnafu {
                message: format!("unknown provider type {type_name}"),
                prefix: name,
            }
            .build()
        })
    }

    /// Builds the DNS provider `name` of type `type_name`.
    pub fn dns_provider(&self, name: &str, type_name: &str, settings: &Settings) -> Result<ProviderInstance> {
        let provider_type = self.lookup(name, type_name)?;
        let Some(ctor) = provider_type.dns else {
            return ConfigSnafu {
                message: format!("{} is not a DNS provider", provider_type.name),
                prefix: name,
            }
            .fail();
        };
        let driver = ctor(name, settings)?;
        tracing::info!(provider = name, kind = provider_type.name, "Configured DNS provider");
        Ok(ProviderInstance {
            name: name.to_string(),
            type_name: provider_type.name,
            features: provider_type.features.clone(),
            limits: provider_type.limits.clone(),
            auditor: provider_type.auditor.clone(),
            driver,
        })
    }

    /// Builds the registrar `name` of type `type_name`.
    pub fn registrar(&self, name: &str, type_name: &str, settings: &Settings) -> Result<RegistrarInstance> {
        let provider_type = self.lookup(name, type_name)?;
        let Some(ctor) = provider_type.registrar else {
            return ConfigSnafu {
                message: format!("{} is not a registrar", provider_type.name),
                prefix: name,
            }
            .fail();
        };
        let driver = ctor(name, settings)?;
        tracing::info!(registrar = name, kind = provider_type.name, "Configured registrar");
        Ok(RegistrarInstance {
            name: name.to_string(),
            type_name: provider_type.name,
            driver,
        })
    }

    /// Whether every given provider type may run on several threads.
    pub fn all_concur<'n>(&self, type_names: impl IntoIterator<Item = &'n str>) -> bool {
        type_names.into_iter().all(|name| {
            self.get(name)
                .is_some_and(|t| t.features.supports(Capability::CanConcur))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::with_builtin()
    }

    #[test]
    fn builtin_types_are_found_case_insensitively() {
        let registry = registry();
        assert_eq!(registry.get("bind").unwrap().name, "BIND");
        assert!(registry.get("CLOUDFLAREAPI").is_some());
        assert!(registry.get("route53").is_none());
    }

    #[test]
    fn custom_rtypes_belong_to_one_provider() {
        let mut registry = registry();
        registry.register_custom_rtype("bind_include", "bind").unwrap();
        let rtype: RecordType = "BIND_INCLUDE".parse().unwrap();
        assert_eq!(registry.custom_rtype_owner(&rtype), Some("BIND"));
        assert!(registry.register_custom_rtype("BIND_INCLUDE", "CLOUDFLAREAPI").is_err());
        assert!(registry.register_custom_rtype("BIND_INCLUDE", "BIND").is_ok());
        assert!(registry.register_custom_rtype("MX", "BIND").is_err());
        assert!(registry.register_custom_rtype("WHATEVER", "NOPE").is_err());
        assert_eq!(registry.custom_rtype_owner(&RecordType::A), None);
    }

    #[test]
    fn provider_types_bring_their_custom_rtypes() {
        let registry = registry();
        for name in ["CF_REDIRECT", "CF_TEMP_REDIRECT", "CF_WORKER_ROUTE"] {
            let rtype: RecordType = name.parse().unwrap();
            assert_eq!(registry.custom_rtype_owner(&rtype), Some("CLOUDFLAREAPI"), "{name}");
        }
        let mut registry = registry;
        assert!(registry.register_custom_rtype("cf_redirect", "BIND").is_err());
    }

    #[test]
    fn roles_are_checked() {
        let registry = registry();
        let settings = Settings::new();
        assert!(registry.dns_provider("reg", "JSONFILE", &settings).is_err());
        assert!(registry.registrar("dns", "BIND", &settings).is_err());
        assert!(registry.dns_provider("dns", "NONE", &settings).is_ok());
        assert!(registry.registrar("reg", "NONE", &settings).is_ok());
    }

    #[test]
    fn concurrency_needs_every_type() {
        let registry = registry();
        assert!(registry.all_concur(["BIND", "NONE"]));
        assert!(!registry.all_concur(["BIND", "CLOUDFLAREAPI"]));
    }
}
