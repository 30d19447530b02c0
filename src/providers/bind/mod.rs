//! Zone files on disk, one `<zone>.zone` per domain.

mod config;
mod provider;

pub use config::Config;
pub use provider::{Bind, PROVIDER_NAME};

use crate::audit::Auditor;
use crate::common::Result;
use crate::providers::{Capability, DnsProvider, DnsConstructor, Features, Limits, ProviderType, Settings};

fn new_provider(name: &str, settings: &Settings) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(Bind::new(Config::from_settings(name, settings)?)))
}

pub fn provider_type() -> ProviderType {
    ProviderType {
        name: PROVIDER_NAME,
        features: Features::new()
            .can(Capability::CanUseCAA)
            .can(Capability::CanUseDHCID)
            .can(Capability::CanUseDNAME)
            .can(Capability::CanUseDNSKEY)
            .can(Capability::CanUseDS)
            .can(Capability::CanUseDSForChildren)
            .can(Capability::CanUseHTTPS)
            .can(Capability::CanUseLOC)
            .can(Capability::CanUseNAPTR)
            .can(Capability::CanUsePTR)
            .can(Capability::CanUseSOA)
            .can(Capability::CanUseSRV)
            .can(Capability::CanUseSSHFP)
            .can(Capability::CanUseSVCB)
            .can(Capability::CanUseTLSA)
            .can(Capability::CanGetZones)
            .can(Capability::CanConcur)
            .can(Capability::DocCreateDomains)
            .can(Capability::DocDualHost)
            .cannot(Capability::CanUseAlias, "ALIAS has no zone file representation")
            .cannot(Capability::CanAutoDNSSEC, "sign the zone with the name server instead"),
        limits: Limits {
            split_txt: true,
            ..Default::default()
        },
        auditor: Auditor::new(),
        dns: Some(new_provider as DnsConstructor),
        registrar: None,
        custom_rtypes: &[],
    }
}
