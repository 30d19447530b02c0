//! The Cloudflare v4 REST API.

mod config;
mod models;
mod provider;
mod rdata;
mod rules;

pub use config::Config;
pub use models::{META_PROXY, META_PROXY_DEFAULT};
pub use provider::Cloudflare;
pub use rules::{CF_REDIRECT, CF_TEMP_REDIRECT, CF_WORKER_ROUTE};

use crate::audit::{Auditor, RejectIf};
use crate::common::Result;
use crate::models::RecordType;
use crate::providers::{Capability, DnsConstructor, DnsProvider, Features, Limits, ProviderType, Settings};

pub const PROVIDER_NAME: &str = "CLOUDFLAREAPI";

fn new_provider(name: &str, settings: &Settings) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(Cloudflare::new(name, Config::from_settings(name, settings)?)))
}

pub fn provider_type() -> ProviderType {
    ProviderType {
        name: PROVIDER_NAME,
        features: Features::new()
            .can(Capability::CanUseAlias)
            .can(Capability::CanUseCAA)
            .can(Capability::CanUsePTR)
            .can(Capability::CanUseSRV)
            .can(Capability::CanUseTLSA)
            .can(Capability::CanUseSSHFP)
            .can(Capability::CanUseDSForChildren)
            .can(Capability::CanUseNAPTR)
            .can(Capability::CanUseLOC)
            .can(Capability::CanUseHTTPS)
            .can(Capability::CanUseSVCB)
            .can(Capability::CanGetZones)
            .can(Capability::CanAutoDNSSEC)
            .can(Capability::DocCreateDomains)
            .cannot(Capability::CanUseSOA, "the SOA is managed by Cloudflare")
            .cannot(Capability::CanUseDNSKEY, "keys are managed by Cloudflare's DNSSEC")
            .cannot(Capability::CanUseDHCID, "not offered by the API")
            .cannot(Capability::CanUseDNAME, "not offered by the API")
            .cannot(Capability::CanConcur, "not verified to be safe across zones")
            .cannot(Capability::DocDualHost, "apex NS records cannot be changed"),
        limits: Limits {
            min_ttl: 60,
            max_ttl: 86400,
            alias_off_apex: false,
            apex_ns_editable: false,
            split_txt: false,
        },
        auditor: Auditor::new()
            .reject(RecordType::CAA, RejectIf::CaaTargetContainsWhitespace)
            .reject(RecordType::MX, RejectIf::MxNull)
            .reject(RecordType::SRV, RejectIf::SrvHasNullTarget)
            .reject(RecordType::TXT, RejectIf::TxtIsEmpty),
        custom_rtypes: rules::CUSTOM_RTYPES,
        dns: Some(new_provider as DnsConstructor),
        registrar: None,
    }
}
