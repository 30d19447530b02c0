//! A provider and registrar that have nothing and change nothing.

use std::collections::BTreeMap;

use crate::audit::Auditor;
use crate::common::Result;
use crate::models::{Correction, DomainConfig, Nameserver, Records};

use super::{
    Capability, DnsConstructor, DnsProvider, Features, Limits, ProviderType, Registrar,
    RegistrarConstructor, Settings,
};

pub const PROVIDER_NAME: &str = "NONE";

pub struct NoneProvider;

impl DnsProvider for NoneProvider {
    fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        Ok(Vec::new())
    }

    fn get_zone_records(&self, _domain: &str, _meta: &BTreeMap<String, String>) -> Result<Records> {
        Ok(Records::new())
    }

    fn get_zone_records_corrections<'a>(
        &'a self,
        _dc: &DomainConfig,
        _existing: Records,
    ) -> Result<(Vec<Correction<'a>>, usize)> {
        Ok((Vec::new(), 0))
    }
}

impl Registrar for NoneProvider {
    fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        Ok(Vec::new())
    }

    fn set_nameservers(&self, _domain: &str, _nameservers: &[Nameserver]) -> Result<()> {
        Ok(())
    }

    fn get_registrar_corrections<'a>(
        &'a self,
        _domain: &str,
        _desired: &[Nameserver],
    ) -> Result<Vec<Correction<'a>>> {
        Ok(Vec::new())
    }
}

fn new_provider(_name: &str, _settings: &Settings) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NoneProvider))
}

fn new_registrar(_name: &str, _settings: &Settings) -> Result<Box<dyn Registrar>> {
    Ok(Box::new(NoneProvider))
}

pub fn provider_type() -> ProviderType {
    let mut features = Features::new();
    for rtype in crate::models::RecordType::BUILTIN.iter() {
        if let Some(capability) = Capability::for_rtype(rtype) {
            features = features.can(capability);
        }
    }
    ProviderType {
        name: PROVIDER_NAME,
        features: features.can(Capability::CanConcur),
        limits: Limits {
            alias_off_apex: true,
            ..Default::default()
        },
        auditor: Auditor::new(),
        dns: Some(new_provider as DnsConstructor),
        registrar: Some(new_registrar as RegistrarConstructor),
        custom_rtypes: &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_everything_and_does_nothing() {
        let provider = NoneProvider;
        let dc = DomainConfig::new("example.com");
        let (corrections, actual) = provider.get_zone_records_corrections(&dc, Records::new()).unwrap();
        assert!(corrections.is_empty());
        assert_eq!(actual, 0);
        assert!(provider_type().features.supports(Capability::CanUseAlias));
        let desired = crate::models::nameservers_from(&["ns1.example.net"]);
        assert!(Registrar::get_registrar_corrections(&provider, "example.com", &desired)
            .unwrap()
            .is_empty());
    }
}
