use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::diff::Differ;
use crate::models::{Correction, DomainConfig, Nameserver, RecordType, Records};

/// A driver for an authoritative DNS service.
///
/// Corrections borrow the driver, so they have to be run (or dropped)
/// before it goes away. The optional facets are discovered through the
/// `as_*` accessors rather than separate trait objects.
pub trait DnsProvider: Send + Sync {
    /// The apex name servers this provider serves `domain` from.
    fn get_nameservers(&self, domain: &str) -> Result<Vec<Nameserver>>;

    /// Every record currently in the zone.
    fn get_zone_records(&self, domain: &str, meta: &BTreeMap<String, String>) -> Result<Records>;

    /// Plans the corrections that turn `existing` into `dc.records`,
    /// returning them with the number that actually change something.
    fn get_zone_records_corrections<'a>(
        &'a self,
        dc: &DomainConfig,
        existing: Records,
    ) -> Result<(Vec<Correction<'a>>, usize)>;

    /// Checks of the desired records that only this driver knows about.
    /// Runs with the audit, before the provider is contacted.
    fn check_records(&self, _dc: &DomainConfig) -> Vec<Error> {
        Vec::new()
    }

    fn as_zone_lister(&self) -> Option<&dyn ZoneLister> {
        None
    }

    fn as_zone_creator(&self) -> Option<&dyn ZoneCreator> {
        None
    }

    fn as_dnssec_toggler(&self) -> Option<&dyn DnssecToggler> {
        None
    }
}

pub trait ZoneLister: Send + Sync {
    fn list_zones(&self) -> Result<Vec<String>>;
}

pub trait ZoneCreator: Send + Sync {
    /// Creates the zone unless it already exists.
    fn ensure_zone_exists(&self, domain: &str) -> Result<()>;
}

pub trait DnssecToggler: Send + Sync {
    fn dnssec_enabled(&self, domain: &str) -> Result<bool>;
    fn set_dnssec(&self, domain: &str, enabled: bool) -> Result<()>;
}

/// A driver for the registrar that holds a domain's delegation.
pub trait Registrar: Send + Sync {
    fn get_nameservers(&self, domain: &str) -> Result<Vec<Nameserver>>;

    /// Replaces the whole delegation at once.
    fn set_nameservers(&self, domain: &str, nameservers: &[Nameserver]) -> Result<()>;

    fn get_registrar_corrections<'a>(
        &'a self,
        domain: &str,
        desired: &[Nameserver],
    ) -> Result<Vec<Correction<'a>>> {
        let current = self.get_nameservers(domain)?;
        let owned = domain.to_string();
        Ok(crate::registrar::nameserver_corrections(
            domain,
            &current,
            desired,
            move |nameservers| self.set_nameservers(&owned, &nameservers),
        ))
    }
}

/// The differ drivers start from: `keep_unknown` from the domain, and
/// apex NS changes turned into reports where the provider manages them.
pub fn zone_differ<'a>(dc: &DomainConfig, apex_ns_editable: bool) -> Differ<'a> {
    let differ = Differ::new().keep_unknown(dc.keep_unknown);
    if apex_ns_editable {
        return differ;
    }
    let apex = dc.name.clone();
    differ.report_if(move |key| {
        (key.rtype == RecordType::NS && key.name_fqdn == apex)
            .then(|| "apex NS records are managed by the provider".to_string())
    })
}
