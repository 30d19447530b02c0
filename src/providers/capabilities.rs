use std::collections::BTreeMap;
use std::fmt;

use crate::models::{RecordConfig, RecordType};

/// Something a provider may or may not be able to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    CanUseAlias,
    CanUseCAA,
    CanUseDHCID,
    CanUseDNAME,
    CanUseDNSKEY,
    CanUseDS,
    CanUseDSForChildren,
    CanUseHTTPS,
    CanUseLOC,
    CanUseNAPTR,
    CanUsePTR,
    CanUseSOA,
    CanUseSRV,
    CanUseSSHFP,
    CanUseSVCB,
    CanUseTLSA,
    CanAutoDNSSEC,
    CanGetZones,
    /// Safe to drive many zones from several threads at once.
    CanConcur,
    DocCreateDomains,
    DocDualHost,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Capability {
    /// The capability a record type depends on; `None` for the types
    /// every provider handles.
    pub fn for_rtype(rtype: &RecordType) -> Option<Capability> {
        Some(match rtype {
            RecordType::ALIAS => Capability::CanUseAlias,
            RecordType::CAA => Capability::CanUseCAA,
            RecordType::DHCID => Capability::CanUseDHCID,
            RecordType::DNAME => Capability::CanUseDNAME,
            RecordType::DNSKEY => Capability::CanUseDNSKEY,
            RecordType::DS => Capability::CanUseDS,
            RecordType::HTTPS => Capability::CanUseHTTPS,
            RecordType::LOC => Capability::CanUseLOC,
            RecordType::NAPTR => Capability::CanUseNAPTR,
            RecordType::PTR => Capability::CanUsePTR,
            RecordType::SOA => Capability::CanUseSOA,
            RecordType::SRV => Capability::CanUseSRV,
            RecordType::SSHFP => Capability::CanUseSSHFP,
            RecordType::SVCB => Capability::CanUseSVCB,
            RecordType::TLSA => Capability::CanUseTLSA,
            RecordType::A
            | RecordType::AAAA
            | RecordType::CNAME
            | RecordType::MX
            | RecordType::NS
            | RecordType::TXT
            | RecordType::Custom(_) => return None,
        })
    }
}

/// How a provider supports a capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Support {
    Can,
    /// Not supported, optionally with an explanation for the operator.
    Cannot(Option<&'static str>),
}

/// The capability table of one provider type. Anything not listed is
/// unsupported.
#[derive(Clone, Debug, Default)]
pub struct Features(BTreeMap<Capability, Support>);

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can(mut self, capability: Capability) -> Self {
        self.0.insert(capability, Support::Can);
        self
    }

    pub fn cannot(mut self, capability: Capability, why: &'static str) -> Self {
        self.0.insert(capability, Support::Cannot(Some(why)));
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        matches!(self.0.get(&capability), Some(Support::Can))
    }

    /// The explanation attached to an unsupported capability.
    pub fn reason(&self, capability: Capability) -> Option<&'static str> {
        match self.0.get(&capability) {
            Some(Support::Cannot(why)) => *why,
            _ => None,
        }
    }

    /// Whether a record can be stored at all, judging by its type. DS
    /// records below the apex only need [`Capability::CanUseDSForChildren`].
    /// Custom types are decided by the registry.
    pub fn supports_record(&self, rc: &RecordConfig) -> bool {
        if rc.rtype == RecordType::DS
            && !rc.is_apex()
            && self.supports(Capability::CanUseDSForChildren)
        {
            return true;
        }
        match Capability::for_rtype(&rc.rtype) {
            Some(capability) => self.supports(capability),
            None => true,
        }
    }
}
