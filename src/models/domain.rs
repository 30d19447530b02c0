use std::collections::BTreeMap;
use std::fmt;

use super::record::normalize_origin;
use super::Records;

/// A single name server host name. Identity is case-insensitive and
/// ignores a trailing dot, so the name is stored normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nameserver(String);

impl Nameserver {
    pub fn new(name: &str) -> Self {
        Self(name.trim().trim_end_matches('.').to_ascii_lowercase())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nameserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Nameserver {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl serde::Serialize for Nameserver {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Nameserver {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

/// Builds nameservers from a list of host names.
pub fn nameservers_from<S: AsRef<str>>(names: &[S]) -> Vec<Nameserver> {
    names.iter().map(|n| Nameserver::new(n.as_ref())).collect()
}

/// The declared DNSSEC posture of a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoDnssec {
    On,
    Off,
    #[default]
    #[serde(alias = "")]
    Unset,
}

/// The desired state of one zone.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default)]
    pub records: Records,
    #[serde(default)]
    pub nameservers: Vec<Nameserver>,
    /// Provider instance name → number of its name servers to publish at
    /// the apex. Negative means all of them.
    #[serde(default)]
    pub dns_providers: BTreeMap<String, i32>,
    #[serde(default)]
    pub registrar: Option<String>,
    #[serde(default)]
    pub auto_dnssec: AutoDnssec,
    /// Existing records that are not declared are left alone instead of
    /// being deleted.
    #[serde(default)]
    pub keep_unknown: bool,
    #[serde(default, rename = "meta")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip)]
    pub name_unicode: String,
}

impl DomainConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_origin(name),
            records: Records::new(),
            nameservers: Vec::new(),
            dns_providers: BTreeMap::new(),
            registrar: None,
            auto_dnssec: AutoDnssec::Unset,
            keep_unknown: false,
            metadata: BTreeMap::new(),
            name_unicode: name.trim_end_matches('.').to_string(),
        }
    }

    /// How many of `provider`'s name servers should be published; `None`
    /// means all.
    pub fn nameserver_count(&self, provider: &str) -> Option<usize> {
        match self.dns_providers.get(provider) {
            Some(count) if *count >= 0 => Some(*count as usize),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nameserver_identity_ignores_case_and_dot() {
        assert_eq!(Nameserver::new("NS1.Example.NET."), Nameserver::new("ns1.example.net"));
        assert_eq!(Nameserver::new("ns1.example.net.").to_string(), "ns1.example.net");
    }

    #[test]
    fn deserializes_domain_json() {
        let dc: DomainConfig = serde_json::from_str(
            r#"{
                "name": "example.com",
                "registrar": "none",
                "dns_providers": {"bind": -1, "cloudflare": 2},
                "nameservers": ["NS1.example.net."],
                "auto_dnssec": "on",
                "records": [{"type": "A", "name": "www", "target": "1.2.3.4"}]
            }"#,
        )
        .unwrap();
        assert_eq!(dc.auto_dnssec, AutoDnssec::On);
        assert_eq!(dc.nameservers, vec![Nameserver::new("ns1.example.net")]);
        assert_eq!(dc.nameserver_count("bind"), None);
        assert_eq!(dc.nameserver_count("cloudflare"), Some(2));
        assert_eq!(dc.records.len(), 1);
        assert!(!dc.keep_unknown);
    }

    #[test]
    fn dnssec_defaults_to_unset() {
        let dc: DomainConfig = serde_json::from_str(r#"{"name": "example.com"}"#).unwrap();
        assert_eq!(dc.auto_dnssec, AutoDnssec::Unset);
    }
}
