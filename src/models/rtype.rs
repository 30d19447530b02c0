use std::fmt;
use std::str::FromStr;

/// The type of a DNS record.
///
/// Provider-specific synthetic types (registered through
/// [`crate::providers::Registry::register_custom_rtype`]) are carried as
/// [`RecordType::Custom`] with an upper-cased name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    AAAA,
    ALIAS,
    CAA,
    CNAME,
    DHCID,
    DNAME,
    DNSKEY,
    DS,
    HTTPS,
    LOC,
    MX,
    NAPTR,
    NS,
    PTR,
    SOA,
    SRV,
    SSHFP,
    SVCB,
    TLSA,
    TXT,
    Custom(String),
}

impl RecordType {
    pub const BUILTIN: [RecordType; 21] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::ALIAS,
        RecordType::CAA,
        RecordType::CNAME,
        RecordType::DHCID,
        RecordType::DNAME,
        RecordType::DNSKEY,
        RecordType::DS,
        RecordType::HTTPS,
        RecordType::LOC,
        RecordType::MX,
        RecordType::NAPTR,
        RecordType::NS,
        RecordType::PTR,
        RecordType::SOA,
        RecordType::SRV,
        RecordType::SSHFP,
        RecordType::SVCB,
        RecordType::TLSA,
        RecordType::TXT,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::ALIAS => "ALIAS",
            RecordType::CAA => "CAA",
            RecordType::CNAME => "CNAME",
            RecordType::DHCID => "DHCID",
            RecordType::DNAME => "DNAME",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::DS => "DS",
            RecordType::HTTPS => "HTTPS",
            RecordType::LOC => "LOC",
            RecordType::MX => "MX",
            RecordType::NAPTR => "NAPTR",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SOA => "SOA",
            RecordType::SRV => "SRV",
            RecordType::SSHFP => "SSHFP",
            RecordType::SVCB => "SVCB",
            RecordType::TLSA => "TLSA",
            RecordType::TXT => "TXT",
            RecordType::Custom(name) => name,
        }
    }

    /// Types whose target is a host name that gets qualified against the
    /// origin during normalization.
    pub fn has_hostname_target(&self) -> bool {
        matches!(
            self,
            RecordType::ALIAS
                | RecordType::CNAME
                | RecordType::DNAME
                | RecordType::MX
                | RecordType::NS
                | RecordType::PTR
                | RecordType::SRV
                | RecordType::HTTPS
                | RecordType::SVCB
        )
    }

    /// Types that can be written to and read back from an RFC 1035 zone file.
    pub fn is_zone_file_type(&self) -> bool {
        !matches!(self, RecordType::ALIAS | RecordType::Custom(_))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, RecordType::Custom(_))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let upper = text.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err("record type must not be empty".to_string());
        }
        if !upper
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("invalid record type {text:?}"));
        }
        Ok(RecordType::BUILTIN
            .iter()
            .find(|t| t.as_str() == upper)
            .cloned()
            .unwrap_or(RecordType::Custom(upper)))
    }
}

impl TryFrom<String> for RecordType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

impl serde::Serialize for RecordType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for RecordType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
