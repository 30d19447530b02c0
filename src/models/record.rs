use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::common::{RecordSnafu, Result};

use super::RecordType;

/// The label used for the zone apex.
pub const APEX: &str = "@";

/// The provider-native form a record was decoded from.
///
/// Drivers stash their API object (and thereby its ID) here so that
/// CHANGE and DELETE corrections can address it without a re-fetch.
/// Originals never take part in record equality.
#[derive(Clone)]
pub struct Original {
    provider: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
}

impl Original {
    pub fn new<T: Any + Send + Sync>(provider: &'static str, native: T) -> Self {
        Self {
            provider,
            handle: Arc::new(native),
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the native value if it was stored by `provider` with type `T`.
    pub fn get<T: Any>(&self, provider: &str) -> Option<&T> {
        if self.provider != provider {
            return None;
        }
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for Original {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Original({})", self.provider)
    }
}

/// The identity of an RRset: fully qualified name plus type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub name_fqdn: String,
    pub rtype: RecordType,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name_fqdn, self.rtype)
    }
}

/// A single DNS resource record in provider-neutral form.
///
/// `name` is the short label relative to the origin (`@` for the apex);
/// `name_fqdn` is derived from it and only changes through the label
/// setters. The primary payload lives in `target`; the remaining fields
/// are only meaningful for the types that carry them.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RecordConfig {
    #[serde(rename = "type")]
    pub rtype: RecordType,
    #[serde(default = "apex")]
    pub(super) name: String,
    #[serde(skip)]
    pub(super) name_raw: String,
    #[serde(skip)]
    pub(super) name_fqdn: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub(super) target: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub mx_preference: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub srv_priority: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub srv_weight: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub srv_port: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub caa_flag: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub caa_tag: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub naptr_order: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub naptr_preference: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub naptr_flags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub naptr_service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub naptr_regexp: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tlsa_usage: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tlsa_selector: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tlsa_matching_type: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ds_key_tag: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ds_algorithm: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ds_digest_type: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ds_digest: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sshfp_algorithm: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sshfp_fingerprint: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub svc_priority: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub svc_params: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dnskey_flags: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dnskey_protocol: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dnskey_algorithm: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub soa_mbox: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub soa_serial: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub soa_refresh: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub soa_retry: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub soa_expire: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub soa_minttl: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txt_strings: Vec<String>,
    #[serde(default, rename = "meta", skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip)]
    pub original: Option<Original>,
}

impl PartialEq for RecordConfig {
    fn eq(&self, other: &Self) -> bool {
        macro_rules! same {
            ($($field:ident),*) => { $(self.$field == other.$field)&&* };
        }
        same!(
            rtype, name, name_fqdn, ttl, target, mx_preference, srv_priority, srv_weight,
            srv_port, caa_flag, caa_tag, naptr_order, naptr_preference, naptr_flags,
            naptr_service, naptr_regexp, tlsa_usage, tlsa_selector, tlsa_matching_type,
            ds_key_tag, ds_algorithm, ds_digest_type, ds_digest, sshfp_algorithm,
            sshfp_fingerprint, svc_priority, svc_params, dnskey_flags, dnskey_protocol,
            dnskey_algorithm, soa_mbox, soa_serial, soa_refresh, soa_retry, soa_expire,
            soa_minttl, txt_strings, metadata
        )
    }
}

fn apex() -> String {
    APEX.to_string()
}

fn is_zero<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

impl RecordConfig {
    /// Creates an empty record of type `rtype` at the apex of `origin`.
    pub fn new(rtype: RecordType, origin: &str) -> Self {
        let origin = normalize_origin(origin);
        Self {
            rtype,
            name: apex(),
            name_raw: apex(),
            name_fqdn: origin,
            ttl: 0,
            target: String::new(),
            mx_preference: 0,
            srv_priority: 0,
            srv_weight: 0,
            srv_port: 0,
            caa_flag: 0,
            caa_tag: String::new(),
            naptr_order: 0,
            naptr_preference: 0,
            naptr_flags: String::new(),
            naptr_service: String::new(),
            naptr_regexp: String::new(),
            tlsa_usage: 0,
            tlsa_selector: 0,
            tlsa_matching_type: 0,
            ds_key_tag: 0,
            ds_algorithm: 0,
            ds_digest_type: 0,
            ds_digest: String::new(),
            sshfp_algorithm: 0,
            sshfp_fingerprint: 0,
            svc_priority: 0,
            svc_params: String::new(),
            dnskey_flags: 0,
            dnskey_protocol: 0,
            dnskey_algorithm: 0,
            soa_mbox: String::new(),
            soa_serial: 0,
            soa_refresh: 0,
            soa_retry: 0,
            soa_expire: 0,
            soa_minttl: 0,
            txt_strings: Vec::new(),
            metadata: BTreeMap::new(),
            original: None,
        }
    }

    /// Builds a record from its presentation form: short label, type and
    /// RDATA text as it would appear in a zone file.
    pub fn from_string(
        label: &str,
        ttl: u32,
        rtype: &str,
        contents: &str,
        origin: &str,
    ) -> Result<Self> {
        let rtype = rtype
            .parse::<RecordType>()
            .map_err(|message| RecordSnafu { message }.build())?;
        let mut rc = Self::new(rtype, origin);
        rc.set_label(label, origin)?;
        rc.ttl = ttl;
        rc.set_target_string(contents, origin)?;
        Ok(rc)
    }

    /// The short label, `@` for the apex. Always ASCII.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The label as it was declared, before IDN conversion.
    pub fn name_raw(&self) -> &str {
        &self.name_raw
    }

    /// The fully qualified name, without trailing dot.
    pub fn name_fqdn(&self) -> &str {
        &self.name_fqdn
    }

    /// Sets the short label. `""` and `@` denote the apex; a label ending
    /// in a dot is treated as fully qualified.
    pub fn set_label(&mut self, short: &str, origin: &str) -> Result<()> {
        if short.ends_with('.') && short != "." {
            return self.set_label_from_fqdn(short, origin);
        }
        let origin = normalize_origin(origin);
        let raw = if short.is_empty() { APEX } else { short };
        let ascii = label_to_ascii(raw)?;
        self.name_raw = raw.to_string();
        if ascii == APEX {
            self.name = apex();
            self.name_fqdn = origin;
        } else {
            self.name_fqdn = if origin.is_empty() {
                ascii.clone()
            } else {
                format!("{ascii}.{origin}")
            };
            self.name = ascii;
        }
        Ok(())
    }

    /// Sets the label from a fully qualified name, which must lie inside
    /// `origin`.
    pub fn set_label_from_fqdn(&mut self, fqdn: &str, origin: &str) -> Result<()> {
        let origin = normalize_origin(origin);
        let ascii = label_to_ascii(fqdn.trim_end_matches('.'))?;
        if ascii == origin {
            self.name = apex();
        } else if let Some(short) = ascii.strip_suffix(&format!(".{origin}")) {
            self.name = short.to_string();
        } else {
            return RecordSnafu {
                message: format!("{fqdn} is not inside zone {origin}"),
            }
            .fail();
        }
        self.name_raw = self.name.clone();
        self.name_fqdn = ascii;
        Ok(())
    }

    pub fn is_apex(&self) -> bool {
        self.name == APEX
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            name_fqdn: self.name_fqdn.clone(),
            rtype: self.rtype.clone(),
        }
    }

    /// The primary payload only.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The zone-file label column form of the name.
    pub fn short_name(&self) -> &str {
        &self.name
    }
}

/// Lower-cases an origin and strips any trailing dot.
pub fn normalize_origin(origin: &str) -> String {
    origin.trim_end_matches('.').to_ascii_lowercase()
}

/// Converts a (possibly internationalized) dotted label to its
/// lower-case ASCII form.
pub fn label_to_ascii(label: &str) -> Result<String> {
    if label.is_ascii() {
        return Ok(label.to_ascii_lowercase());
    }
    idna::domain_to_ascii(label).map_err(|err| {
        RecordSnafu {
            message: format!("cannot convert {label:?} to punycode: {err}"),
        }
        .build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apex_label_tracks_origin() {
        let mut rc = RecordConfig::new(RecordType::A, "Example.COM.");
        rc.set_label("", "example.com").unwrap();
        assert_eq!(rc.name(), "@");
        assert_eq!(rc.name_fqdn(), "example.com");
        rc.set_label("WWW", "example.com.").unwrap();
        assert_eq!(rc.name(), "www");
        assert_eq!(rc.name_fqdn(), "www.example.com");
    }

    #[test]
    fn fqdn_labels() {
        let mut rc = RecordConfig::new(RecordType::A, "example.com");
        rc.set_label_from_fqdn("foo.bar.example.com.", "example.com").unwrap();
        assert_eq!(rc.name(), "foo.bar");
        rc.set_label("example.com.", "example.com").unwrap();
        assert!(rc.is_apex());
        assert!(rc.set_label_from_fqdn("example.net.", "example.com").is_err());
        assert!(rc.set_label_from_fqdn("badexample.com", "example.com").is_err());
    }

    #[test]
    fn idn_labels_keep_the_declared_form() {
        let mut rc = RecordConfig::new(RecordType::A, "example.com");
        rc.set_label("bücher", "example.com").unwrap();
        assert_eq!(rc.name(), "xn--bcher-kva");
        assert_eq!(rc.name_raw(), "bücher");
        assert_eq!(rc.name_fqdn(), "xn--bcher-kva.example.com");
    }

    #[test]
    fn originals_do_not_affect_equality() {
        let mut a = RecordConfig::new(RecordType::A, "example.com");
        a.set_target("1.2.3.4");
        let mut b = a.clone();
        b.original = Some(Original::new("TEST", 42u64));
        assert_eq!(a, b);
        assert_eq!(b.original.as_ref().unwrap().get::<u64>("TEST"), Some(&42));
        assert_eq!(b.original.as_ref().unwrap().get::<u64>("OTHER"), None);
        assert_eq!(b.original.as_ref().unwrap().get::<u32>("TEST"), None);
    }

    #[test]
    fn deserializes_dsl_json() {
        let rc: RecordConfig = serde_json::from_str(
            r#"{"type": "MX", "name": "@", "ttl": 300, "target": "mx.example.com.", "mx_preference": 10}"#,
        )
        .unwrap();
        assert_eq!(rc.rtype, RecordType::MX);
        assert_eq!(rc.mx_preference, 10);
        assert_eq!(rc.target(), "mx.example.com.");
        assert!(serde_json::from_str::<RecordConfig>(r#"{"type": "", "name": "@"}"#).is_err());
    }
}
