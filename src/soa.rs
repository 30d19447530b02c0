//! SOA synthesis and `YYYYMMDDvv` serial numbers.

use chrono::{Datelike, NaiveDate, Utc};

use crate::models::{RecordConfig, RecordType};

pub const DEFAULT_NOT_SET: &str = "DEFAULT_NOT_SET.";
pub const DEFAULT_REFRESH: u32 = 3600;
pub const DEFAULT_RETRY: u32 = 600;
pub const DEFAULT_EXPIRE: u32 = 604800;
pub const DEFAULT_MINTTL: u32 = 1440;

/// Provider supplied SOA values. Empty strings and zeros mean "no opinion".
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
pub struct SoaDefaults {
    #[serde(default)]
    pub ns: String,
    #[serde(default)]
    pub mbox: String,
    #[serde(default)]
    pub serial: u32,
    #[serde(default)]
    pub refresh: u32,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub expire: u32,
    #[serde(default)]
    pub minttl: u32,
    #[serde(default)]
    pub ttl: u32,
}

fn first_str<'s>(candidates: [&'s str; 3], fallback: &'s str) -> &'s str {
    candidates.into_iter().find(|s| !s.is_empty()).unwrap_or(fallback)
}

fn first_num(candidates: [u32; 3], fallback: u32) -> u32 {
    candidates.into_iter().find(|n| *n != 0).unwrap_or(fallback)
}

/// Builds the SOA for `origin`. Each field comes from the first source
/// that sets it: `desired`, then `existing`, then `defaults`, then the
/// hard-coded fallbacks.
pub fn make_default_soa(
    origin: &str,
    desired: Option<&RecordConfig>,
    existing: Option<&RecordConfig>,
    defaults: &SoaDefaults,
) -> RecordConfig {
    let empty = RecordConfig::new(RecordType::SOA, origin);
    let d = desired.unwrap_or(&empty);
    let e = existing.unwrap_or(&empty);

    let mbox = first_str(
        [d.soa_mbox.as_str(), e.soa_mbox.as_str(), defaults.mbox.as_str()],
        DEFAULT_NOT_SET,
    );
    let mut soa = RecordConfig::new(RecordType::SOA, origin);
    soa.set_target_soa(
        first_str([d.target(), e.target(), defaults.ns.as_str()], DEFAULT_NOT_SET),
        rfc5322_mail_to_bind(mbox),
        first_num([d.soa_serial, e.soa_serial, defaults.serial], 1),
        first_num([d.soa_refresh, e.soa_refresh, defaults.refresh], DEFAULT_REFRESH),
        first_num([d.soa_retry, e.soa_retry, defaults.retry], DEFAULT_RETRY),
        first_num([d.soa_expire, e.soa_expire, defaults.expire], DEFAULT_EXPIRE),
        first_num([d.soa_minttl, e.soa_minttl, defaults.minttl], DEFAULT_MINTTL),
    );
    soa.ttl = first_num([d.ttl, e.ttl, defaults.ttl], DEFAULT_REFRESH);
    soa.metadata = d.metadata.clone();
    soa
}

/// Converts `hostmaster@example.com` style addresses to the BIND mailbox
/// form (`hostmaster.example.com`), escaping dots in the local part.
/// Anything without an `@` is returned unchanged.
pub fn rfc5322_mail_to_bind(mail: &str) -> String {
    match mail.split_once('@') {
        Some((local, domain)) => format!("{}.{domain}", local.replace('.', "\\.")),
        None => mail.to_string(),
    }
}

/// The serial following `old` on `today`: `YYYYMMDD00` when that is
/// larger, otherwise `old + 1`. Zero is never returned.
pub fn generate_serial(old: u32, today: NaiveDate) -> u32 {
    let base = u64::from(today.year().unsigned_abs()) * 1_000_000
        + u64::from(today.month()) * 10_000
        + u64::from(today.day()) * 100;
    let next = match u32::try_from(base) {
        Ok(base) if base > old => base,
        _ => old.wrapping_add(1),
    };
    next.max(1)
}

/// [`generate_serial`] for the current UTC date.
pub fn generate_serial_now(old: u32) -> u32 {
    generate_serial(old, Utc::now().date_naive())
}
