use std::collections::{HashMap, HashSet};

use crate::common::{RecordSnafu, Result, ValidationSnafu};

use super::record::{label_to_ascii, normalize_origin};
use super::{DomainConfig, RecordConfig, RecordKey, RecordType, Records};

/// TTL given to records that don't declare one.
pub const DEFAULT_TTL: u32 = 300;

/// Brings a record list into canonical form for `origin`: labels are
/// backfilled and converted to lower-case ASCII, host-name targets are
/// qualified and lower-cased, TTL 0 inherits [`DEFAULT_TTL`] and each
/// RRset gets a single TTL (the smallest). Returns warnings for anything
/// that was silently adjusted.
pub fn post_process_records(records: &mut Records, origin: &str) -> Result<Vec<String>> {
    let origin = normalize_origin(&label_to_ascii(origin)?);
    for rc in records.iter_mut() {
        normalize_record(rc, &origin)?;
    }
    Ok(unify_rrset_ttls(records))
}

fn normalize_record(rc: &mut RecordConfig, origin: &str) -> Result<()> {
    let declared = if rc.name_raw.is_empty() {
        rc.name.clone()
    } else {
        rc.name_raw.clone()
    };
    rc.set_label(&declared, origin)?;

    if rc.ttl == 0 {
        rc.ttl = DEFAULT_TTL;
    }

    if rc.rtype.has_hostname_target() || rc.rtype == RecordType::NAPTR {
        rc.target = canonical_host(&rc.target, origin)?;
    }
    match rc.rtype {
        RecordType::SOA => {
            rc.target = canonical_host(&rc.target, origin)?;
            rc.soa_mbox = canonical_host(&rc.soa_mbox, origin)?;
        }
        RecordType::TXT => {
            if rc.txt_strings.is_empty() && !rc.target.is_empty() {
                rc.txt_strings = vec![rc.target.clone()];
            }
            rc.target = rc.txt_strings.concat();
        }
        RecordType::CAA => rc.caa_tag = rc.caa_tag.to_ascii_lowercase(),
        RecordType::AAAA => {
            if let Ok(ip) = rc.target.parse::<std::net::Ipv6Addr>() {
                rc.target = ip.to_string();
            }
        }
        _ => {}
    }
    Ok(())
}

/// Lower-cases and qualifies a host name. Empty stays empty so the
/// auditor can complain about it.
fn canonical_host(host: &str, origin: &str) -> Result<String> {
    if host.is_empty() || host == "." {
        return Ok(host.to_string());
    }
    let qualified = super::target::qualify(host, origin);
    let bare = qualified.trim_end_matches('.');
    Ok(format!("{}.", label_to_ascii(bare)?))
}

fn unify_rrset_ttls(records: &mut Records) -> Vec<String> {
    let mut smallest: HashMap<RecordKey, u32> = HashMap::new();
    for rc in records.iter() {
        smallest
            .entry(rc.key())
            .and_modify(|ttl| *ttl = (*ttl).min(rc.ttl))
            .or_insert(rc.ttl);
    }
    let mut warned: HashSet<RecordKey> = HashSet::new();
    let mut warnings = Vec::new();
    for rc in records.iter_mut() {
        let key = rc.key();
        let min = smallest[&key];
        if rc.ttl != min {
            if warned.insert(key.clone()) {
                let message = format!(
                    "{key}: records in the same RRset disagree on TTL, using the smallest ({min})"
                );
                tracing::warn!(rrset = %key, ttl = min, "RRset TTLs differ");
                warnings.push(message);
            }
            rc.ttl = min;
        }
    }
    warnings
}

/// Normalizes a whole domain: its name, then its records.
pub fn normalize_domain(dc: &mut DomainConfig) -> Result<Vec<String>> {
    if dc.name.trim().is_empty() {
        return ValidationSnafu {
            domain: "<unnamed>",
            message: "domain has no name",
        }
        .fail();
    }
    if dc.name_unicode.is_empty() {
        dc.name_unicode = dc.name.trim_end_matches('.').to_string();
    }
    dc.name = normalize_origin(&label_to_ascii(&dc.name)?);
    for rc in dc.records.iter() {
        if rc.rtype == RecordType::TXT && rc.txt_strings.is_empty() && rc.target.is_empty() {
            return RecordSnafu {
                message: format!("{}: TXT record at {} has no strings", dc.name, rc.name),
            }
            .fail();
        }
    }
    post_process_records(&mut dc.records, &dc.name.clone())
}
