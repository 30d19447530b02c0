use crate::common::{Result, SpfSnafu};
use crate::models::txt::{split_octets, MAX_STRING_OCTETS};
use crate::models::{DomainConfig, RecordConfig, RecordType, Records};

use super::{FlattenSpec, SpfRecord, TxtResolver};

/// TXT metadata naming the includes to inline: `*` or a comma list.
pub const META_FLATTEN: &str = "spf_flatten";
/// TXT metadata holding the chain-name format (with `{n}`) to split with.
pub const META_SPLIT: &str = "spf_split";

/// Most lookups a receiver will perform before giving up (RFC 7208 4.6.4).
pub const MAX_LOOKUPS: usize = 10;

/// Replaces every TXT record carrying [`META_FLATTEN`] with its flattened
/// policy, split into a chain when [`META_SPLIT`] is present. Returns
/// warnings for policies that still need too many lookups.
pub fn materialize_spf(dc: &mut DomainConfig, resolver: Option<&dyn TxtResolver>) -> Result<Vec<String>> {
    let wanted = dc
        .records
        .iter()
        .any(|rc| rc.rtype == RecordType::TXT && rc.meta(META_FLATTEN).is_some());
    if !wanted {
        return Ok(Vec::new());
    }
    let Some(resolver) = resolver else {
        return SpfSnafu {
            message: format!("{}: SPF flattening needs a resolver", dc.name),
        }
        .fail();
    };

    let mut warnings = Vec::new();
    let mut records = Records::new();
    for rc in std::mem::take(&mut dc.records) {
        let spec = rc
            .meta(META_FLATTEN)
            .filter(|_| rc.rtype == RecordType::TXT)
            .map(FlattenSpec::parse);
        let Some(spec) = spec else {
            records.push(rc);
            continue;
        };
        let text = if rc.txt_strings.is_empty() {
            rc.target().to_string()
        } else {
            rc.txt_concatenated()
        };
        let flat = SpfRecord::parse(&text, resolver)?.flatten(&spec);
        let lookups = flat.lookups();
        tracing::info!(domain = %dc.name, label = rc.name(), lookups, "Flattened SPF policy");
        if lookups > MAX_LOOKUPS {
            let message = format!(
                "{}: SPF policy at {} needs {lookups} lookups, more than {MAX_LOOKUPS}",
                dc.name,
                rc.name()
            );
            tracing::warn!(domain = %dc.name, lookups, "SPF policy needs too many lookups");
            warnings.push(message);
        }

        match rc.meta(META_SPLIT).map(str::to_string) {
            Some(format) => {
                for (name, policy) in flat.split(&format, &dc.name)? {
                    let mut piece = stripped(&rc);
                    if name != "@" {
                        piece.set_label_from_fqdn(&name, &dc.name)?;
                    }
                    piece.set_target_txt(policy);
                    records.push(piece);
                }
            }
            None => {
                let mut piece = stripped(&rc);
                piece.set_target_txts(split_octets(&flat.to_string(), MAX_STRING_OCTETS));
                records.push(piece);
            }
        }
    }
    dc.records = records;
    Ok(warnings)
}

fn stripped(rc: &RecordConfig) -> RecordConfig {
    let mut piece = rc.clone();
    piece.metadata.remove(META_FLATTEN);
    piece.metadata.remove(META_SPLIT);
    piece
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spflib::StaticResolver;

    fn domain(meta: &[(&str, &str)]) -> DomainConfig {
        let mut dc = DomainConfig::new("example.com");
        let mut rc = RecordConfig::new(RecordType::TXT, "example.com");
        rc.set_target_txt("v=spf1 include:_spf.example.net -all");
        for (k, v) in meta {
            rc.metadata.insert(k.to_string(), v.to_string());
        }
        dc.records.push(rc);
        dc.records.push(RecordConfig::from_string("www", 300, "A", "192.0.2.1", "example.com").unwrap());
        dc
    }

    fn resolver() -> StaticResolver {
        StaticResolver::new().with("_spf.example.net", "v=spf1 ip4:198.51.100.0/24 ip6:2001:db8::/32 ~all")
    }

    #[test]
    fn untagged_domains_need_no_resolver() {
        let mut dc = DomainConfig::new("example.com");
        dc.records
            .push(RecordConfig::from_string("@", 300, "TXT", "\"v=spf1 -all\"", "example.com").unwrap());
        assert!(materialize_spf(&mut dc, None).unwrap().is_empty());
        assert_eq!(dc.records.len(), 1);
    }

    #[test]
    fn flattens_in_place() {
        let mut dc = domain(&[(META_FLATTEN, "*")]);
        let warnings = materialize_spf(&mut dc, Some(&resolver())).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(dc.records.len(), 2);
        assert_eq!(
            dc.records[0].txt_strings,
            vec!["v=spf1 ip4:198.51.100.0/24 ip6:2001:db8::/32 -all".to_string()]
        );
        assert!(dc.records[0].metadata.is_empty());
    }

    #[test]
    fn missing_resolver_is_an_error() {
        let mut dc = domain(&[(META_FLATTEN, "*")]);
        assert!(materialize_spf(&mut dc, None).is_err());
    }

    #[test]
    fn short_policies_stay_whole_when_split() {
        let mut dc = domain(&[(META_FLATTEN, "*"), (META_SPLIT, "_spf{n}")]);
        materialize_spf(&mut dc, Some(&resolver())).unwrap();
        let txt: Vec<_> = dc.records.of_type(&RecordType::TXT).collect();
        assert_eq!(txt.len(), 1);
        assert!(txt[0].is_apex());
    }
}
