use std::str::FromStr;

use crate::common::{RecordSnafu, Result};

use super::txt::{self, Field};
use super::{RecordConfig, RecordType};

fn number<T: FromStr>(field: &Field, what: &str) -> Result<T> {
    field.text.parse::<T>().map_err(|_| {
        RecordSnafu {
            message: format!("{what} {:?} is not a valid number", field.text),
        }
        .build()
    })
}

fn expect_fields(rtype: &RecordType, fields: &[Field], count: usize) -> Result<()> {
    if fields.len() != count {
        return RecordSnafu {
            message: format!(
                "{rtype} needs {count} fields but got {}: {:?}",
                fields.len(),
                fields.iter().map(|f| f.text.as_str()).collect::<Vec<_>>()
            ),
        }
        .fail();
    }
    Ok(())
}

/// Qualifies a relative host name against `origin`. `@` becomes the
/// origin itself; names with a trailing dot are left alone.
pub fn qualify(host: &str, origin: &str) -> String {
    let origin = origin.trim_end_matches('.');
    if host == "@" {
        format!("{origin}.")
    } else if host.ends_with('.') || origin.is_empty() {
        host.to_string()
    } else {
        format!("{host}.{origin}.")
    }
}

impl RecordConfig {
    /// Sets the primary payload verbatim.
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    pub fn set_target_mx(&mut self, preference: u16, host: impl Into<String>) {
        self.mx_preference = preference;
        self.target = host.into();
    }

    pub fn set_target_srv(&mut self, priority: u16, weight: u16, port: u16, host: impl Into<String>) {
        self.srv_priority = priority;
        self.srv_weight = weight;
        self.srv_port = port;
        self.target = host.into();
    }

    pub fn set_target_caa(&mut self, flag: u8, tag: impl Into<String>, value: impl Into<String>) {
        self.caa_flag = flag;
        self.caa_tag = tag.into();
        self.target = value.into();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_target_soa(
        &mut self,
        ns: impl Into<String>,
        mbox: impl Into<String>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minttl: u32,
    ) {
        self.target = ns.into();
        self.soa_mbox = mbox.into();
        self.soa_serial = serial;
        self.soa_refresh = refresh;
        self.soa_retry = retry;
        self.soa_expire = expire;
        self.soa_minttl = minttl;
    }

    /// Sets a TXT payload consisting of a single string.
    pub fn set_target_txt(&mut self, s: impl Into<String>) {
        self.set_target_txts(vec![s.into()]);
    }

    /// Sets a TXT payload from its string list.
    pub fn set_target_txts(&mut self, strings: Vec<String>) {
        self.target = strings.concat();
        self.txt_strings = strings;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_target_naptr(
        &mut self,
        order: u16,
        preference: u16,
        flags: impl Into<String>,
        service: impl Into<String>,
        regexp: impl Into<String>,
        replacement: impl Into<String>,
    ) {
        self.naptr_order = order;
        self.naptr_preference = preference;
        self.naptr_flags = flags.into();
        self.naptr_service = service.into();
        self.naptr_regexp = regexp.into();
        self.target = replacement.into();
    }

    pub fn set_target_tlsa(&mut self, usage: u8, selector: u8, matching_type: u8, data: impl Into<String>) {
        self.tlsa_usage = usage;
        self.tlsa_selector = selector;
        self.tlsa_matching_type = matching_type;
        self.target = data.into();
    }

    pub fn set_target_ds(&mut self, key_tag: u16, algorithm: u8, digest_type: u8, digest: impl Into<String>) {
        self.ds_key_tag = key_tag;
        self.ds_algorithm = algorithm;
        self.ds_digest_type = digest_type;
        self.ds_digest = digest.into();
        self.target = String::new();
    }

    pub fn set_target_sshfp(&mut self, algorithm: u8, fingerprint_type: u8, fingerprint: impl Into<String>) {
        self.sshfp_algorithm = algorithm;
        self.sshfp_fingerprint = fingerprint_type;
        self.target = fingerprint.into();
    }

    pub fn set_target_svcb(&mut self, priority: u16, host: impl Into<String>, params: impl Into<String>) {
        self.svc_priority = priority;
        self.target = host.into();
        self.svc_params = params.into();
    }

    pub fn set_target_dnskey(&mut self, flags: u16, protocol: u8, algorithm: u8, public_key: impl Into<String>) {
        self.dnskey_flags = flags;
        self.dnskey_protocol = protocol;
        self.dnskey_algorithm = algorithm;
        self.target = public_key.into();
    }

    /// Parses presentation-format RDATA for the record's type. Relative
    /// host names are qualified against `origin`.
    pub fn set_target_string(&mut self, contents: &str, origin: &str) -> Result<()> {
        let fields = txt::split_fields(contents)?;
        self.set_target_fields(&fields, origin)
    }

    /// Like [`RecordConfig::set_target_string`] but from already split
    /// fields, as produced by the zone file tokenizer.
    pub fn set_target_fields(&mut self, f: &[Field], origin: &str) -> Result<()> {
        let rtype = self.rtype.clone();
        match rtype {
            RecordType::A => {
                expect_fields(&rtype, f, 1)?;
                let ip = f[0].text.parse::<std::net::Ipv4Addr>().map_err(|_| {
                    RecordSnafu {
                        message: format!("invalid IPv4 address {:?}", f[0].text),
                    }
                    .build()
                })?;
                self.set_target(ip.to_string());
            }
            RecordType::AAAA => {
                expect_fields(&rtype, f, 1)?;
                let ip = f[0].text.parse::<std::net::Ipv6Addr>().map_err(|_| {
                    RecordSnafu {
                        message: format!("invalid IPv6 address {:?}", f[0].text),
                    }
                    .build()
                })?;
                self.set_target(ip.to_string());
            }
            RecordType::ALIAS
            | RecordType::CNAME
            | RecordType::DNAME
            | RecordType::NS
            | RecordType::PTR => {
                expect_fields(&rtype, f, 1)?;
                self.set_target(qualify(&f[0].text, origin));
            }
            RecordType::MX => {
                expect_fields(&rtype, f, 2)?;
                self.set_target_mx(number(&f[0], "MX preference")?, qualify(&f[1].text, origin));
            }
            RecordType::SRV => {
                expect_fields(&rtype, f, 4)?;
                self.set_target_srv(
                    number(&f[0], "SRV priority")?,
                    number(&f[1], "SRV weight")?,
                    number(&f[2], "SRV port")?,
                    qualify(&f[3].text, origin),
                );
            }
            RecordType::CAA => {
                expect_fields(&rtype, f, 3)?;
                self.set_target_caa(number(&f[0], "CAA flag")?, f[1].text.clone(), f[2].text.clone());
            }
            RecordType::TXT => {
                if f.is_empty() {
                    return RecordSnafu {
                        message: "TXT needs at least one string",
                    }
                    .fail();
                }
                self.set_target_txts(f.iter().map(|field| field.text.clone()).collect());
            }
            RecordType::SOA => {
                expect_fields(&rtype, f, 7)?;
                self.set_target_soa(
                    qualify(&f[0].text, origin),
                    qualify(&f[1].text, origin),
                    number(&f[2], "SOA serial")?,
                    number(&f[3], "SOA refresh")?,
                    number(&f[4], "SOA retry")?,
                    number(&f[5], "SOA expire")?,
                    number(&f[6], "SOA minimum")?,
                );
            }
            RecordType::NAPTR => {
                expect_fields(&rtype, f, 6)?;
                self.set_target_naptr(
                    number(&f[0], "NAPTR order")?,
                    number(&f[1], "NAPTR preference")?,
                    f[2].text.clone(),
                    f[3].text.clone(),
                    f[4].text.clone(),
                    qualify(&f[5].text, origin),
                );
            }
            RecordType::TLSA => {
                expect_fields(&rtype, f, 4)?;
                self.set_target_tlsa(
                    number(&f[0], "TLSA usage")?,
                    number(&f[1], "TLSA selector")?,
                    number(&f[2], "TLSA matching type")?,
                    f[3].text.to_ascii_lowercase(),
                );
            }
            RecordType::DS => {
                expect_fields(&rtype, f, 4)?;
                self.set_target_ds(
                    number(&f[0], "DS key tag")?,
                    number(&f[1], "DS algorithm")?,
                    number(&f[2], "DS digest type")?,
                    f[3].text.to_ascii_lowercase(),
                );
            }
            RecordType::SSHFP => {
                expect_fields(&rtype, f, 3)?;
                self.set_target_sshfp(
                    number(&f[0], "SSHFP algorithm")?,
                    number(&f[1], "SSHFP fingerprint type")?,
                    f[2].text.to_ascii_lowercase(),
                );
            }
            RecordType::HTTPS | RecordType::SVCB => {
                if f.len() < 2 {
                    return expect_fields(&rtype, f, 2);
                }
                let params = f[2..]
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.set_target_svcb(number(&f[0], "SVCB priority")?, qualify(&f[1].text, origin), params);
            }
            RecordType::DNSKEY => {
                if f.len() < 4 {
                    return expect_fields(&rtype, f, 4);
                }
                let key = f[3..].iter().map(|p| p.text.as_str()).collect::<String>();
                self.set_target_dnskey(
                    number(&f[0], "DNSKEY flags")?,
                    number(&f[1], "DNSKEY protocol")?,
                    number(&f[2], "DNSKEY algorithm")?,
                    key,
                );
            }
            RecordType::DHCID => {
                let data = f.iter().map(|p| p.text.as_str()).collect::<String>();
                self.set_target(data);
            }
            RecordType::LOC | RecordType::Custom(_) => {
                let data = f.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join(" ");
                self.set_target(data);
            }
        }
        Ok(())
    }

    /// The type-appropriate rendering of every RDATA field, in zone-file
    /// presentation format. Two records of the same type and key carry the
    /// same data exactly when their combined targets are equal.
    pub fn target_combined(&self) -> String {
        match self.rtype {
            RecordType::MX => format!("{} {}", self.mx_preference, self.target),
            RecordType::SRV => format!(
                "{} {} {} {}",
                self.srv_priority, self.srv_weight, self.srv_port, self.target
            ),
            RecordType::CAA => format!(
                "{} {} {}",
                self.caa_flag,
                self.caa_tag,
                txt::quote_rfc1035(&self.target)
            ),
            RecordType::TXT => txt::render_txt(&self.txt_strings),
            RecordType::SOA => format!(
                "{} {} {} {} {} {} {}",
                self.target,
                self.soa_mbox,
                self.soa_serial,
                self.soa_refresh,
                self.soa_retry,
                self.soa_expire,
                self.soa_minttl
            ),
            RecordType::NAPTR => format!(
                "{} {} {} {} {} {}",
                self.naptr_order,
                self.naptr_preference,
                txt::quote_rfc1035(&self.naptr_flags),
                txt::quote_rfc1035(&self.naptr_service),
                txt::quote_rfc1035(&self.naptr_regexp),
                self.target
            ),
            RecordType::TLSA => format!(
                "{} {} {} {}",
                self.tlsa_usage, self.tlsa_selector, self.tlsa_matching_type, self.target
            ),
            RecordType::DS => format!(
                "{} {} {} {}",
                self.ds_key_tag, self.ds_algorithm, self.ds_digest_type, self.ds_digest
            ),
            RecordType::SSHFP => format!(
                "{} {} {}",
                self.sshfp_algorithm, self.sshfp_fingerprint, self.target
            ),
            RecordType::HTTPS | RecordType::SVCB => {
                if self.svc_params.is_empty() {
                    format!("{} {}", self.svc_priority, self.target)
                } else {
                    format!("{} {} {}", self.svc_priority, self.target, self.svc_params)
                }
            }
            RecordType::DNSKEY => format!(
                "{} {} {} {}",
                self.dnskey_flags, self.dnskey_protocol, self.dnskey_algorithm, self.target
            ),
            _ => self.target.clone(),
        }
    }

    /// The combined target plus TTL and metadata, for human display.
    pub fn target_debug(&self) -> String {
        let mut out = format!("{} ttl={}", self.target_combined(), self.ttl);
        for (key, value) in &self.metadata {
            out.push_str(&format!(" {key}={value}"));
        }
        out
    }

    /// The TXT strings joined by a single space; a display view that
    /// keeps element boundaries visible.
    pub fn txt_joined(&self) -> String {
        self.txt_strings.join(" ")
    }

    /// The TXT strings concatenated, which is how resolvers and
    /// single-string provider APIs see them.
    pub fn txt_concatenated(&self) -> String {
        self.txt_strings.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(rtype: &str, contents: &str) -> RecordConfig {
        RecordConfig::from_string("@", 300, rtype, contents, "example.com").unwrap()
    }

    #[test]
    fn qualifies_host_targets() {
        assert_eq!(qualify("www", "example.com"), "www.example.com.");
        assert_eq!(qualify("@", "example.com."), "example.com.");
        assert_eq!(qualify("other.net.", "example.com"), "other.net.");
        assert_eq!(parse("CNAME", "www").target(), "www.example.com.");
    }

    #[test]
    fn mx_and_srv() {
        let mx = parse("MX", "10 mail");
        assert_eq!(mx.mx_preference, 10);
        assert_eq!(mx.target_combined(), "10 mail.example.com.");
        let srv = parse("SRV", "5 10 5060 sip.example.net.");
        assert_eq!((srv.srv_priority, srv.srv_weight, srv.srv_port), (5, 10, 5060));
        assert_eq!(srv.target_combined(), "5 10 5060 sip.example.net.");
    }

    #[test]
    fn caa_value_is_quoted_when_combined() {
        let caa = parse("CAA", r#"128 issue "letsencrypt.org""#);
        assert_eq!(caa.caa_flag, 128);
        assert_eq!(caa.caa_tag, "issue");
        assert_eq!(caa.target(), "letsencrypt.org");
        assert_eq!(caa.target_combined(), r#"128 issue "letsencrypt.org""#);
    }

    #[test]
    fn txt_keeps_the_list() {
        let txt = parse("TXT", r#""part one" "part \"two\"""#);
        assert_eq!(txt.txt_strings, vec!["part one", "part \"two\""]);
        assert_eq!(txt.txt_joined(), "part one part \"two\"");
        assert_eq!(txt.txt_concatenated(), "part onepart \"two\"");
        assert_eq!(txt.target_combined(), r#""part one" "part \"two\"""#);
        let empty = parse("TXT", r#""""#);
        assert_eq!(empty.txt_strings, vec![""]);
        assert_eq!(empty.target_combined(), r#""""#);
        assert!(RecordConfig::from_string("@", 0, "TXT", "", "example.com").is_err());
    }

    #[test]
    fn soa_fields() {
        let soa = parse("SOA", "ns1 hostmaster 2024010100 3600 600 604800 1440");
        assert_eq!(soa.target(), "ns1.example.com.");
        assert_eq!(soa.soa_mbox, "hostmaster.example.com.");
        assert_eq!(soa.soa_serial, 2024010100);
        assert_eq!(soa.soa_minttl, 1440);
    }

    #[test]
    fn dnssec_related_types() {
        let ds = parse("DS", "12345 13 2 ABCDEF");
        assert_eq!(ds.target_combined(), "12345 13 2 abcdef");
        let tlsa = parse("TLSA", "3 1 1 AABB");
        assert_eq!(tlsa.target_combined(), "3 1 1 aabb");
        let sshfp = parse("SSHFP", "4 2 ff00");
        assert_eq!(sshfp.target_combined(), "4 2 ff00");
        let key = parse("DNSKEY", "257 3 13 abc def");
        assert_eq!(key.target_combined(), "257 3 13 abcdef");
    }

    #[test]
    fn naptr_and_svcb() {
        let naptr = parse("NAPTR", r#"100 10 "U" "E2U+sip" "!^.*$!sip:info@example.com!" ."#);
        assert_eq!(naptr.naptr_service, "E2U+sip");
        assert_eq!(naptr.target(), ".");
        let https = parse("HTTPS", "1 . alpn=h2,h3");
        assert_eq!(https.target_combined(), "1 . alpn=h2,h3");
    }

    #[test]
    fn bad_rdata_is_rejected() {
        assert!(RecordConfig::from_string("@", 0, "A", "1.2.3", "example.com").is_err());
        assert!(RecordConfig::from_string("@", 0, "AAAA", "1.2.3.4", "example.com").is_err());
        assert!(RecordConfig::from_string("@", 0, "MX", "mail", "example.com").is_err());
        assert!(RecordConfig::from_string("@", 0, "MX", "x mail", "example.com").is_err());
    }
}
