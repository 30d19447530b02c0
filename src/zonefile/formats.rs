//! Alternative zone renderings used by `get-zones`: the configuration DSL
//! and a tab separated listing. The DSL is read back by
//! [`parse_dsl`](super::parse_dsl), the listing by [`read_tsv`].

use std::io::Write;
use std::str::FromStr;

use crate::common::{ParseSnafu, Result};
use crate::models::txt::{quote_rfc1035, render_txt_dsl};
use crate::models::{normalize_origin, RecordConfig, RecordType, Records, DEFAULT_TTL};

use super::parser::parse_ttl;
use super::pretty::{most_common_ttl, relative_label, PrettyZone};
use super::sorting::sort_records;

/// Output formats understood by [`write_records`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Zone,
    Dsl,
    Tsv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zone" | "pretty" | "bind" => Ok(Self::Zone),
            "dsl" | "js" | "djs" => Ok(Self::Dsl),
            "tsv" => Ok(Self::Tsv),
            other => Err(format!("unknown output format {other:?}")),
        }
    }
}

/// Writes `records` of zone `origin` in `format`.
pub fn write_records(
    format: OutputFormat,
    w: &mut impl Write,
    records: &[RecordConfig],
    origin: &str,
    default_ttl: u32,
    comments: &[String],
) -> std::io::Result<()> {
    match format {
        OutputFormat::Zone => PrettyZone::new(records, origin, default_ttl, comments).write_to(w),
        OutputFormat::Dsl => write_dsl(w, records, origin, default_ttl),
        OutputFormat::Tsv => write_tsv(w, records, origin),
    }
}

/// Writes the zone as a `D(...)` declaration. Registrar and provider are
/// placeholders for the operator to fill in.
pub fn write_dsl(
    w: &mut impl Write,
    records: &[RecordConfig],
    origin: &str,
    default_ttl: u32,
) -> std::io::Result<()> {
    let origin = normalize_origin(origin);
    let mut sorted = records.to_vec();
    sort_records(&mut sorted);
    let default_ttl = if default_ttl == 0 {
        most_common_ttl(&sorted)
    } else {
        default_ttl
    };

    write!(w, "D({}, REG_CHANGEME, DnsProvider(DSP_CHANGEME)", quote_rfc1035(&origin))?;
    if default_ttl != DEFAULT_TTL {
        write!(w, ", DefaultTTL({default_ttl})")?;
    }
    for rc in &sorted {
        write!(w, ",\n\t{}", dsl_record(rc, &origin, default_ttl))?;
    }
    writeln!(w, "\n);")
}

fn dsl_record(rc: &RecordConfig, origin: &str, default_ttl: u32) -> String {
    let label = quote_rfc1035(&relative_label(rc.name_fqdn(), origin));
    let target = quote_rfc1035(rc.target());
    let mut out = match &rc.rtype {
        RecordType::NS if rc.is_apex() => format!("NAMESERVER({target}"),
        RecordType::MX => format!("MX({label}, {}, {target}", rc.mx_preference),
        RecordType::SRV => format!(
            "SRV({label}, {}, {}, {}, {target}",
            rc.srv_priority, rc.srv_weight, rc.srv_port
        ),
        RecordType::CAA => {
            let mut caa = format!("CAA({label}, {}, {target}", quote_rfc1035(&rc.caa_tag));
            if rc.caa_flag != 0 {
                caa.push_str(", CAA_CRITICAL");
            }
            caa
        }
        RecordType::TXT => format!("TXT({label}, {}", render_txt_dsl(&rc.txt_strings)),
        RecordType::TLSA => format!(
            "TLSA({label}, {}, {}, {}, {target}",
            rc.tlsa_usage, rc.tlsa_selector, rc.tlsa_matching_type
        ),
        RecordType::SSHFP => format!(
            "SSHFP({label}, {}, {}, {target}",
            rc.sshfp_algorithm, rc.sshfp_fingerprint
        ),
        RecordType::DS => format!(
            "DS({label}, {}, {}, {}, {}",
            rc.ds_key_tag,
            rc.ds_algorithm,
            rc.ds_digest_type,
            quote_rfc1035(&rc.ds_digest)
        ),
        RecordType::DNSKEY => format!(
            "DNSKEY({label}, {}, {}, {}, {target}",
            rc.dnskey_flags, rc.dnskey_protocol, rc.dnskey_algorithm
        ),
        RecordType::NAPTR => format!(
            "NAPTR({label}, {}, {}, {}, {}, {}, {target}",
            rc.naptr_order,
            rc.naptr_preference,
            quote_rfc1035(&rc.naptr_flags),
            quote_rfc1035(&rc.naptr_service),
            quote_rfc1035(&rc.naptr_regexp)
        ),
        RecordType::HTTPS | RecordType::SVCB => format!(
            "{}({label}, {}, {target}, {}",
            rc.rtype,
            rc.svc_priority,
            quote_rfc1035(&rc.svc_params)
        ),
        RecordType::SOA => format!(
            "SOA({label}, {target}, {}, {}, {}, {}, {}",
            quote_rfc1035(&rc.soa_mbox),
            rc.soa_refresh,
            rc.soa_retry,
            rc.soa_expire,
            rc.soa_minttl
        ),
        // Provider rules live at the apex and take their two halves as
        // separate arguments.
        RecordType::Custom(_) if rc.is_apex() && rc.target().contains(',') => {
            let (pattern, destination) = rc.target().split_once(',').unwrap_or_default();
            format!(
                "{}({}, {}",
                rc.rtype,
                quote_rfc1035(pattern),
                quote_rfc1035(destination)
            )
        }
        other => format!("{other}({label}, {target}"),
    };
    if rc.ttl != 0 && rc.ttl != default_ttl {
        out.push_str(&format!(", TTL({})", rc.ttl));
    }
    if !rc.metadata.is_empty() {
        let meta = rc
            .metadata
            .iter()
            .map(|(k, v)| format!("{}: {}", quote_rfc1035(k), quote_rfc1035(v)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(", {{{meta}}}"));
    }
    out.push(')');
    out
}

/// Writes one `label\tttl\tIN\ttype\tvalue` line per record.
pub fn write_tsv(w: &mut impl Write, records: &[RecordConfig], origin: &str) -> std::io::Result<()> {
    let origin = normalize_origin(origin);
    let mut sorted = records.to_vec();
    sort_records(&mut sorted);
    for rc in &sorted {
        writeln!(
            w,
            "{}\t{}\tIN\t{}\t{}",
            relative_label(rc.name_fqdn(), &origin),
            rc.ttl,
            rc.rtype,
            rc.target_combined()
        )?;
    }
    Ok(())
}

/// Reads the listing [`write_tsv`] produces. Blank lines and lines
/// starting with `#` are skipped.
pub fn read_tsv(text: &str, origin: &str) -> Result<Records> {
    let mut records = Records::new();
    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = line.splitn(5, '\t').collect();
        let [label, ttl, class, rtype, value] = columns.as_slice() else {
            return ParseSnafu {
                line: line_number,
                message: format!("expected 5 tab separated columns, got {}", columns.len()),
            }
            .fail();
        };
        if !class.eq_ignore_ascii_case("IN") {
            return ParseSnafu {
                line: line_number,
                message: format!("unsupported class {class:?}"),
            }
            .fail();
        }
        let ttl = parse_ttl(ttl).map_err(|message| ParseSnafu { line: line_number, message }.build())?;
        let rc = RecordConfig::from_string(label, ttl, rtype, value, origin).map_err(|err| {
            ParseSnafu {
                line: line_number,
                message: format!("{rtype} {label}: {err}"),
            }
            .build()
        })?;
        records.push(rc);
    }
    tracing::debug!(origin = origin, records = records.len(), "Read TSV listing");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(label: &str, ttl: u32, rtype: &str, content: &str) -> RecordConfig {
        RecordConfig::from_string(label, ttl, rtype, content, "example.com").unwrap()
    }

    fn render(format: OutputFormat, records: &[RecordConfig]) -> String {
        let mut out = Vec::new();
        write_records(format, &mut out, records, "example.com", 300, &[]).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn dsl_output() {
        let records = vec![
            rec("@", 300, "A", "1.2.3.4"),
            rec("@", 300, "MX", "10 mx.example.com."),
            rec("@", 3600, "TXT", "\"v=spf1 -all\""),
            rec("@", 300, "NS", "ns1.example."),
            rec("multi", 300, "TXT", "\"a\" \"b\""),
            rec("@", 300, "CAA", "128 issue \"letsencrypt.org\""),
        ];
        assert_eq!(
            render(OutputFormat::Dsl, &records),
            "D(\"example.com\", REG_CHANGEME, DnsProvider(DSP_CHANGEME),\n\
             \tNAMESERVER(\"ns1.example.\"),\n\
             \tA(\"@\", \"1.2.3.4\"),\n\
             \tCAA(\"@\", \"issue\", \"letsencrypt.org\", CAA_CRITICAL),\n\
             \tMX(\"@\", 10, \"mx.example.com.\"),\n\
             \tTXT(\"@\", 'v=spf1 -all', TTL(3600)),\n\
             \tTXT(\"multi\", ['a', 'b'])\n\
             );\n"
        );
    }

    #[test]
    fn tsv_output() {
        let records = vec![rec("www", 600, "CNAME", "@"), rec("@", 300, "A", "1.2.3.4")];
        assert_eq!(
            render(OutputFormat::Tsv, &records),
            "@\t300\tIN\tA\t1.2.3.4\nwww\t600\tIN\tCNAME\texample.com.\n"
        );
    }

    #[test]
    fn format_names() {
        assert_eq!("DSL".parse::<OutputFormat>(), Ok(OutputFormat::Dsl));
        assert_eq!("pretty".parse::<OutputFormat>(), Ok(OutputFormat::Zone));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn dsl_rules_take_two_arguments() {
        let mut redirect = RecordConfig::new(RecordType::Custom("CF_TEMP_REDIRECT".into()), "example.com");
        redirect.ttl = 300;
        redirect.set_target("example.com/*,https://www.example.com/$1");
        let out = render(OutputFormat::Dsl, &[redirect]);
        assert!(
            out.contains("\tCF_TEMP_REDIRECT(\"example.com/*\", \"https://www.example.com/$1\")"),
            "{out}"
        );
    }

    #[test]
    fn tsv_reads_back() {
        let records = vec![
            rec("www", 600, "CNAME", "@"),
            rec("@", 300, "A", "1.2.3.4"),
            rec("@", 300, "MX", "10 mx.example.com."),
            rec("txt", 300, "TXT", "\"a\tb\" \"c d\""),
            rec("_sip._tcp", 300, "SRV", "10 5 5060 sip"),
            rec("@", 300, "CAA", "0 issue \"letsencrypt.org\""),
        ];
        let listing = render(OutputFormat::Tsv, &records);
        let read = read_tsv(&format!("# exported\n\n{listing}"), "example.com").unwrap();
        let mut expected = records.clone();
        sort_records(&mut expected);
        assert_eq!(read.len(), expected.len());
        for (got, want) in read.iter().zip(&expected) {
            assert_eq!(got.name_fqdn(), want.name_fqdn());
            assert_eq!(got.ttl, want.ttl);
            assert_eq!(got.target_combined(), want.target_combined());
        }
    }

    #[test]
    fn tsv_errors_carry_the_line() {
        let cases = [
            ("@\t300\tIN\tA\n", 1, "expected 5 tab separated columns"),
            ("@\t300\tIN\tA\t1.2.3.4\n@\t300\tCH\tA\t1.2.3.4\n", 2, "unsupported class"),
            ("\n@\tsoon\tIN\tA\t1.2.3.4\n", 2, "invalid TTL"),
            ("@\t300\tIN\tA\tnot-an-ip\n", 1, "invalid IPv4 address"),
        ];
        for (text, line, needle) in cases {
            let err = read_tsv(text, "example.com").unwrap_err();
            assert!(
                matches!(err, crate::common::Error::ParseError { line: l, .. } if l == line),
                "{err}"
            );
            assert!(err.to_string().contains(needle), "{err}");
        }
    }
}
