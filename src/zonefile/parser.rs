use std::io::Read;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::common::{Error, IoSnafu, ParseSnafu, Result};
use crate::models::txt::Field;
use crate::models::{normalize_origin, RecordConfig, RecordType, Records, DEFAULT_TTL};

use super::tokenizer::{logical_lines, Line};

const MAX_INCLUDE_DEPTH: usize = 8;

/// Parses RFC 1035 zone files into [`Records`].
///
/// `$TTL`, `$ORIGIN` and `$INCLUDE` are honoured. Any malformed line
/// fails the whole parse; no partial result is returned.
pub struct ZoneParser {
    zone: String,
    origin: String,
    default_ttl: Option<u32>,
    previous_owner: Option<String>,
    previous_ttl: Option<u32>,
    include_dir: Option<PathBuf>,
    depth: usize,
}

impl ZoneParser {
    pub fn new(zone: &str) -> Self {
        let zone = normalize_origin(zone);
        Self {
            origin: zone.clone(),
            zone,
            default_ttl: None,
            previous_owner: None,
            previous_ttl: None,
            include_dir: None,
            depth: 0,
        }
    }

    /// Directory that relative `$INCLUDE` paths are resolved against.
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }

    pub fn parse_reader(&mut self, mut reader: impl Read) -> Result<Records> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|err| {
                ParseSnafu {
                    line: 0usize,
                    message: format!("cannot read zone data: {err}"),
                }
                .build()
            })?;
        self.parse_str(&text)
    }

    pub fn parse_str(&mut self, text: &str) -> Result<Records> {
        let mut records = Records::new();
        for line in logical_lines(text)? {
            let number = line.number;
            let first = &line.fields[0].text;
            if !line.leading_blank && first.starts_with('$') {
                self.directive(&line, &mut records)?;
            } else {
                let rc = self.record(&line).map_err(|err| at_line(number, err))?;
                records.push(rc);
            }
        }
        tracing::debug!(zone = self.zone, records = records.len(), "Parsed zone data");
        Ok(records)
    }

    fn directive(&mut self, line: &Line, records: &mut Records) -> Result<()> {
        let name = line.fields[0].text.to_ascii_uppercase();
        let args = &line.fields[1..];
        match name.as_str() {
            "$TTL" => {
                let ttl = args
                    .first()
                    .ok_or_else(|| parse_error(line.number, "$TTL needs a value"))?;
                self.default_ttl = Some(parse_ttl(&ttl.text).map_err(|m| parse_error(line.number, &m))?);
            }
            "$ORIGIN" => {
                let origin = args
                    .first()
                    .ok_or_else(|| parse_error(line.number, "$ORIGIN needs a name"))?;
                self.origin = self.absolute(&origin.text);
            }
            "$INCLUDE" => {
                let path = args
                    .first()
                    .ok_or_else(|| parse_error(line.number, "$INCLUDE needs a path"))?;
                if self.depth >= MAX_INCLUDE_DEPTH {
                    return Err(parse_error(line.number, "$INCLUDE nested too deeply"));
                }
                let origin = args.get(1).map(|o| self.absolute(&o.text));
                records.extend(self.include(Path::new(&path.text), origin)?);
            }
            other => {
                return Err(parse_error(line.number, &format!("unknown directive {other}")));
            }
        }
        Ok(())
    }

    fn include(&self, path: &Path, origin: Option<String>) -> Result<Records> {
        let full = match (&self.include_dir, path.is_relative()) {
            (Some(dir), true) => dir.join(path),
            _ => path.to_path_buf(),
        };
        let text = std::fs::read_to_string(&full).context(IoSnafu { path: full.clone() })?;
        let mut nested = ZoneParser {
            zone: self.zone.clone(),
            origin: origin.unwrap_or_else(|| self.origin.clone()),
            default_ttl: self.default_ttl,
            previous_owner: None,
            previous_ttl: self.previous_ttl,
            include_dir: full.parent().map(Path::to_path_buf),
            depth: self.depth + 1,
        };
        nested.parse_str(&text)
    }

    /// Resolves a possibly relative name against the current origin.
    fn absolute(&self, name: &str) -> String {
        if name == "@" {
            self.origin.clone()
        } else if let Some(fqdn) = name.strip_suffix('.') {
            fqdn.to_ascii_lowercase()
        } else if self.origin.is_empty() {
            name.to_ascii_lowercase()
        } else {
            format!("{}.{}", name.to_ascii_lowercase(), self.origin)
        }
    }

    fn record(&mut self, line: &Line) -> Result<RecordConfig> {
        let mut fields = line.fields.iter().peekable();

        let owner = if line.leading_blank {
            self.previous_owner.clone().ok_or_else(|| {
                parse_error(line.number, "record has no owner and there is no previous one")
            })?
        } else {
            let raw = fields.next().map(|f| f.text.as_str()).unwrap_or("@");
            self.absolute(raw)
        };

        let mut ttl = None;
        let mut rtype = None;
        while let Some(field) = fields.next() {
            let text = field.text.as_str();
            if ttl.is_none() && text.starts_with(|c: char| c.is_ascii_digit()) {
                ttl = Some(parse_ttl(text).map_err(|m| parse_error(line.number, &m))?);
            } else if text.eq_ignore_ascii_case("IN") {
                continue;
            } else if ["CH", "HS", "CS"].iter().any(|c| text.eq_ignore_ascii_case(c)) {
                return Err(parse_error(line.number, &format!("unsupported class {text}")));
            } else {
                rtype = Some(
                    text.parse::<RecordType>()
                        .map_err(|m| parse_error(line.number, &m))?,
                );
                break;
            }
        }
        let rtype = rtype.ok_or_else(|| parse_error(line.number, "record has no type"))?;
        let rdata: Vec<Field> = fields.cloned().collect();

        let ttl = ttl
            .or(self.default_ttl)
            .or(self.previous_ttl)
            .unwrap_or(DEFAULT_TTL);

        let mut rc = RecordConfig::new(rtype, &self.zone);
        rc.set_label_from_fqdn(&owner, &self.zone)?;
        rc.ttl = ttl;
        rc.set_target_fields(&rdata, &self.origin)?;

        self.previous_owner = Some(owner);
        self.previous_ttl = Some(ttl);
        Ok(rc)
    }
}

/// Parses zone data for `origin` from a byte stream.
pub fn parse_zone(reader: impl Read, origin: &str) -> Result<Records> {
    ZoneParser::new(origin).parse_reader(reader)
}

/// Parses zone data for `origin` from a string.
pub fn parse_zone_str(text: &str, origin: &str) -> Result<Records> {
    ZoneParser::new(origin).parse_str(text)
}

/// Parses a TTL, accepting BIND-style unit suffixes (`1h30m`, `2d`).
pub fn parse_ttl(text: &str) -> std::result::Result<u32, String> {
    if let Ok(plain) = text.parse::<u32>() {
        return Ok(plain);
    }
    let invalid = || format!("invalid TTL {text:?}");
    let mut total: u32 = 0;
    let mut current: u32 = 0;
    let mut seen_digit = false;
    for c in text.chars() {
        if let Some(d) = c.to_digit(10) {
            current = current
                .checked_mul(10)
                .and_then(|v| v.checked_add(d))
                .ok_or_else(invalid)?;
            seen_digit = true;
            continue;
        }
        let unit: u32 = match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            'w' => 604800,
            _ => return Err(invalid()),
        };
        if !seen_digit {
            return Err(invalid());
        }
        total = current
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
        current = 0;
        seen_digit = false;
    }
    total.checked_add(current).ok_or_else(invalid)
}

fn parse_error(line: usize, message: &str) -> Error {
    ParseSnafu { line, message }.build()
}

fn at_line(line: usize, err: Error) -> Error {
    match err {
        Error::ParseError { .. } => err,
        other => parse_error(line, &other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "\
$ORIGIN example.com.
$TTL 3600
@   IN SOA ns1 hostmaster (
        2024010100 ; serial
        3600 600 604800 1440 )
    IN NS  ns1
    IN NS  ns2.example.net.
ns1 300 IN A 192.0.2.1
    IN AAAA 2001:db8::1
www IN 600 CNAME ns1
txt TXT \"hello world\" \"second\"
$ORIGIN sub.example.com.
deep MX 10 mail
";

    #[test]
    fn parses_a_full_zone() {
        let records = parse_zone_str(ZONE, "example.com").unwrap();
        assert_eq!(records.len(), 8);

        let soa = &records[0];
        assert_eq!(soa.rtype, RecordType::SOA);
        assert_eq!(soa.target(), "ns1.example.com.");
        assert_eq!(soa.soa_serial, 2024010100);
        assert_eq!(soa.ttl, 3600);

        assert_eq!(records[1].name(), "@");
        assert_eq!(records[1].target(), "ns1.example.com.");
        assert_eq!(records[2].target(), "ns2.example.net.");

        assert_eq!(records[3].ttl, 300);
        assert_eq!(records[4].name(), "ns1");
        assert_eq!(records[4].rtype, RecordType::AAAA);
        assert_eq!(records[4].ttl, 3600);

        assert_eq!(records[5].ttl, 600);
        assert_eq!(records[5].target(), "ns1.example.com.");

        assert_eq!(records[6].txt_strings, vec!["hello world", "second"]);

        assert_eq!(records[7].name(), "deep.sub");
        assert_eq!(records[7].target_combined(), "10 mail.sub.example.com.");
    }

    #[test]
    fn empty_txt_string_survives() {
        let records = parse_zone_str("@ 300 IN TXT \"\"\n", "example.com").unwrap();
        assert_eq!(records[0].txt_strings, vec![""]);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_zone_str("@ IN A 1.2.3.4\nwww IN A not-an-ip\n", "example.com").unwrap_err();
        assert!(matches!(err, Error::ParseError { line: 2, .. }), "{err}");
        assert!(parse_zone_str("  IN A 1.2.3.4\n", "example.com").is_err());
        assert!(parse_zone_str("other.net. IN A 1.2.3.4\n", "example.com").is_err());
        assert!(parse_zone_str("$BOGUS x\n", "example.com").is_err());
        assert!(parse_zone_str("@ CH A 1.2.3.4\n", "example.com").is_err());
    }

    #[test]
    fn includes_are_resolved_relative_to_the_include_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hosts.inc"), "app IN A 192.0.2.10\n").unwrap();
        let records = ZoneParser::new("example.com")
            .with_include_dir(dir.path())
            .parse_str("$INCLUDE hosts.inc\n$INCLUDE hosts.inc lab.example.com.\n")
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "app");
        assert_eq!(records[1].name(), "app.lab");
    }

    #[test]
    fn ttl_units() {
        assert_eq!(parse_ttl("300"), Ok(300));
        assert_eq!(parse_ttl("1h30m"), Ok(5400));
        assert_eq!(parse_ttl("2D"), Ok(172800));
        assert!(parse_ttl("h").is_err());
        assert!(parse_ttl("5x").is_err());
    }

    #[test]
    fn oversized_ttls_are_errors() {
        assert_eq!(parse_ttl("4294967295"), Ok(u32::MAX));
        assert!(parse_ttl("4294967296").is_err());
        assert!(parse_ttl("99999999999999999999999s").is_err());
        assert!(parse_ttl("7102w").is_err());
        assert!(parse_ttl("7101w1d").is_ok());
        let err = parse_zone_str("www 99999999999999999999 IN A 192.0.2.1\n", "example.com").unwrap_err();
        assert!(matches!(err, Error::ParseError { line: 1, .. }), "{err}");
    }
}
