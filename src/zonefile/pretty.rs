use std::collections::HashMap;
use std::io::Write;

use crate::models::{normalize_origin, RecordConfig, RecordType, DEFAULT_TTL};

use super::sorting::sort_records;

/// Column widths for label, TTL, class, type and RDATA.
const COLUMNS: [usize; 5] = [10, 5, 2, 5, 0];

/// A zone ready to be written in sorted, human-friendly form.
pub struct PrettyZone {
    origin: String,
    default_ttl: u32,
    records: Vec<RecordConfig>,
    comments: Vec<String>,
}

impl PrettyZone {
    /// Prepares `records` for output. A `default_ttl` of 0 picks the most
    /// common TTL of the zone.
    pub fn new(records: &[RecordConfig], origin: &str, default_ttl: u32, comments: &[String]) -> Self {
        let mut records = records.to_vec();
        sort_records(&mut records);
        let default_ttl = if default_ttl == 0 {
            most_common_ttl(&records)
        } else {
            default_ttl
        };
        Self {
            origin: normalize_origin(origin),
            default_ttl,
            records,
            comments: comments.to_vec(),
        }
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    /// Writes the zone to `w`.
    pub fn write_to(&self, w: &mut impl Write) -> std::io::Result<()> {
        writeln!(w, "$TTL {}", self.default_ttl)?;
        for comment in &self.comments {
            writeln!(w, "; {comment}")?;
        }
        let mut previous_label: Option<String> = None;
        for rc in &self.records {
            let label = self.label_of(rc);
            let parseable = rc.rtype.is_zone_file_type();
            // Commented-out lines are invisible to a parser, so they neither
            // inherit nor hand down the owner column.
            let shown_label = if parseable && previous_label.as_deref() == Some(label.as_str()) {
                String::new()
            } else {
                label.clone()
            };
            if parseable {
                previous_label = Some(label);
            }

            let ttl = if rc.ttl != self.default_ttl && rc.ttl != 0 {
                rc.ttl.to_string()
            } else {
                String::new()
            };
            let line = format_line(&[
                shown_label.as_str(),
                ttl.as_str(),
                "IN",
                rc.rtype.as_str(),
                rc.target_combined().as_str(),
            ]);
            if parseable {
                writeln!(w, "{line}")?;
            } else {
                writeln!(w, ";{line}")?;
            }
        }
        Ok(())
    }

    /// Renders the zone into a string.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    fn label_of(&self, rc: &RecordConfig) -> String {
        relative_label(rc.name_fqdn(), &self.origin)
    }
}

/// The label of `fqdn` relative to an already normalized `origin`. Names
/// outside the origin are returned fully qualified.
pub(super) fn relative_label(fqdn: &str, origin: &str) -> String {
    if fqdn == origin {
        "@".to_string()
    } else if let Some(short) = fqdn.strip_suffix(&format!(".{origin}")) {
        short.to_string()
    } else {
        format!("{fqdn}.")
    }
}

/// The most common TTL among non-NS records; ties go to the larger
/// value. [`DEFAULT_TTL`] when there is nothing to count.
pub fn most_common_ttl(records: &[RecordConfig]) -> u32 {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for rc in records.iter().filter(|rc| rc.rtype != RecordType::NS) {
        *counts.entry(rc.ttl).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(ttl_a, count_a), (ttl_b, count_b)| count_a.cmp(count_b).then(ttl_a.cmp(ttl_b)))
        .map_or(DEFAULT_TTL, |(ttl, _)| ttl)
}

fn format_line(fields: &[&str]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(field);
        let width = COLUMNS.get(i).copied().unwrap_or(0);
        for _ in field.len()..width {
            line.push(' ');
        }
    }
    line.trim_end().to_string()
}

/// Writes `records` as a sorted, pretty-printed zone file.
pub fn write_zone_file(
    w: &mut impl Write,
    records: &[RecordConfig],
    origin: &str,
    default_ttl: u32,
    comments: &[String],
) -> std::io::Result<()> {
    PrettyZone::new(records, origin, default_ttl, comments).write_to(w)
}
