use std::net::IpAddr;

use crate::common::{Result, SpfSnafu};
use crate::models::txt::MAX_STRING_OCTETS;

use super::parse::{Mechanism, Part, Qualifier, SpfRecord, SPF_PREFIX};

/// Which includes to inline: all of them (`*`) or the listed domains.
#[derive(Clone, Debug, PartialEq)]
pub enum FlattenSpec {
    All,
    Domains(Vec<String>),
}

impl FlattenSpec {
    pub fn parse(text: &str) -> Self {
        if text.trim() == "*" {
            return FlattenSpec::All;
        }
        FlattenSpec::Domains(
            text.split(',')
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        )
    }

    fn wants(&self, domain: &str) -> bool {
        match self {
            FlattenSpec::All => true,
            FlattenSpec::Domains(domains) => domains.iter().any(|d| d.eq_ignore_ascii_case(domain)),
        }
    }
}

impl SpfRecord {
    /// Inlines the includes `spec` selects. An include matches exactly
    /// when its record passes, so only the included terms that vote pass
    /// are carried over, each taking the include's own qualifier. The
    /// included record's `all` is dropped. Duplicate terms keep their
    /// first position.
    ///
    /// An include stays as it is when its record cannot be inlined
    /// without changing verdicts: a non-pass term ahead of a pass term,
    /// a passing `all`, a `redirect=` or a macro.
    pub fn flatten(&self, spec: &FlattenSpec) -> SpfRecord {
        let mut parts: Vec<Part> = Vec::new();
        for part in &self.parts {
            match (&part.mechanism, &part.included) {
                (Mechanism::Include(domain), Some(included)) if spec.wants(domain) => {
                    let inner = included.flatten(spec);
                    let Some(passing) = inlinable(&inner, domain) else {
                        tracing::warn!(include = %domain, "Include cannot be flattened without changing its meaning, keeping it");
                        push_unique(&mut parts, part.clone());
                        continue;
                    };
                    for mut p in passing {
                        if part.qualifier != Qualifier::Pass {
                            p.text = format!("{}{}", part.qualifier.prefix(), p.text);
                            p.qualifier = part.qualifier;
                        }
                        push_unique(&mut parts, p);
                    }
                }
                _ => push_unique(&mut parts, part.clone()),
            }
        }
        SpfRecord { parts }
    }

    /// Packs the record into a chain of TXT policies no longer than
    /// 255 octets each. The first entry is the apex (`@`); every entry but
    /// the last ends with `include:<next> <all>`. Tails are named by
    /// `format`, which must contain `{n}`, qualified with `domain`.
    pub fn split(&self, format: &str, domain: &str) -> Result<Vec<(String, String)>> {
        if !format.contains("{n}") {
            return SpfSnafu {
                message: format!("split format {format:?} has no {{n}}"),
            }
            .fail();
        }
        let domain = domain.trim_end_matches('.');
        let all = self
            .all()
            .map(|p| p.text.clone())
            .unwrap_or_else(|| "?all".to_string());
        let body: Vec<&str> = self
            .parts
            .iter()
            .filter(|p| p.mechanism != Mechanism::All)
            .map(|p| p.text.as_str())
            .collect();

        let mut chain = Vec::new();
        let mut remaining = &body[..];
        let mut label = "@".to_string();
        let mut n = 0usize;
        loop {
            let last_tail = format!(" {all}");
            if fits(remaining, &last_tail) {
                chain.push((label, assemble(remaining, &last_tail)));
                return Ok(chain);
            }
            let next = format!("{}.{domain}", format.replace("{n}", &n.to_string()));
            n += 1;
            let tail = format!(" include:{next} {all}");
            let take = (0..=remaining.len())
                .rev()
                .find(|&k| fits(&remaining[..k], &tail))
                .unwrap_or(0);
            if take == 0 {
                return SpfSnafu {
                    message: format!("cannot fit {:?} into a {MAX_STRING_OCTETS}-octet record", remaining[0]),
                }
                .fail();
            }
            chain.push((label, assemble(&remaining[..take], &tail)));
            remaining = &remaining[take..];
            label = next;
        }
    }

    /// Evaluates the record for a sender address without touching the
    /// network. Terms that need DNS (`a`, `mx`, `ptr`, `exists`) never
    /// match; includes and redirects use the records they resolved to.
    /// `None` is the neutral result of falling off the end.
    pub fn evaluate(&self, ip: IpAddr) -> Option<Qualifier> {
        for part in &self.parts {
            let matched = match (&part.mechanism, &part.included) {
                (Mechanism::All, _) => true,
                (Mechanism::Ip(net), _) => net.contains(&ip),
                (Mechanism::Include(_), Some(included)) => included.evaluate(ip) == Some(Qualifier::Pass),
                _ => false,
            };
            if matched {
                return Some(part.qualifier);
            }
        }
        let redirect = self.parts.iter().find_map(|p| match (&p.mechanism, &p.included) {
            (Mechanism::Redirect(_), Some(included)) => Some(included),
            _ => None,
        });
        redirect.and_then(|r| r.evaluate(ip))
    }
}

/// The pass terms of `inner` ready to stand in for `include:<domain>`,
/// or `None` when dropping its other terms would change a verdict.
fn inlinable(inner: &SpfRecord, domain: &str) -> Option<Vec<Part>> {
    let last_pass = inner
        .parts
        .iter()
        .rposition(|p| p.qualifier == Qualifier::Pass && p.mechanism != Mechanism::Modifier)?;
    let mut passing = Vec::new();
    for p in &inner.parts[..=last_pass] {
        match p.mechanism {
            Mechanism::Modifier => continue,
            Mechanism::All | Mechanism::Redirect(_) => return None,
            _ if p.qualifier != Qualifier::Pass || p.text.contains('%') => return None,
            _ => passing.push(with_domain(p, domain)),
        }
    }
    if inner.parts.iter().any(|p| matches!(p.mechanism, Mechanism::Redirect(_))) {
        return None;
    }
    Some(passing)
}

/// Spells out the domain a bare `a`, `mx` or `ptr` implicitly refers to,
/// so the term keeps its meaning once moved into another record. A
/// leading `+` is dropped.
fn with_domain(part: &Part, domain: &str) -> Part {
    let term = part.text.strip_prefix('+').unwrap_or(&part.text);
    let (name, mechanism) = match part.mechanism {
        Mechanism::A(None) => ("a", Mechanism::A(Some(domain.to_string()))),
        Mechanism::Mx(None) => ("mx", Mechanism::Mx(Some(domain.to_string()))),
        Mechanism::Ptr(None) => ("ptr", Mechanism::Ptr(Some(domain.to_string()))),
        _ => {
            return Part {
                text: term.to_string(),
                ..part.clone()
            }
        }
    };
    // Bare terms may still carry a CIDR suffix such as `a/24`.
    let suffix = term.get(name.len()..).unwrap_or_default();
    Part {
        text: format!("{name}:{domain}{suffix}"),
        qualifier: part.qualifier,
        mechanism,
        included: None,
    }
}

fn push_unique(parts: &mut Vec<Part>, part: Part) {
    if !parts.iter().any(|p| p.text.eq_ignore_ascii_case(&part.text)) {
        parts.push(part);
    }
}

fn assemble(terms: &[&str], tail: &str) -> String {
    let mut text = SPF_PREFIX.to_string();
    for term in terms {
        text.push(' ');
        text.push_str(term);
    }
    text.push_str(tail);
    text
}

fn fits(terms: &[&str], tail: &str) -> bool {
    let len = SPF_PREFIX.len() + terms.iter().map(|t| t.len() + 1).sum::<usize>() + tail.len();
    len <= MAX_STRING_OCTETS
}
