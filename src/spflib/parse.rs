use std::fmt;
use std::str::FromStr;

use snafu::OptionExt;

use crate::common::{Result, SpfSnafu};

use super::TxtResolver;

pub const SPF_PREFIX: &str = "v=spf1";

/// How a matching mechanism votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Qualifier {
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl Qualifier {
    fn from_prefix(c: char) -> Option<Self> {
        match c {
            '+' => Some(Qualifier::Pass),
            '-' => Some(Qualifier::Fail),
            '~' => Some(Qualifier::SoftFail),
            '?' => Some(Qualifier::Neutral),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Qualifier::Pass => "",
            Qualifier::Fail => "-",
            Qualifier::SoftFail => "~",
            Qualifier::Neutral => "?",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Mechanism {
    All,
    Ip(cidr::IpCidr),
    A(Option<String>),
    Mx(Option<String>),
    Ptr(Option<String>),
    Include(String),
    Exists(String),
    Redirect(String),
    /// `exp=` and unknown modifiers. Never matches.
    Modifier,
}

impl Mechanism {
    /// Number of DNS lookups the mechanism itself costs.
    pub fn lookups(&self) -> usize {
        match self {
            Mechanism::A(_)
            | Mechanism::Mx(_)
            | Mechanism::Ptr(_)
            | Mechanism::Include(_)
            | Mechanism::Exists(_)
            | Mechanism::Redirect(_) => 1,
            Mechanism::All | Mechanism::Ip(_) | Mechanism::Modifier => 0,
        }
    }
}

/// One term of an SPF record, with the record it includes resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub text: String,
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
    pub included: Option<Box<SpfRecord>>,
}

impl Part {
    /// The lookups this term costs, counting everything it pulls in.
    pub fn lookups(&self) -> usize {
        self.mechanism.lookups() + self.included.as_ref().map_or(0, |r| r.lookups())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpfRecord {
    pub parts: Vec<Part>,
}

impl SpfRecord {
    /// Parses `text`, resolving every `include:` (and `redirect=`) through
    /// `resolver`.
    pub fn parse(text: &str, resolver: &dyn TxtResolver) -> Result<Self> {
        let mut chain = Vec::new();
        parse_chain(text, resolver, &mut chain)
    }

    /// Parses `text` without following includes. Included records stay
    /// unresolved.
    pub fn parse_shallow(text: &str) -> Result<Self> {
        let body = strip_prefix(text)?;
        let parts = body
            .split_whitespace()
            .map(parse_part)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { parts })
    }

    /// Total DNS lookups a receiver performs evaluating this record.
    pub fn lookups(&self) -> usize {
        self.parts.iter().map(Part::lookups).sum()
    }

    /// The trailing `all` term, if any.
    pub fn all(&self) -> Option<&Part> {
        self.parts.iter().rev().find(|p| p.mechanism == Mechanism::All)
    }
}

impl fmt::Display for SpfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SPF_PREFIX)?;
        for part in &self.parts {
            write!(f, " {}", part.text)?;
        }
        Ok(())
    }
}

/// True if `text` looks like an SPF policy.
pub fn is_spf(text: &str) -> bool {
    strip_prefix(text).is_ok()
}

fn strip_prefix(text: &str) -> Result<&str> {
    let text = text.trim();
    let head = text.get(..SPF_PREFIX.len()).filter(|h| h.eq_ignore_ascii_case(SPF_PREFIX));
    let rest = head
        .map(|h| &text[h.len()..])
        .filter(|rest| rest.is_empty() || rest.starts_with(' '))
        .context(SpfSnafu {
            message: format!("not an SPF record: {text:?}"),
        })?;
    Ok(rest.trim_start())
}

fn parse_chain(text: &str, resolver: &dyn TxtResolver, chain: &mut Vec<String>) -> Result<SpfRecord> {
    let mut record = SpfRecord::parse_shallow(text)?;
    for part in record.parts.iter_mut() {
        let target = match &part.mechanism {
            Mechanism::Include(domain) | Mechanism::Redirect(domain) => domain.clone(),
            _ => continue,
        };
        if chain.iter().any(|seen| seen.eq_ignore_ascii_case(&target)) {
            return SpfSnafu {
                message: format!("include loop: {} -> {target}", chain.join(" -> ")),
            }
            .fail();
        }
        let policy = lookup_policy(&target, resolver)?;
        chain.push(target);
        let included = parse_chain(&policy, resolver, chain)?;
        chain.pop();
        part.included = Some(Box::new(included));
    }
    Ok(record)
}

/// Fetches the single SPF policy published at `domain`.
pub fn lookup_policy(domain: &str, resolver: &dyn TxtResolver) -> Result<String> {
    let mut policies = resolver
        .txt(domain)?
        .into_iter()
        .filter(|txt| is_spf(txt));
    let policy = policies.next().context(SpfSnafu {
        message: format!("{domain} has no SPF record"),
    })?;
    if policies.next().is_some() {
        return SpfSnafu {
            message: format!("{domain} has more than one SPF record"),
        }
        .fail();
    }
    Ok(policy)
}

fn parse_part(text: &str) -> Result<Part> {
    let (qualifier, term) = match text.chars().next().and_then(Qualifier::from_prefix) {
        Some(q) => (q, &text[1..]),
        None => (Qualifier::Pass, text),
    };
    let lower = term.to_ascii_lowercase();
    let (name, arg) = match lower.find([':', '=']) {
        Some(i) => (&lower[..i], Some(&term[i + 1..])),
        None => match lower.find('/') {
            Some(i) => (&lower[..i], None),
            None => (lower.as_str(), None),
        },
    };
    let required = |what: &str| {
        arg.filter(|a| !a.is_empty())
            .map(str::to_string)
            .context(SpfSnafu {
                message: format!("{what} needs a domain: {text:?}"),
            })
    };
    let mechanism = match name {
        "all" => Mechanism::All,
        "ip4" | "ip6" => Mechanism::Ip(parse_network(name, arg.unwrap_or_default())?),
        "a" => Mechanism::A(arg.map(str::to_string)),
        "mx" => Mechanism::Mx(arg.map(str::to_string)),
        "ptr" => Mechanism::Ptr(arg.map(str::to_string)),
        "include" => Mechanism::Include(required("include")?),
        "exists" => Mechanism::Exists(required("exists")?),
        "redirect" => Mechanism::Redirect(required("redirect")?),
        _ if lower.contains('=') => Mechanism::Modifier,
        _ => {
            return SpfSnafu {
                message: format!("unknown mechanism {text:?}"),
            }
            .fail()
        }
    };
    Ok(Part {
        text: text.to_string(),
        qualifier,
        mechanism,
        included: None,
    })
}

fn parse_network(kind: &str, arg: &str) -> Result<cidr::IpCidr> {
    let full = match (arg.contains('/'), kind) {
        (true, _) => arg.to_string(),
        (false, "ip4") => format!("{arg}/32"),
        (false, _) => format!("{arg}/128"),
    };
    let inet = cidr::IpInet::from_str(&full).ok().context(SpfSnafu {
        message: format!("bad {kind} network {arg:?}"),
    })?;
    let family_ok = matches!((kind, &inet), ("ip4", cidr::IpInet::V4(_)) | ("ip6", cidr::IpInet::V6(_)));
    if !family_ok {
        return SpfSnafu {
            message: format!("{kind} given a network of the wrong family: {arg:?}"),
        }
        .fail();
    }
    Ok(inet.network())
}
