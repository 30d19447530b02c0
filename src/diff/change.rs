use std::fmt;

use crate::models::{RecordConfig, RecordKey, RecordType};

/// What a change does. The declaration order is the order changes are
/// emitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    Report,
    Delete,
    Change,
    Create,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Report => "REPORT",
            Verb::Delete => "DELETE",
            Verb::Change => "CHANGE",
            Verb::Create => "CREATE",
        })
    }
}

/// One instruction produced by the diff engine.
///
/// `rtype` is `None` for label and zone granularity, where a change spans
/// several types.
#[derive(Clone, Debug)]
pub struct Change {
    pub verb: Verb,
    pub name_fqdn: String,
    pub rtype: Option<RecordType>,
    pub old: Vec<RecordConfig>,
    pub new: Vec<RecordConfig>,
    pub msgs: Vec<String>,
}

impl Change {
    pub fn key(&self) -> Option<RecordKey> {
        self.rtype.as_ref().map(|rtype| RecordKey {
            name_fqdn: self.name_fqdn.clone(),
            rtype: rtype.clone(),
        })
    }

    /// All messages of the change, one per line.
    pub fn message(&self) -> String {
        self.msgs.join("\n")
    }

    pub fn is_report(&self) -> bool {
        self.verb == Verb::Report
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

pub(super) fn create_msg(rc: &RecordConfig) -> String {
    format!("+ CREATE {} {} {}", rc.rtype, rc.name_fqdn(), rc.target_debug())
}

/// `± TYPE name [ttl old new] old-target → new-target`; the TTL part only
/// appears when the TTL changes.
pub(super) fn modify_msg(old: &RecordConfig, new: &RecordConfig) -> String {
    let ttl = if old.ttl == new.ttl {
        String::new()
    } else {
        format!(" [ttl {} {}]", old.ttl, new.ttl)
    };
    format!(
        "± {} {}{ttl} {} → {}",
        new.rtype,
        new.name_fqdn(),
        with_metadata(old),
        with_metadata(new)
    )
}

fn with_metadata(rc: &RecordConfig) -> String {
    let mut out = rc.target_combined();
    for (key, value) in &rc.metadata {
        out.push_str(&format!(" {key}={value}"));
    }
    out
}

pub(super) fn delete_msg(rc: &RecordConfig) -> String {
    format!("- DELETE {} {} {}", rc.rtype, rc.name_fqdn(), rc.target_debug())
}
