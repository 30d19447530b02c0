use std::collections::{BTreeMap, HashSet};

use crate::models::{RecordConfig, RecordKey};

use super::change::{create_msg, delete_msg, modify_msg};
use super::compare::{analyze, Comparable, KeyDiff};
use super::{Change, Verb};

type ReportIf<'a> = dyn Fn(&RecordKey) -> Option<String> + Send + Sync + 'a;

/// Computes the changes that turn existing records into desired ones.
///
/// Every granularity returns the changes in emission order (REPORTs,
/// then DELETEs, CHANGEs and CREATEs, each sorted by key) together with
/// the number of changes that actually do something.
#[derive(Default)]
pub struct Differ<'a> {
    keep_unknown: bool,
    comparable: Option<Box<Comparable<'a>>>,
    report_if: Option<Box<ReportIf<'a>>>,
}

impl<'a> Differ<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves existing RRsets that are not declared at all untouched.
    pub fn keep_unknown(mut self, keep: bool) -> Self {
        self.keep_unknown = keep;
        self
    }

    /// Adds provider specific data (routing policy, weights, ...) to the
    /// identity of a record, so that a difference in it is a change.
    pub fn compare_with(mut self, f: impl Fn(&RecordConfig) -> String + Send + Sync + 'a) -> Self {
        self.comparable = Some(Box::new(f));
        self
    }

    /// Turns changes to RRsets for which `f` returns a reason into
    /// REPORTs. The existing records of such sets are kept as they are.
    pub fn report_if(mut self, f: impl Fn(&RecordKey) -> Option<String> + Send + Sync + 'a) -> Self {
        self.report_if = Some(Box::new(f));
        self
    }

    /// One change per individual record.
    pub fn by_record(&self, existing: &[RecordConfig], desired: &[RecordConfig]) -> (Vec<Change>, usize) {
        let (mut changes, desired) = self.prepare(existing, desired);
        for diff in analyze(existing, &desired, self.comparable.as_deref()) {
            for rc in &diff.deletes {
                changes.push(single(Verb::Delete, &diff, vec![(*rc).clone()], vec![], delete_msg(rc)));
            }
            for (old, new) in &diff.modifies {
                changes.push(single(
                    Verb::Change,
                    &diff,
                    vec![(*old).clone()],
                    vec![(*new).clone()],
                    modify_msg(old, new),
                ));
            }
            for rc in &diff.creates {
                changes.push(single(Verb::Create, &diff, vec![], vec![(*rc).clone()], create_msg(rc)));
            }
        }
        finish(changes)
    }

    /// One change per RRset. Any difference inside a set replaces the
    /// whole set.
    pub fn by_record_set(
        &self,
        existing: &[RecordConfig],
        desired: &[RecordConfig],
    ) -> (Vec<Change>, usize) {
        let (mut changes, desired) = self.prepare(existing, desired);
        for diff in analyze(existing, &desired, self.comparable.as_deref()) {
            if diff.is_unchanged() {
                continue;
            }
            changes.push(Change {
                verb: verb_for(diff.old.len(), diff.new.len()),
                name_fqdn: diff.key.name_fqdn.clone(),
                rtype: Some(diff.key.rtype.clone()),
                old: cloned(&diff.old),
                new: cloned(&diff.new),
                msgs: diff.msgs(),
            });
        }
        finish(changes)
    }

    /// One change per label, covering every type at that label.
    pub fn by_label(&self, existing: &[RecordConfig], desired: &[RecordConfig]) -> (Vec<Change>, usize) {
        let (mut changes, desired) = self.prepare(existing, desired);
        let mut labels: BTreeMap<String, Vec<KeyDiff<'_>>> = BTreeMap::new();
        for diff in analyze(existing, &desired, self.comparable.as_deref()) {
            labels.entry(diff.key.name_fqdn.clone()).or_default().push(diff);
        }
        for (label, diffs) in labels {
            if diffs.iter().all(KeyDiff::is_unchanged) {
                continue;
            }
            let old: Vec<RecordConfig> = diffs.iter().flat_map(|d| cloned(&d.old)).collect();
            let new: Vec<RecordConfig> = diffs.iter().flat_map(|d| cloned(&d.new)).collect();
            changes.push(Change {
                verb: verb_for(old.len(), new.len()),
                name_fqdn: label,
                rtype: None,
                old,
                new,
                msgs: merged_msgs(&diffs),
            });
        }
        finish(changes)
    }

    /// At most one change, replacing the entire zone.
    pub fn by_zone(
        &self,
        existing: &[RecordConfig],
        desired: &[RecordConfig],
        origin: &str,
    ) -> (Vec<Change>, usize) {
        let (mut changes, desired) = self.prepare(existing, desired);
        let diffs = analyze(existing, &desired, self.comparable.as_deref());
        if !diffs.iter().all(KeyDiff::is_unchanged) {
            changes.push(Change {
                verb: Verb::Change,
                name_fqdn: origin.to_string(),
                rtype: None,
                old: existing.to_vec(),
                new: desired.clone(),
                msgs: merged_msgs(&diffs),
            });
        }
        finish(changes)
    }

    /// Applies `keep_unknown` and `report_if`, returning the REPORTs and
    /// the effective desired records.
    fn prepare(&self, existing: &[RecordConfig], desired: &[RecordConfig]) -> (Vec<Change>, Vec<RecordConfig>) {
        let mut desired = desired.to_vec();
        if self.keep_unknown {
            let declared: HashSet<RecordKey> = desired.iter().map(RecordConfig::key).collect();
            desired.extend(
                existing
                    .iter()
                    .filter(|rc| !declared.contains(&rc.key()))
                    .cloned(),
            );
        }

        let mut reports = Vec::new();
        let Some(report_if) = &self.report_if else {
            return (reports, desired);
        };
        let mut frozen: HashSet<RecordKey> = HashSet::new();
        for diff in analyze(existing, &desired, self.comparable.as_deref()) {
            if diff.is_unchanged() {
                continue;
            }
            if let Some(reason) = report_if(&diff.key) {
                reports.push(Change {
                    verb: Verb::Report,
                    name_fqdn: diff.key.name_fqdn.clone(),
                    rtype: Some(diff.key.rtype.clone()),
                    old: cloned(&diff.old),
                    new: cloned(&diff.new),
                    msgs: diff
                        .msgs()
                        .into_iter()
                        .map(|msg| format!("REPORT {reason}: {msg}"))
                        .collect(),
                });
                frozen.insert(diff.key);
            }
        }
        if !frozen.is_empty() {
            desired.retain(|rc| !frozen.contains(&rc.key()));
            desired.extend(existing.iter().filter(|rc| frozen.contains(&rc.key())).cloned());
        }
        (reports, desired)
    }
}

fn single(verb: Verb, diff: &KeyDiff<'_>, old: Vec<RecordConfig>, new: Vec<RecordConfig>, msg: String) -> Change {
    Change {
        verb,
        name_fqdn: diff.key.name_fqdn.clone(),
        rtype: Some(diff.key.rtype.clone()),
        old,
        new,
        msgs: vec![msg],
    }
}

/// Messages of several RRsets, deletions first so that a type swap at a
/// label reads in the order it is applied.
fn merged_msgs(diffs: &[KeyDiff<'_>]) -> Vec<String> {
    let deletes = diffs.iter().flat_map(|d| d.deletes.iter().map(|rc| delete_msg(rc)));
    let modifies = diffs
        .iter()
        .flat_map(|d| d.modifies.iter().map(|(old, new)| modify_msg(old, new)));
    let creates = diffs.iter().flat_map(|d| d.creates.iter().map(|rc| create_msg(rc)));
    deletes.chain(modifies).chain(creates).collect()
}

fn cloned(records: &[&RecordConfig]) -> Vec<RecordConfig> {
    records.iter().map(|rc| (*rc).clone()).collect()
}

fn verb_for(old: usize, new: usize) -> Verb {
    match (old, new) {
        (0, _) => Verb::Create,
        (_, 0) => Verb::Delete,
        _ => Verb::Change,
    }
}

/// Orders the changes by verb (stable, so key order is kept within a
/// verb) and counts the ones that are not REPORTs.
fn finish(mut changes: Vec<Change>) -> (Vec<Change>, usize) {
    changes.sort_by_key(|c| c.verb);
    let actual = changes.iter().filter(|c| !c.is_report()).count();
    (changes, actual)
}
