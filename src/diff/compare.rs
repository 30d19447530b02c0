use std::collections::BTreeMap;

use crate::models::{RecordConfig, RecordKey};

use super::change::{create_msg, delete_msg, modify_msg};

pub(super) type Comparable<'a> = dyn Fn(&RecordConfig) -> String + Send + Sync + 'a;

/// The record level differences inside one RRset.
#[derive(Debug)]
pub(super) struct KeyDiff<'r> {
    pub key: RecordKey,
    pub old: Vec<&'r RecordConfig>,
    pub new: Vec<&'r RecordConfig>,
    pub deletes: Vec<&'r RecordConfig>,
    pub modifies: Vec<(&'r RecordConfig, &'r RecordConfig)>,
    pub creates: Vec<&'r RecordConfig>,
}

impl KeyDiff<'_> {
    pub fn is_unchanged(&self) -> bool {
        self.deletes.is_empty() && self.modifies.is_empty() && self.creates.is_empty()
    }

    /// Messages in emission order: deletions, modifications, creations.
    pub fn msgs(&self) -> Vec<String> {
        self.deletes
            .iter()
            .map(|rc| delete_msg(rc))
            .chain(self.modifies.iter().map(|(old, new)| modify_msg(old, new)))
            .chain(self.creates.iter().map(|rc| create_msg(rc)))
            .collect()
    }
}

/// Joins `existing` and `desired` on their RRset key and pairs members by
/// their combined target. A pair whose TTL or comparable differs is a
/// modification. The result is ordered by key.
pub(super) fn analyze<'r>(
    existing: &'r [RecordConfig],
    desired: &'r [RecordConfig],
    comparable: Option<&Comparable<'_>>,
) -> Vec<KeyDiff<'r>> {
    let mut sets: BTreeMap<RecordKey, (Vec<&RecordConfig>, Vec<&RecordConfig>)> = BTreeMap::new();
    for rc in existing {
        sets.entry(rc.key()).or_default().0.push(rc);
    }
    for rc in desired {
        sets.entry(rc.key()).or_default().1.push(rc);
    }

    let extra = |rc: &RecordConfig| comparable.map(|f| f(rc)).unwrap_or_default();

    sets.into_iter()
        .map(|(key, (old, new))| {
            let mut used = vec![false; old.len()];
            let mut modifies = Vec::new();
            let mut creates = Vec::new();
            for &n in &new {
                let target = n.target_combined();
                let found = old
                    .iter()
                    .enumerate()
                    .find(|(i, o)| !used[*i] && o.target_combined() == target);
                match found {
                    Some((i, &o)) => {
                        used[i] = true;
                        if o.ttl != n.ttl || extra(o) != extra(n) {
                            modifies.push((o, n));
                        }
                    }
                    None => creates.push(n),
                }
            }
            let deletes = old
                .iter()
                .zip(&used)
                .filter(|(_, used)| !**used)
                .map(|(o, _)| *o)
                .collect();
            KeyDiff {
                key,
                old,
                new,
                deletes,
                modifies,
                creates,
            }
        })
        .collect()
}
