use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use super::{RecordConfig, RecordKey, RecordType};

/// An ordered list of records.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Records(Vec<RecordConfig>);

impl Records {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<RecordConfig> {
        self.0
    }

    /// Groups the records by RRset key, in order of first appearance.
    pub fn group_by_key(&self) -> Vec<(RecordKey, Vec<&RecordConfig>)> {
        group(&self.0, RecordConfig::key)
    }

    /// Groups the records by fully qualified label, in order of first
    /// appearance.
    pub fn group_by_label(&self) -> Vec<(String, Vec<&RecordConfig>)> {
        group(&self.0, |rc| rc.name_fqdn().to_string())
    }

    pub fn has_type(&self, rtype: &RecordType) -> bool {
        self.0.iter().any(|rc| &rc.rtype == rtype)
    }

    pub fn of_type<'a>(&'a self, rtype: &'a RecordType) -> impl Iterator<Item = &'a RecordConfig> {
        self.0.iter().filter(move |rc| &rc.rtype == rtype)
    }
}

fn group<'a, K, F>(records: &'a [RecordConfig], key: F) -> Vec<(K, Vec<&'a RecordConfig>)>
where
    K: Clone + Eq + std::hash::Hash,
    F: Fn(&RecordConfig) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&RecordConfig>)> = Vec::new();
    for rc in records {
        let k = key(rc);
        match index.get(&k) {
            Some(&i) => groups[i].1.push(rc),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![rc]));
            }
        }
    }
    groups
}

impl Deref for Records {
    type Target = Vec<RecordConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Records {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<RecordConfig>> for Records {
    fn from(value: Vec<RecordConfig>) -> Self {
        Self(value)
    }
}

impl FromIterator<RecordConfig> for Records {
    fn from_iter<T: IntoIterator<Item = RecordConfig>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Records {
    type Item = RecordConfig;
    type IntoIter = std::vec::IntoIter<RecordConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a RecordConfig;
    type IntoIter = std::slice::Iter<'a, RecordConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(label: &str, rtype: &str, content: &str) -> RecordConfig {
        RecordConfig::from_string(label, 300, rtype, content, "example.com").unwrap()
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let records: Records = vec![
            rec("www", "A", "1.1.1.1"),
            rec("@", "A", "2.2.2.2"),
            rec("www", "A", "1.1.1.2"),
            rec("www", "AAAA", "::1"),
        ]
        .into();

        let by_key = records.group_by_key();
        assert_eq!(by_key.len(), 3);
        assert_eq!(by_key[0].0.name_fqdn, "www.example.com");
        assert_eq!(by_key[0].1.len(), 2);
        assert_eq!(by_key[1].0.name_fqdn, "example.com");

        let by_label = records.group_by_label();
        assert_eq!(by_label.len(), 2);
        assert_eq!(by_label[0].1.len(), 3);
        assert!(records.has_type(&RecordType::AAAA));
        assert_eq!(records.of_type(&RecordType::A).count(), 3);
    }
}
