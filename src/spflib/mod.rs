//! SPF policy parsing, lookup counting, include flattening and splitting
//! into chained records.

mod builder;
mod flatten;
mod parse;

use std::collections::BTreeMap;

pub use builder::*;
pub use flatten::*;
pub use parse::*;

use crate::common::Result;

/// Answers TXT queries. Implemented by the lookup cache; tests use
/// [`StaticResolver`].
pub trait TxtResolver: Send + Sync {
    /// The TXT strings published at `fqdn`, each record's strings
    /// concatenated. A name without TXT records yields an empty list.
    fn txt(&self, fqdn: &str) -> Result<Vec<String>>;
}

/// A resolver answering from a fixed table.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    answers: BTreeMap<String, Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, fqdn: &str, txt: &str) -> Self {
        self.answers
            .entry(fqdn.trim_end_matches('.').to_ascii_lowercase())
            .or_default()
            .push(txt.to_string());
        self
    }
}

impl TxtResolver for StaticResolver {
    fn txt(&self, fqdn: &str) -> Result<Vec<String>> {
        let key = fqdn.trim_end_matches('.').to_ascii_lowercase();
        Ok(self.answers.get(&key).cloned().unwrap_or_default())
    }
}
