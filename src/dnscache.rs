//! A TXT lookup cache that can be saved to disk and replayed offline.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::Resolver;
use snafu::ResultExt;

use crate::common::{CacheMissSnafu, IoSnafu, LookupSnafu, Result};
use crate::spflib::TxtResolver;

const TXT: &str = "TXT";

/// fqdn → rtype → answers.
type Entries = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Misses go to the system resolver and are remembered.
    #[default]
    Live,
    /// Misses are errors; the network is never used.
    Preloaded,
}

pub struct DnsCache {
    mode: CacheMode,
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
    resolver: Mutex<Option<Resolver>>,
    dirty: AtomicBool,
}

impl DnsCache {
    /// An empty cache that is never written to disk.
    pub fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            path: None,
            entries: Mutex::new(Entries::new()),
            resolver: Mutex::new(None),
            dirty: AtomicBool::new(false),
        }
    }

    /// Loads the cache stored at `path`. A missing file is an empty cache.
    pub fn load(path: &Path, mode: CacheMode) -> Result<Self> {
        let entries = match File::open(path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))
                .boxed()
                .context(LookupSnafu {
                    fqdn: path.display().to_string(),
                    rtype: "cache",
                })?,
            Err(err) if err.kind() == ErrorKind::NotFound => Entries::new(),
            Err(source) => return Err(source).context(IoSnafu { path }),
        };
        let cache = Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
            ..Self::new(mode)
        };
        tracing::debug!(path = %path.display(), names = cache.len(), "Loaded lookup cache");
        Ok(cache)
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(fqdn: &str) -> String {
        fqdn.trim_end_matches('.').to_ascii_lowercase()
    }

    /// Records an answer, as a live lookup would.
    pub fn insert(&self, fqdn: &str, rtype: &str, answers: Vec<String>) {
        self.entries()
            .entry(Self::key(fqdn))
            .or_default()
            .insert(rtype.to_ascii_uppercase(), answers);
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn cached(&self, fqdn: &str, rtype: &str) -> Option<Vec<String>> {
        self.entries()
            .get(&Self::key(fqdn))
            .and_then(|by_type| by_type.get(rtype))
            .cloned()
    }

    fn resolve_txt(&self, fqdn: &str) -> Result<Vec<String>> {
        let mut resolver = self.resolver.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if resolver.is_none() {
            let created = Resolver::from_system_conf().boxed().context(LookupSnafu {
                fqdn,
                rtype: TXT,
            })?;
            *resolver = Some(created);
        }
        let Some(resolver) = resolver.as_ref() else {
            return Ok(Vec::new());
        };
        let query = format!("{}.", Self::key(fqdn));
        match resolver.txt_lookup(query.as_str()) {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk))
                        .collect::<String>()
                })
                .collect()),
            Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
            Err(err) => Err(err).boxed().context(LookupSnafu { fqdn, rtype: TXT }),
        }
    }

    /// Writes the cache back to its file if anything was added. Entries
    /// are sorted so the file diffs cleanly.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut text = self.to_json()?;
        text.push('\n');
        std::fs::write(path, text).context(IoSnafu { path })?;
        self.dirty.store(false, Ordering::SeqCst);
        tracing::info!(path = %path.display(), names = self.len(), "Saved lookup cache");
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&*self.entries())
            .boxed()
            .context(LookupSnafu {
                fqdn: "<cache>",
                rtype: "cache",
            })
    }
}

impl TxtResolver for DnsCache {
    fn txt(&self, fqdn: &str) -> Result<Vec<String>> {
        if let Some(answers) = self.cached(fqdn, TXT) {
            return Ok(answers);
        }
        if self.mode == CacheMode::Preloaded {
            return CacheMissSnafu { fqdn, rtype: TXT }.fail();
        }
        let answers = self.resolve_txt(fqdn)?;
        tracing::debug!(fqdn = fqdn, answers = answers.len(), "Resolved TXT");
        self.insert(fqdn, TXT, answers.clone());
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preloaded_misses_are_errors() {
        let cache = DnsCache::new(CacheMode::Preloaded);
        cache.insert("_spf.Example.NET.", "txt", vec!["v=spf1 -all".into()]);
        assert_eq!(cache.txt("_spf.example.net").unwrap(), vec!["v=spf1 -all".to_string()]);
        let err = cache.txt("missing.example.net").unwrap_err();
        assert!(matches!(err, crate::common::Error::CacheMissError { .. }));
    }

    #[test]
    fn saves_sorted_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = DnsCache::load(&path, CacheMode::Live).unwrap();
        assert!(cache.is_empty());
        cache.insert("b.example.net", TXT, vec!["v=spf1 ip4:192.0.2.1 -all".into()]);
        cache.insert("a.example.net", TXT, vec![]);
        cache.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let a = text.find("a.example.net").unwrap();
        let b = text.find("b.example.net").unwrap();
        assert!(a < b);

        let reloaded = DnsCache::load(&path, CacheMode::Preloaded).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.txt("a.example.net").unwrap().is_empty());
        assert_eq!(reloaded.mode(), CacheMode::Preloaded);
    }

    #[test]
    fn unsaved_caches_do_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = DnsCache::load(&path, CacheMode::Live).unwrap();
        cache.save().unwrap();
        assert!(!path.exists());
    }
}
