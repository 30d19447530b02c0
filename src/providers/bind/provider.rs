use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use snafu::ResultExt;

use crate::common::{IoSnafu, Result};
use crate::models::{Correction, DomainConfig, Nameserver, RecordConfig, RecordType, Records};
use crate::providers::{zone_differ, DnsProvider, ZoneCreator, ZoneLister};
use crate::soa::{generate_serial_now, make_default_soa};
use crate::zonefile::{write_zone_file, ZoneParser};

use super::Config;

pub const PROVIDER_NAME: &str = "BIND";

/// Zones kept as pretty-printed zone files in a directory.
pub struct Bind {
    config: Config,
}

impl Bind {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn zone_path(&self, domain: &str) -> PathBuf {
        self.config.directory.join(format!("{domain}.zone"))
    }

    fn read_zone(&self, domain: &str) -> Result<Records> {
        let path = self.zone_path(domain);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    provider = PROVIDER_NAME,
                    path = %path.display(),
                    "Zone file not found, it will be created"
                );
                return Ok(Records::new());
            }
            Err(err) => return Err(err).context(IoSnafu { path }),
        };

        let records = ZoneParser::new(domain)
            .with_include_dir(&self.config.directory)
            .parse_str(&text)?;
        tracing::info!(
            provider = PROVIDER_NAME,
            domain = domain,
            records = records.len(),
            "Read completed",
        );
        Ok(records)
    }

    fn write_zone(&self, domain: &str, records: &[RecordConfig]) -> Result<()> {
        let path = self.zone_path(domain);
        fs::create_dir_all(&self.config.directory).context(IoSnafu {
            path: &self.config.directory,
        })?;
        let mut buf = Vec::new();
        write_zone_file(&mut buf, records, domain, 0, &[]).context(IoSnafu { path: &path })?;
        fs::write(&path, buf).context(IoSnafu { path: &path })?;
        tracing::info!(
            provider = PROVIDER_NAME,
            path = %path.display(),
            records = records.len(),
            "Wrote zone file",
        );
        Ok(())
    }
}

impl DnsProvider for Bind {
    fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        Ok(self.config.nameservers.clone())
    }

    fn get_zone_records(&self, domain: &str, _meta: &BTreeMap<String, String>) -> Result<Records> {
        self.read_zone(domain)
    }

    fn get_zone_records_corrections<'a>(
        &'a self,
        dc: &DomainConfig,
        existing: Records,
    ) -> Result<(Vec<Correction<'a>>, usize)> {
        let existing_soa = existing.of_type(&RecordType::SOA).next().cloned();
        let soa = make_default_soa(
            &dc.name,
            dc.records.of_type(&RecordType::SOA).next(),
            existing_soa.as_ref(),
            &self.config.soa,
        );
        let mut desired: Vec<RecordConfig> = dc
            .records
            .iter()
            .filter(|rc| rc.rtype != RecordType::SOA)
            .cloned()
            .collect();
        desired.push(soa);

        let (changes, actual) = zone_differ(dc, true).by_zone(&existing, &desired, &dc.name);
        let Some(change) = changes.into_iter().find(|c| !c.is_report()) else {
            return Ok((Vec::new(), 0));
        };

        let old_serial = existing_soa.map_or(0, |soa| soa.soa_serial);
        let mut records = change.new;
        for soa in records.iter_mut().filter(|rc| rc.rtype == RecordType::SOA) {
            soa.soa_serial = generate_serial_now(soa.soa_serial.max(old_serial));
        }

        let path = self.zone_path(&dc.name);
        let msg = if existing.is_empty() {
            format!(
                "GENERATE_ZONEFILE: '{}' (new file with {} records)",
                path.display(),
                records.len()
            )
        } else {
            format!("GENERATE_ZONEFILE: '{}'. Changes:\n{}", path.display(), change.msgs.join("\n"))
        };
        let domain = dc.name.clone();
        let correction = Correction::new(msg, move || self.write_zone(&domain, &records));
        Ok((vec![correction], actual))
    }

    fn as_zone_lister(&self) -> Option<&dyn ZoneLister> {
        Some(self)
    }

    fn as_zone_creator(&self) -> Option<&dyn ZoneCreator> {
        Some(self)
    }
}

impl ZoneLister for Bind {
    fn list_zones(&self) -> Result<Vec<String>> {
        let dir = &self.config.directory;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).context(IoSnafu { path: dir }),
        };
        let mut zones = Vec::new();
        for entry in entries {
            let entry = entry.context(IoSnafu { path: dir })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(zone) = name.strip_suffix(".zone") {
                zones.push(zone.to_string());
            }
        }
        zones.sort();
        Ok(zones)
    }
}

impl ZoneCreator for Bind {
    fn ensure_zone_exists(&self, domain: &str) -> Result<()> {
        let path = self.zone_path(domain);
        if path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.config.directory).context(IoSnafu {
            path: &self.config.directory,
        })?;
        fs::write(&path, "").context(IoSnafu { path: &path })?;
        tracing::info!(provider = PROVIDER_NAME, domain = domain, "Created zone file");
        Ok(())
    }
}
