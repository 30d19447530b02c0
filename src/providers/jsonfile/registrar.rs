use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::PathBuf;
use std::sync::Mutex;

use snafu::ResultExt;

use crate::common::{ProviderSnafu, Result};
use crate::models::Nameserver;
use crate::providers::Registrar;

use super::PROVIDER_NAME;

type Delegations = BTreeMap<String, Vec<Nameserver>>;

pub struct JSONFileRegistrar {
    source: PathBuf,
    lock: Mutex<()>,
}

impl JSONFileRegistrar {
    fn read(&self) -> Result<Delegations> {
        let file = match File::open(&self.source) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Delegations::new()),
            Err(err) => {
                return Err(err).boxed().context(ProviderSnafu {
                    provider: PROVIDER_NAME,
                    message: format!("Failed to open source {}", self.source.display()),
                })
            }
        };

        let reader = BufReader::new(file);
        let delegations: Delegations =
            serde_json::from_reader(reader)
                .boxed()
                .context(ProviderSnafu {
                    provider: PROVIDER_NAME,
                    message: "Failed to read delegations from source",
                })?;

        tracing::debug!(
            provider = PROVIDER_NAME,
            domains = delegations.len(),
            "Read completed",
        );
        Ok(delegations)
    }

    fn write(&self, delegations: &Delegations) -> Result<()> {
        let mut text = serde_json::to_string_pretty(delegations)
            .boxed()
            .context(ProviderSnafu {
                provider: PROVIDER_NAME,
                message: "Failed to serialize delegations",
            })?;
        text.push('\n');
        std::fs::write(&self.source, text)
            .boxed()
            .context(ProviderSnafu {
                provider: PROVIDER_NAME,
                message: format!("Failed to write source {}", self.source.display()),
            })
    }
}

impl Registrar for JSONFileRegistrar {
    fn get_nameservers(&self, domain: &str) -> Result<Vec<Nameserver>> {
        Ok(self.read()?.remove(domain).unwrap_or_default())
    }

    fn set_nameservers(&self, domain: &str, nameservers: &[Nameserver]) -> Result<()> {
        // Read-modify-write; domains may be processed on several threads.
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut delegations = self.read()?;
        delegations.insert(domain.to_string(), nameservers.to_vec());
        self.write(&delegations)?;
        tracing::info!(
            provider = PROVIDER_NAME,
            domain = domain,
            nameservers = nameservers.len(),
            "Updated delegation",
        );
        Ok(())
    }
}

impl From<super::Config> for JSONFileRegistrar {
    fn from(value: super::Config) -> Self {
        Self {
            source: value.source,
            lock: Mutex::new(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::nameservers_from;

    #[test]
    fn delegations_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("delegations.json");
        let registrar = JSONFileRegistrar::from(super::super::Config {
            source: source.clone(),
        });
        assert!(registrar.get_nameservers("example.com").unwrap().is_empty());

        let desired = nameservers_from(&["ns1.example.net", "ns2.example.net"]);
        let corrections = registrar
            .get_registrar_corrections("example.com", &desired)
            .unwrap();
        assert_eq!(corrections.len(), 1);
        for c in corrections {
            c.run().unwrap();
        }
        assert_eq!(registrar.get_nameservers("example.com").unwrap(), desired);
        assert!(registrar
            .get_registrar_corrections("example.com", &desired)
            .unwrap()
            .is_empty());

        let text = std::fs::read_to_string(&source).unwrap();
        assert!(text.contains("\"example.com\""));
    }

    #[test]
    fn broken_documents_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("delegations.json");
        std::fs::write(&source, "{not json").unwrap();
        let registrar = JSONFileRegistrar::from(super::super::Config { source });
        assert!(registrar.get_nameservers("example.com").is_err());
    }
}
