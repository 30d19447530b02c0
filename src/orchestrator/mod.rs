//! Drives every declared domain through its providers and registrar:
//! normalize, fit to each provider, audit, fetch, plan and, when pushing,
//! apply.

mod pool;
mod prepare;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use snafu::ResultExt;

use crate::common::{CancelledSnafu, CapabilitySnafu, ConfigSnafu, Error, IoSnafu, Result};
use crate::config::Providers;
use crate::models::{
    normalize_domain, post_process_records, AutoDnssec, Correction, DomainConfig, Nameserver,
};
use crate::providers::{Capability, ProviderInstance, RegistrarInstance, Registry};
use crate::spflib::{materialize_spf, TxtResolver};
use crate::zonefile::{write_records, OutputFormat};

pub use prepare::*;

/// Shared flag that stops work between domains and between corrections.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, domain: &str) -> Result<()> {
        if self.is_cancelled() {
            return CancelledSnafu { domain }.fail();
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Normalize and audit only. No provider is contacted.
    Check,
    /// Plan corrections without running them.
    Preview,
    /// Plan and run corrections.
    Push,
}

/// What happened at one provider or registrar.
#[derive(Debug, Default)]
pub struct ProviderReport {
    pub provider: String,
    pub warnings: Vec<String>,
    /// Correction messages in execution order.
    pub corrections: Vec<String>,
    /// Corrections that change something, as opposed to reports.
    pub actual: usize,
    /// Corrections that ran successfully.
    pub applied: usize,
}

#[derive(Debug)]
pub struct DomainReport {
    pub domain: String,
    pub warnings: Vec<String>,
    pub providers: Vec<ProviderReport>,
    pub registrar: Option<ProviderReport>,
    pub error: Option<Error>,
}

impl DomainReport {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            warnings: Vec::new(),
            providers: Vec::new(),
            registrar: None,
            error: None,
        }
    }

    pub(crate) fn failed(domain: &str, error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::new(domain)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Corrections that change something, across providers and registrar.
    pub fn changes(&self) -> usize {
        self.providers
            .iter()
            .chain(self.registrar.iter())
            .map(|p| p.actual)
            .sum()
    }
}

pub struct Orchestrator<'p> {
    registry: &'p Registry,
    providers: &'p Providers,
    resolver: Option<&'p dyn TxtResolver>,
    concurrency: usize,
    cancel: CancelToken,
}

impl<'p> Orchestrator<'p> {
    pub fn new(registry: &'p Registry, providers: &'p Providers) -> Self {
        Self {
            registry,
            providers,
            resolver: None,
            concurrency: 1,
            cancel: CancelToken::new(),
        }
    }

    /// Resolver used to flatten SPF policies.
    pub fn with_resolver(mut self, resolver: &'p dyn TxtResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Processes every domain, in parallel when allowed. Reports come back
    /// in input order; a failed domain does not stop the others.
    pub fn run(&self, domains: Vec<DomainConfig>, mode: Mode) -> Vec<DomainReport> {
        if self.concurrency > 1 && domains.len() > 1 && self.may_concur(&domains) {
            tracing::info!(workers = self.concurrency, domains = domains.len(), "Processing domains in parallel");
            return pool::run_parallel(self, domains, mode, self.concurrency);
        }
        domains
            .into_iter()
            .map(|dc| self.process_domain(dc, mode))
            .collect()
    }

    fn may_concur(&self, domains: &[DomainConfig]) -> bool {
        let mut types = Vec::new();
        for dc in domains {
            for name in dc.dns_providers.keys() {
                match self.providers.dns.get(name) {
                    Some(p) => types.push(p.type_name),
                    None => return false,
                }
            }
            if let Some(name) = &dc.registrar {
                match self.providers.registrars.get(name) {
                    Some(r) => types.push(r.type_name),
                    None => return false,
                }
            }
        }
        self.registry.all_concur(types)
    }

    pub(crate) fn process_domain(&self, dc: DomainConfig, mode: Mode) -> DomainReport {
        let mut report = DomainReport::new(dc.name.trim_end_matches('.'));
        if let Err(err) = self.process(dc, mode, &mut report) {
            tracing::error!(domain = %report.domain, "{err}");
            report.error = Some(err);
        }
        report
    }

    fn process(&self, mut dc: DomainConfig, mode: Mode, report: &mut DomainReport) -> Result<()> {
        self.cancel.check(&report.domain)?;
        report.warnings.extend(materialize_spf(&mut dc, self.resolver)?);
        report.warnings.extend(normalize_domain(&mut dc)?);
        report.domain = dc.name.clone();

        let providers = dc
            .dns_providers
            .keys()
            .map(|name| self.dns_provider(name))
            .collect::<Result<Vec<_>>>()?;
        let registrar = dc
            .registrar
            .as_deref()
            .map(|name| self.registrar(name))
            .transpose()?;

        // Everything that can be rejected without asking a provider is
        // checked for every provider first.
        let mut prepared = Vec::with_capacity(providers.len());
        for provider in providers {
            let mut pdc = dc.clone();
            let warnings = prepare_for_provider(&mut pdc, provider, self.registry)?;
            prepared.push((provider, pdc, warnings));
        }

        let nameservers = match mode {
            Mode::Check => dc.nameservers.clone(),
            Mode::Preview | Mode::Push => {
                let bound: Vec<&ProviderInstance> = prepared.iter().map(|(p, _, _)| *p).collect();
                self.collect_nameservers(&dc, &bound)?
            }
        };

        for (provider, mut pdc, warnings) in prepared {
            self.cancel.check(&dc.name)?;
            inject_apex_ns(&mut pdc, &nameservers)?;
            let mut provider_report = ProviderReport {
                provider: provider.name.clone(),
                warnings,
                ..Default::default()
            };
            provider_report.warnings.extend(clamp_ttls(&mut pdc, provider));
            if mode == Mode::Check {
                report.providers.push(provider_report);
                continue;
            }

            let mut existing = provider.driver.get_zone_records(&dc.name, &dc.metadata)?;
            provider_report
                .warnings
                .extend(post_process_records(&mut existing, &dc.name)?);
            let (mut corrections, actual) = provider.driver.get_zone_records_corrections(&pdc, existing)?;
            let dnssec = dnssec_corrections(provider, &pdc)?;
            provider_report.actual = actual + dnssec.len();
            corrections.extend(dnssec);
            tracing::info!(
                domain = %dc.name,
                provider = %provider.name,
                corrections = corrections.len(),
                "Planned corrections",
            );
            let result = self.execute(&dc.name, corrections, mode, &mut provider_report);
            report.providers.push(provider_report);
            result?;
        }

        if let Some(registrar) = registrar {
            self.cancel.check(&dc.name)?;
            let mut registrar_report = ProviderReport {
                provider: registrar.name.clone(),
                ..Default::default()
            };
            if mode != Mode::Check {
                let corrections = registrar
                    .driver
                    .get_registrar_corrections(&dc.name, &nameservers)?;
                registrar_report.actual = corrections.iter().filter(|c| !c.is_report()).count();
                let result = self.execute(&dc.name, corrections, mode, &mut registrar_report);
                report.registrar = Some(registrar_report);
                result?;
            } else {
                report.registrar = Some(registrar_report);
            }
        }
        Ok(())
    }

    fn dns_provider(&self, name: &str) -> Result<&'p ProviderInstance> {
        self.providers.dns.get(name).ok_or_else(|| {
            ConfigSnafu {
                message: format!("no DNS provider named {name}"),
                prefix: "dns_providers",
            }
            .build()
        })
    }

    fn registrar(&self, name: &str) -> Result<&'p RegistrarInstance> {
        self.providers.registrars.get(name).ok_or_else(|| {
            ConfigSnafu {
                message: format!("no registrar named {name}"),
                prefix: "registrar",
            }
            .build()
        })
    }

    /// The declared name servers followed by the requested share of each
    /// provider's own.
    fn collect_nameservers(&self, dc: &DomainConfig, providers: &[&ProviderInstance]) -> Result<Vec<Nameserver>> {
        let mut lists = vec![dc.nameservers.clone()];
        for provider in providers {
            let mut served = provider.driver.get_nameservers(&dc.name)?;
            if let Some(count) = dc.nameserver_count(&provider.name) {
                served.truncate(count);
            }
            lists.push(served);
        }
        Ok(merge_nameservers(lists.iter().map(Vec::as_slice)))
    }

    fn execute(
        &self,
        domain: &str,
        corrections: Vec<Correction<'_>>,
        mode: Mode,
        report: &mut ProviderReport,
    ) -> Result<()> {
        report.corrections = corrections.iter().map(|c| c.msg.clone()).collect();
        if mode != Mode::Push {
            return Ok(());
        }
        for correction in corrections {
            self.cancel.check(domain)?;
            tracing::info!(domain = domain, provider = %report.provider, "{}", correction.msg);
            correction.run()?;
            report.applied += 1;
        }
        Ok(())
    }

    /// Creates every domain at each of its providers that can create
    /// zones. Providers without the facet are skipped with a log line.
    pub fn create_domains(&self, domains: &[DomainConfig]) -> Vec<DomainReport> {
        domains
            .iter()
            .map(|dc| {
                let mut report = DomainReport::new(dc.name.trim_end_matches('.'));
                if let Err(err) = self.create_domain(dc, &mut report) {
                    tracing::error!(domain = %report.domain, "{err}");
                    report.error = Some(err);
                }
                report
            })
            .collect()
    }

    fn create_domain(&self, dc: &DomainConfig, report: &mut DomainReport) -> Result<()> {
        self.cancel.check(&report.domain)?;
        for name in dc.dns_providers.keys() {
            let provider = self.dns_provider(name)?;
            let mut provider_report = ProviderReport {
                provider: provider.name.clone(),
                ..Default::default()
            };
            match provider.driver.as_zone_creator() {
                Some(creator) => {
                    creator.ensure_zone_exists(&report.domain)?;
                    provider_report.corrections.push(format!("Ensured zone {} exists", report.domain));
                    provider_report.applied = 1;
                }
                None => {
                    tracing::info!(provider = %provider.name, domain = %report.domain, "Provider cannot create zones");
                }
            }
            report.providers.push(provider_report);
        }
        Ok(())
    }

    /// Names of the zones `provider` serves.
    pub fn list_zones(&self, provider: &str) -> Result<Vec<String>> {
        let instance = self.dns_provider(provider)?;
        match instance.driver.as_zone_lister() {
            Some(lister) if instance.features.supports(Capability::CanGetZones) => lister.list_zones(),
            _ => CapabilitySnafu {
                provider,
                capability: Capability::CanGetZones.to_string(),
            }
            .fail(),
        }
    }

    /// Writes the zones `provider` holds in `format`. An empty `zones`
    /// means every zone it serves.
    pub fn get_zones(&self, provider: &str, zones: &[String], format: OutputFormat, w: &mut impl Write) -> Result<()> {
        let instance = self.dns_provider(provider)?;
        let zones = if zones.is_empty() {
            self.list_zones(provider)?
        } else {
            zones.to_vec()
        };
        for zone in zones {
            let mut records = instance.driver.get_zone_records(&zone, &BTreeMap::new())?;
            post_process_records(&mut records, &zone)?;
            let comments = vec![format!("generated from {provider}")];
            write_records(format, w, &records, &zone, 0, &comments).context(IoSnafu {
                path: PathBuf::from("-"),
            })?;
        }
        Ok(())
    }
}

/// Corrections that bring the provider's DNSSEC state in line with the
/// declaration. They run after the record changes.
fn dnssec_corrections<'a>(provider: &'a ProviderInstance, dc: &DomainConfig) -> Result<Vec<Correction<'a>>> {
    let want = match dc.auto_dnssec {
        AutoDnssec::On => true,
        AutoDnssec::Off => false,
        AutoDnssec::Unset => return Ok(Vec::new()),
    };
    if !provider.features.supports(Capability::CanAutoDNSSEC) {
        return Ok(Vec::new());
    }
    let Some(toggler) = provider.driver.as_dnssec_toggler() else {
        return CapabilitySnafu {
            provider: provider.name.as_str(),
            capability: Capability::CanAutoDNSSEC.to_string(),
        }
        .fail();
    };
    if toggler.dnssec_enabled(&dc.name)? == want {
        return Ok(Vec::new());
    }
    let domain = dc.name.clone();
    let msg = if want { "Enable AutoDNSSEC" } else { "Disable AutoDNSSEC" };
    Ok(vec![Correction::new(msg, move || toggler.set_dnssec(&domain, want))])
}
