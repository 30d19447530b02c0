use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use zonesync::audit::Auditor;
use zonesync::common::Result;
use zonesync::config::Providers;
use zonesync::models::{nameservers_from, Correction, DomainConfig, Nameserver, RecordType, Records};
use zonesync::orchestrator::{CancelToken, Mode, Orchestrator};
use zonesync::providers::{Capability, DnsProvider, Features, Limits, ProviderInstance, Registry};
use zonesync::spflib::StaticResolver;
use zonesync::zonefile::OutputFormat;
use zonesync::Config;

fn config(dir: &Path, domains: &str) -> Config {
    let text = format!(
        r#"{{
            "providers": {{
                "zones": {{
                    "type": "BIND",
                    "directory": "{zones}",
                    "nameservers": "ns1.example.net, ns2.example.net"
                }},
                "reg": {{"type": "JSONFILE", "source": "{delegations}"}},
                "off": {{"type": "NONE"}}
            }},
            "domains": {domains}
        }}"#,
        zones = dir.join("zones").display(),
        delegations = dir.join("delegations.json").display(),
    );
    Config::from_json_str(&text).unwrap()
}

const EXAMPLE: &str = r#"[{
    "name": "Example.COM",
    "registrar": "reg",
    "dns_providers": {"zones": -1},
    "records": [
        {"type": "A", "name": "@", "target": "192.0.2.1"},
        {"type": "A", "name": "www", "target": "192.0.2.2", "ttl": 3600},
        {"type": "MX", "name": "@", "target": "mail", "mx_preference": 10},
        {"type": "TXT", "name": "@", "txt_strings": ["v=spf1 mx -all"]}
    ]
}]"#;

#[test]
fn push_then_preview_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), EXAMPLE);
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let orchestrator = Orchestrator::new(&registry, &providers);

    let preview = orchestrator.run(config.domains.clone(), Mode::Preview);
    assert!(preview[0].is_ok(), "{:?}", preview[0].error);
    assert_eq!(preview[0].domain, "example.com");
    assert_eq!(preview[0].providers[0].corrections.len(), 1);
    assert!(!dir.path().join("zones/example.com.zone").exists());

    let pushed = orchestrator.run(config.domains.clone(), Mode::Push);
    assert!(pushed[0].is_ok(), "{:?}", pushed[0].error);
    assert_eq!(pushed[0].providers[0].applied, 1);
    let registrar = pushed[0].registrar.as_ref().unwrap();
    assert_eq!(registrar.corrections.len(), 1);
    assert!(registrar.corrections[0].contains("ns1.example.net,ns2.example.net"));

    let zone = std::fs::read_to_string(dir.path().join("zones/example.com.zone")).unwrap();
    assert!(zone.contains("ns1.example.net."), "{zone}");
    assert!(zone.contains("mail.example.com."), "{zone}");
    let delegations = std::fs::read_to_string(dir.path().join("delegations.json")).unwrap();
    assert!(delegations.contains("ns2.example.net"));

    let again = orchestrator.run(config.domains.clone(), Mode::Preview);
    assert!(again[0].is_ok(), "{:?}", again[0].error);
    assert!(again[0].providers[0].corrections.is_empty(), "{:?}", again[0].providers[0].corrections);
    assert!(again[0].registrar.as_ref().unwrap().corrections.is_empty());
    assert_eq!(again[0].changes(), 0);
}

#[test]
fn get_zones_prints_what_was_pushed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), EXAMPLE);
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let orchestrator = Orchestrator::new(&registry, &providers);
    assert!(orchestrator.run(config.domains.clone(), Mode::Push)[0].is_ok());

    assert_eq!(orchestrator.list_zones("zones").unwrap(), vec!["example.com"]);
    let mut out = Vec::new();
    orchestrator
        .get_zones("zones", &[], OutputFormat::Tsv, &mut out)
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("www\t3600\tIN\tA\t192.0.2.2"), "{text}");
    assert!(orchestrator.list_zones("off").is_err());
}

#[test]
fn check_mode_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), EXAMPLE);
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let reports = Orchestrator::new(&registry, &providers).run(config.domains.clone(), Mode::Check);
    assert!(reports[0].is_ok());
    assert!(reports[0].providers[0].corrections.is_empty());
    assert!(!dir.path().join("zones").exists());
    assert!(!dir.path().join("delegations.json").exists());
}

#[test]
fn failures_are_per_domain() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        dir.path(),
        r#"[
            {"name": "bad.example", "dns_providers": {"zones": -1},
             "records": [{"type": "ALIAS", "name": "@", "target": "lb.example.net."}]},
            {"name": "missing.example", "dns_providers": {"nowhere": -1}},
            {"name": "good.example", "dns_providers": {"zones": -1},
             "records": [{"type": "A", "name": "@", "target": "192.0.2.1"}]}
        ]"#,
    );
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let reports = Orchestrator::new(&registry, &providers).run(config.domains.clone(), Mode::Push);
    assert_eq!(reports.len(), 3);
    assert!(reports[0].error.as_ref().unwrap().is_validation());
    assert!(reports[1].error.is_some());
    assert!(reports[2].is_ok());
    assert!(dir.path().join("zones/good.example.zone").exists());
    assert!(!dir.path().join("zones/bad.example.zone").exists());
}

#[test]
fn parallel_runs_keep_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let domains: Vec<String> = (0..6)
        .map(|i| {
            format!(
                r#"{{"name": "zone{i}.example", "dns_providers": {{"zones": -1}},
                    "records": [{{"type": "A", "name": "@", "target": "192.0.2.{i}"}}]}}"#
            )
        })
        .collect();
    let config = config(dir.path(), &format!("[{}]", domains.join(",")));
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let reports = Orchestrator::new(&registry, &providers)
        .with_concurrency(3)
        .run(config.domains.clone(), Mode::Push);
    let names: Vec<&str> = reports.iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(
        names,
        vec!["zone0.example", "zone1.example", "zone2.example", "zone3.example", "zone4.example", "zone5.example"]
    );
    assert!(reports.iter().all(|r| r.is_ok()));
    for i in 0..6 {
        assert!(dir.path().join(format!("zones/zone{i}.example.zone")).exists());
    }
}

#[test]
fn cancelled_runs_do_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), EXAMPLE);
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let reports = Orchestrator::new(&registry, &providers)
        .with_cancel(cancel)
        .run(config.domains.clone(), Mode::Push);
    assert!(matches!(
        reports[0].error,
        Some(zonesync::common::Error::CancelledError { .. })
    ));
    assert!(!dir.path().join("zones").exists());
}

#[test]
fn keep_unknown_leaves_foreign_records() {
    let dir = tempfile::tempdir().unwrap();
    let first = config(
        dir.path(),
        r#"[{"name": "example.org", "dns_providers": {"zones": -1},
             "records": [{"type": "A", "name": "legacy", "target": "192.0.2.9"}]}]"#,
    );
    let registry = Registry::with_builtin();
    let providers = first.build_providers(&registry).unwrap();
    let orchestrator = Orchestrator::new(&registry, &providers);
    assert!(orchestrator.run(first.domains.clone(), Mode::Push)[0].is_ok());

    let mut dc: DomainConfig = serde_json::from_str(
        r#"{"name": "example.org", "dns_providers": {"zones": -1}, "keep_unknown": true,
            "records": [{"type": "A", "name": "www", "target": "192.0.2.10"}]}"#,
    )
    .unwrap();
    let reports = orchestrator.run(vec![dc.clone()], Mode::Push);
    assert!(reports[0].is_ok(), "{:?}", reports[0].error);
    let zone = std::fs::read_to_string(dir.path().join("zones/example.org.zone")).unwrap();
    assert!(zone.contains("legacy") && zone.contains("www"), "{zone}");

    dc.keep_unknown = false;
    let reports = orchestrator.run(vec![dc], Mode::Push);
    assert!(reports[0].is_ok());
    let zone = std::fs::read_to_string(dir.path().join("zones/example.org.zone")).unwrap();
    assert!(!zone.contains("legacy"), "{zone}");
}

#[test]
fn spf_policies_are_flattened_before_planning() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        dir.path(),
        r#"[{"name": "example.com", "dns_providers": {"off": -1},
             "records": [{"type": "TXT", "name": "@", "txt_strings": ["v=spf1 include:_spf.example.net -all"],
                          "meta": {"spf_flatten": "*"}}]}]"#,
    );
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let resolver = StaticResolver::new().with("_spf.example.net", "v=spf1 ip4:198.51.100.0/24 ~all");

    let without = Orchestrator::new(&registry, &providers).run(config.domains.clone(), Mode::Preview);
    assert!(without[0].error.is_some());

    let with = Orchestrator::new(&registry, &providers)
        .with_resolver(&resolver)
        .run(config.domains.clone(), Mode::Check);
    assert!(with[0].is_ok(), "{:?}", with[0].error);
}

#[test]
fn apex_ns_from_the_provider_is_injected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        dir.path(),
        r#"[{"name": "example.net", "dns_providers": {"zones": 1}, "nameservers": ["ns.other.example"]}]"#,
    );
    let registry = Registry::with_builtin();
    let providers = config.build_providers(&registry).unwrap();
    let reports = Orchestrator::new(&registry, &providers).run(config.domains.clone(), Mode::Push);
    assert!(reports[0].is_ok(), "{:?}", reports[0].error);

    let mut records = providers.dns["zones"]
        .driver
        .get_zone_records("example.net", &Default::default())
        .unwrap();
    zonesync::models::post_process_records(&mut records, "example.net").unwrap();
    let ns: Vec<&str> = records.of_type(&RecordType::NS).map(|rc| rc.target()).collect();
    assert_eq!(ns.len(), 2, "{ns:?}");
    assert!(ns.contains(&"ns.other.example."));
    assert!(ns.contains(&"ns1.example.net."));
}

/// Serves a fixed delegation and counts every call that would reach it.
struct CountingProvider {
    calls: Arc<AtomicUsize>,
}

impl DnsProvider for CountingProvider {
    fn get_nameservers(&self, _domain: &str) -> Result<Vec<Nameserver>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(nameservers_from(&["ns1.counting.example"]))
    }

    fn get_zone_records(&self, _domain: &str, _meta: &BTreeMap<String, String>) -> Result<Records> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Records::new())
    }

    fn get_zone_records_corrections<'a>(
        &'a self,
        _dc: &DomainConfig,
        _existing: Records,
    ) -> Result<(Vec<Correction<'a>>, usize)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((Vec::new(), 0))
    }
}

fn counting_providers(calls: &Arc<AtomicUsize>) -> Providers {
    let instance = ProviderInstance {
        name: "counting".to_string(),
        type_name: "COUNTING",
        features: Features::new().can(Capability::CanUseCAA),
        limits: Limits::default(),
        auditor: Auditor::new(),
        driver: Box::new(CountingProvider { calls: calls.clone() }),
    };
    Providers {
        dns: BTreeMap::from([("counting".to_string(), instance)]),
        registrars: BTreeMap::new(),
    }
}

#[test]
fn rejected_domains_never_reach_the_provider() {
    let calls = Arc::new(AtomicUsize::new(0));
    let providers = counting_providers(&calls);
    let registry = Registry::new();
    let orchestrator = Orchestrator::new(&registry, &providers);

    let dc: DomainConfig = serde_json::from_str(
        r#"{"name": "example.com", "dns_providers": {"counting": -1},
            "records": [{"type": "ALIAS", "name": "@", "target": "lb.example.net."}]}"#,
    )
    .unwrap();
    for mode in [Mode::Preview, Mode::Push] {
        let reports = orchestrator.run(vec![dc.clone()], mode);
        assert!(reports[0].error.as_ref().unwrap().is_validation(), "{:?}", reports[0].error);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let dc: DomainConfig = serde_json::from_str(
        r#"{"name": "example.com", "dns_providers": {"counting": -1},
            "records": [{"type": "CAA", "name": "@", "target": "letsencrypt.org", "caa_tag": "issue"}]}"#,
    )
    .unwrap();
    let reports = orchestrator.run(vec![dc], Mode::Preview);
    assert!(reports[0].is_ok(), "{:?}", reports[0].error);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
