use crate::audit::{check_labels, check_rtypes};
use crate::common::{CapabilitySnafu, Result, ValidationSnafu};
use crate::models::txt::{split_octets, MAX_STRING_OCTETS};
use crate::models::{
    AutoDnssec, DomainConfig, Nameserver, RecordConfig, RecordType, DEFAULT_TTL,
};
use crate::providers::{Capability, ProviderInstance, Registry};

/// Adds an apex NS record for every name server the desired records do
/// not already publish. Nothing is added if the apex NS RRset is declared
/// explicitly.
pub fn inject_apex_ns(dc: &mut DomainConfig, nameservers: &[Nameserver]) -> Result<()> {
    let declared = dc
        .records
        .iter()
        .any(|rc| rc.rtype == RecordType::NS && rc.is_apex());
    if declared {
        return Ok(());
    }
    for ns in nameservers {
        let rc = RecordConfig::from_string("@", DEFAULT_TTL, "NS", &format!("{ns}."), &dc.name)?;
        dc.records.push(rc);
    }
    Ok(())
}

/// Merges name server lists, keeping the first occurrence of each.
pub fn merge_nameservers<'n>(lists: impl IntoIterator<Item = &'n [Nameserver]>) -> Vec<Nameserver> {
    let mut merged: Vec<Nameserver> = Vec::new();
    for ns in lists.into_iter().flatten() {
        if !merged.contains(ns) {
            merged.push(ns.clone());
        }
    }
    merged
}

/// Moves every TTL into the provider's accepted range, returning a
/// warning per record that changed.
pub fn clamp_ttls(dc: &mut DomainConfig, provider: &ProviderInstance) -> Vec<String> {
    let limits = &provider.limits;
    let mut warnings = Vec::new();
    for rc in dc.records.iter_mut() {
        let clamped = rc.ttl.clamp(limits.min_ttl, limits.max_ttl);
        if clamped == rc.ttl {
            continue;
        }
        let message = format!(
            "{} {}: TTL {} is outside {}'s range, using {clamped}",
            rc.name_fqdn(),
            rc.rtype,
            rc.ttl,
            provider.name
        );
        tracing::warn!(provider = %provider.name, record = %rc.key(), ttl = rc.ttl, clamped, "Clamped TTL");
        warnings.push(message);
        rc.ttl = clamped;
    }
    warnings
}

/// Fits a normalized domain to one provider's limits and audits the
/// result. `dc` is that provider's private copy. Returns the warnings for
/// whatever was adjusted.
pub fn prepare_for_provider(
    dc: &mut DomainConfig,
    provider: &ProviderInstance,
    registry: &Registry,
) -> Result<Vec<String>> {
    let mut warnings = clamp_ttls(dc, provider);
    let limits = &provider.limits;

    for rc in dc.records.iter_mut() {
        if rc.rtype == RecordType::ALIAS && !rc.is_apex() && !limits.alias_off_apex {
            tracing::debug!(provider = %provider.name, record = %rc.key(), "Rewrote ALIAS to CNAME");
            rc.rtype = RecordType::CNAME;
        }

        if limits.split_txt
            && rc.rtype == RecordType::TXT
            && rc.txt_strings.iter().any(|s| s.len() > MAX_STRING_OCTETS)
        {
            let strings = rc
                .txt_strings
                .iter()
                .flat_map(|s| split_octets(s, MAX_STRING_OCTETS))
                .collect();
            rc.set_target_txts(strings);
        }
    }

    let mut errors = provider.auditor.audit(&dc.records);
    errors.extend(check_rtypes(&dc.records, |rc| {
        match registry.custom_rtype_owner(&rc.rtype) {
            Some(owner) => owner == provider.type_name,
            None => provider.features.supports_record(rc),
        }
    }));
    errors.extend(check_labels(&dc.name, &dc.records, limits.alias_off_apex));
    errors.extend(provider.driver.check_records(dc));
    if !errors.is_empty() {
        for err in &errors {
            tracing::error!(provider = %provider.name, domain = %dc.name, "{err}");
        }
        return ValidationSnafu {
            domain: dc.name.as_str(),
            message: format!(
                "{} rejected by {}: {}",
                errors.len(),
                provider.name,
                errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
            ),
        }
        .fail();
    }

    match dc.auto_dnssec {
        AutoDnssec::On if !provider.features.supports(Capability::CanAutoDNSSEC) => {
            return CapabilitySnafu {
                provider: provider.name.as_str(),
                capability: Capability::CanAutoDNSSEC.to_string(),
            }
            .fail();
        }
        AutoDnssec::Off if !provider.features.supports(Capability::CanAutoDNSSEC) => {
            let message = format!("{} cannot manage DNSSEC, ignoring auto_dnssec off", provider.name);
            tracing::warn!(provider = %provider.name, domain = %dc.name, "AutoDNSSEC unsupported");
            warnings.push(message);
        }
        _ => {}
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{nameservers_from, normalize_domain};
    use crate::providers::Settings;

    fn instance(type_name: &str) -> ProviderInstance {
        let mut settings = Settings::new();
        settings.insert("api_token".into(), "token".into());
        Registry::with_builtin()
            .dns_provider("p", type_name, &settings)
            .unwrap()
    }

    fn domain(records: &[(&str, u32, &str, &str)]) -> DomainConfig {
        let mut dc = DomainConfig::new("example.com");
        for (label, ttl, rtype, target) in records {
            dc.records
                .push(RecordConfig::from_string(label, *ttl, rtype, target, "example.com").unwrap());
        }
        normalize_domain(&mut dc).unwrap();
        dc
    }

    #[test]
    fn clamps_ttls_and_warns() {
        let mut dc = domain(&[("www", 5, "A", "192.0.2.1"), ("@", 999999, "A", "192.0.2.2")]);
        let warnings = prepare_for_provider(&mut dc, &instance("CLOUDFLAREAPI"), &Registry::with_builtin()).unwrap();
        assert_eq!(warnings.len(), 2);
        assert_eq!(dc.records[0].ttl, 60);
        assert_eq!(dc.records[1].ttl, 86400);
    }

    #[test]
    fn off_apex_alias_becomes_cname() {
        let mut dc = domain(&[("@", 300, "ALIAS", "target.example.net."), ("www", 300, "ALIAS", "target.example.net.")]);
        prepare_for_provider(&mut dc, &instance("CLOUDFLAREAPI"), &Registry::with_builtin()).unwrap();
        assert_eq!(dc.records[0].rtype, RecordType::ALIAS);
        assert_eq!(dc.records[1].rtype, RecordType::CNAME);
    }

    #[test]
    fn unsupported_types_fail_validation() {
        let mut dc = domain(&[("@", 300, "ALIAS", "target.example.net.")]);
        let err = prepare_for_provider(&mut dc, &instance("BIND"), &Registry::with_builtin()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("ALIAS rtype is not supported"), "{err}");
    }

    #[test]
    fn long_txt_is_split_for_zone_files() {
        let long = "x".repeat(300);
        let mut dc = domain(&[("@", 300, "TXT", &format!("\"{long}\""))]);
        prepare_for_provider(&mut dc, &instance("BIND"), &Registry::with_builtin()).unwrap();
        assert_eq!(dc.records[0].txt_strings.len(), 2);
        assert_eq!(dc.records[0].txt_concatenated(), long);
    }

    #[test]
    fn custom_types_belong_to_their_provider() {
        let registry = Registry::with_builtin();
        let mut dc = DomainConfig::new("example.com");
        let mut rc = RecordConfig::new("CF_REDIRECT".parse().unwrap(), "example.com");
        rc.set_target("example.com/*,https://example.net/$1");
        dc.records.push(rc);
        normalize_domain(&mut dc).unwrap();

        let mut settings = Settings::new();
        settings.insert("api_token".into(), "token".into());
        settings.insert("manage_redirects".into(), "true".into());
        let cloudflare = registry.dns_provider("p", "CLOUDFLAREAPI", &settings).unwrap();
        assert!(prepare_for_provider(&mut dc.clone(), &cloudflare, &registry).is_ok());
        assert!(prepare_for_provider(&mut dc.clone(), &instance("BIND"), &registry).is_err());

        // Without the setting the driver refuses the record before any I/O.
        let err = prepare_for_provider(&mut dc, &instance("CLOUDFLAREAPI"), &registry).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("manage_redirects"), "{err}");
    }

    #[test]
    fn dnssec_on_needs_the_capability() {
        let mut dc = domain(&[]);
        dc.auto_dnssec = AutoDnssec::On;
        let err = prepare_for_provider(&mut dc.clone(), &instance("BIND"), &Registry::with_builtin()).unwrap_err();
        assert!(matches!(err, crate::common::Error::CapabilityError { .. }));

        dc.auto_dnssec = AutoDnssec::Off;
        let warnings = prepare_for_provider(&mut dc, &instance("BIND"), &Registry::with_builtin()).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn apex_ns_injection() {
        let mut dc = domain(&[("www", 300, "A", "192.0.2.1")]);
        let merged = merge_nameservers([
            &nameservers_from(&["ns1.example.net", "ns2.example.net"])[..],
            &nameservers_from(&["NS2.example.net.", "ns3.example.org"])[..],
        ]);
        assert_eq!(merged.len(), 3);
        inject_apex_ns(&mut dc, &merged).unwrap();
        let ns: Vec<_> = dc.records.of_type(&RecordType::NS).map(|rc| rc.target().to_string()).collect();
        assert_eq!(ns, vec!["ns1.example.net.", "ns2.example.net.", "ns3.example.org."]);

        // Declared apex NS wins.
        let mut dc = domain(&[("@", 300, "NS", "ns.example.com.")]);
        inject_apex_ns(&mut dc, &merged).unwrap();
        assert_eq!(dc.records.len(), 1);
    }
}
