use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::json;
use snafu::prelude::*;

use crate::common::{
    is_rate_limit_status, AuditSnafu, Backoff, Error, ProviderSnafu, RequestSnafu, ResponseSnafu,
    Result, ValidationSnafu,
};
use crate::diff::{Change, Verb};
use crate::models::{
    Correction, DomainConfig, Nameserver, RecordConfig, RecordType, Records, DEFAULT_TTL,
};
use crate::providers::{zone_differ, DnsProvider, DnssecToggler, ZoneCreator, ZoneLister};

use super::models::{
    parse_proxy, proxy_setting, proxyable, APIError, DNSRecord, Dnssec, Native,
    PaginatedResponse, WriteResponse, Zone, META_PROXY, META_PROXY_DEFAULT,
};
use super::rdata::{canonical_loc, unquote_params};
use super::rules::{check_rule, PageRule, RuleKind, WorkerRoute};
use super::Config;

const API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Clone, Copy)]
enum WriteMethod {
    Create,
    Delete,
    Update,
    Patch,
}

impl fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMethod::Create => "POST",
            WriteMethod::Delete => "DELETE",
            WriteMethod::Update => "PUT",
            WriteMethod::Patch => "PATCH",
        })
    }
}

fn process_errors(success: bool, errors: Vec<APIError>) -> Result<()> {
    if !success || !errors.is_empty() {
        let mut err_msg: String = String::new();
        for err in errors {
            err_msg.push_str(&format!("{} {}; ", err.code, err.message));
        }
        return ResponseSnafu {
            message: format!("Request unsuccessful: {err_msg}"),
        }
        .fail();
    }
    Ok(())
}

fn is_rate_limited(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::Status(status, _) if is_rate_limit_status(*status))
}

pub struct Cloudflare {
    name: String,
    api_token: String,
    account_id: Option<String>,
    manage_redirects: bool,
    manage_workers: bool,
    zones: Mutex<Option<BTreeMap<String, Zone>>>,
    backoff: Backoff,
}

impl Cloudflare {
    pub fn new(name: &str, config: Config) -> Self {
        Self {
            name: name.to_string(),
            api_token: config.api_token,
            account_id: config.account_id,
            manage_redirects: config.manage_redirects,
            manage_workers: config.manage_workers,
            zones: Mutex::new(None),
            backoff: Backoff::default(),
        }
    }

    fn with_headers(&self, req: ureq::Request) -> ureq::Request {
        req.set("Authorization", &format!("Bearer {}", self.api_token))
            .set("Content-Type", "application/json; charset=utf8")
    }

    /// Sends a request, retrying while the API asks us to slow down.
    fn call(
        &self,
        url: &str,
        method: &str,
        send: impl Fn() -> std::result::Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response> {
        self.backoff
            .run(url, is_rate_limited, send)
            .map_err(Box::new)
            .context(RequestSnafu { url, method })
    }

    fn parse<T: DeserializeOwned>(&self, resp: ureq::Response) -> Result<T> {
        resp.into_json().boxed().context(ProviderSnafu {
            provider: &self.name,
            message: "Failed to deserialize response",
        })
    }

    fn api_get_paginated<T: DeserializeOwned>(&self, url: &str, per_page: usize) -> Result<Vec<T>> {
        let mut page = 1;
        let mut items: Vec<T> = Vec::new();
        loop {
            tracing::debug!(
                url = url,
                method = "GET",
                provider = %self.name,
                page = page,
                "Sending request"
            );
            let resp = self.call(url, "GET", || {
                self.with_headers(ureq::get(url))
                    .query("page", &page.to_string())
                    .query("per_page", &per_page.to_string())
                    .call()
            })?;
            let mut resp: PaginatedResponse<T> = self.parse(resp)?;

            process_errors(resp.success, resp.errors)?;

            items.append(&mut resp.result);

            match resp.result_info {
                Some(info) if info.page < info.total_pages => page += 1,
                _ => return Ok(items),
            }
        }
    }

    fn api_get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url = url, method = "GET", provider = %self.name, "Sending request");
        let resp = self.call(url, "GET", || self.with_headers(ureq::get(url)).call())?;
        let resp: WriteResponse<T> = self.parse(resp)?;
        process_errors(resp.success, resp.errors)?;
        resp.result.context(ResponseSnafu {
            message: format!("GET {url} returned no result"),
        })
    }

    fn api_write<T: DeserializeOwned>(
        &self,
        url: &str,
        method: WriteMethod,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        tracing::debug!(url = url, method = %method, provider = %self.name, "Sending request");
        let verb = method.to_string();
        let resp = self.call(url, &verb, || {
            let req = match method {
                WriteMethod::Create => ureq::post(url),
                WriteMethod::Delete => ureq::delete(url),
                WriteMethod::Update => ureq::put(url),
                WriteMethod::Patch => ureq::request("PATCH", url),
            };
            self.with_headers(req).send_json(body)
        })?;
        let resp: WriteResponse<T> = self.parse(resp)?;

        process_errors(resp.success, resp.errors)?;

        Ok(resp.result)
    }

    fn load_zones(&self) -> Result<BTreeMap<String, Zone>> {
        let mut url = url::Url::parse(&format!("{API_BASE_URL}/zones")).map_err(|e| {
            ResponseSnafu {
                message: format!("invalid zones URL: {e}"),
            }
            .build()
        })?;
        if let Some(account) = &self.account_id {
            url.query_pairs_mut().append_pair("account.id", account);
        }
        let zones: Vec<Zone> = self.api_get_paginated(url.as_str(), 50)?;
        Ok(zones.into_iter().map(|z| (z.name.to_ascii_lowercase(), z)).collect())
    }

    /// Looks a zone up, listing all zones once per run.
    fn get_zone(&self, domain: &str) -> Result<Zone> {
        let mut cache = self.zones.lock().map_err(|_| {
            ResponseSnafu {
                message: "zone cache lock poisoned",
            }
            .build()
        })?;
        if cache.is_none() {
            *cache = Some(self.load_zones()?);
        }
        match cache.as_ref().and_then(|zones| zones.get(domain)) {
            Some(zone) => Ok(zone.clone()),
            None => ResponseSnafu {
                message: format!("Failed to find a zone ID for domain {domain}"),
            }
            .fail(),
        }
    }

    fn forget_zones(&self) {
        if let Ok(mut cache) = self.zones.lock() {
            *cache = None;
        }
    }

    fn zone_url(zone_id: &str, collection: &str) -> String {
        format!("{API_BASE_URL}/zones/{zone_id}/{collection}")
    }

    fn read_records(&self, zone_id: &str) -> Result<Vec<DNSRecord>> {
        self.api_get_paginated(&Self::zone_url(zone_id, "dns_records"), 1000)
    }

    /// Reads the objects behind the custom record types that are enabled.
    fn read_rules(&self, zone_id: &str, domain: &str) -> Result<Vec<RecordConfig>> {
        let mut records = Vec::new();
        if self.manage_redirects {
            let rules: Vec<PageRule> = self.api_get(&Self::zone_url(zone_id, "pagerules"))?;
            records.extend(rules.iter().filter_map(|rule| rule.to_record_config(domain)));
        }
        if self.manage_workers {
            let routes: Vec<WorkerRoute> = self.api_get(&Self::zone_url(zone_id, "workers/routes"))?;
            records.extend(routes.iter().filter_map(|route| route.to_record_config(domain)));
        }
        Ok(records)
    }

    fn write_body(&self, native: &Native) -> Result<serde_json::Value> {
        native.body().boxed().context(ProviderSnafu {
            provider: &self.name,
            message: "Failed to serialize record",
        })
    }

    fn create(&self, zone_id: &str, native: &Native) -> Result<()> {
        tracing::info!(provider = %self.name, object = %native.describe(), "Creating record");
        let body = self.write_body(native)?;
        self.api_write::<serde_json::Value>(
            &Self::zone_url(zone_id, native.collection()),
            WriteMethod::Create,
            &body,
        )?;
        Ok(())
    }

    fn update(&self, zone_id: &str, old: &Native, new: &Native) -> Result<()> {
        if !old.is_managed() {
            tracing::warn!(
                provider = %self.name,
                object = %old.describe(),
                record_id = %old.id(),
                "Record was not created by zonesync but will be updated anyway"
            );
        }
        tracing::info!(
            provider = %self.name,
            object = %new.describe(),
            record_id = %old.id(),
            "Updating record"
        );
        let body = self.write_body(new)?;
        let url = format!("{}/{}", Self::zone_url(zone_id, old.collection()), old.id());
        self.api_write::<serde_json::Value>(&url, WriteMethod::Update, &body)?;
        Ok(())
    }

    fn delete(&self, zone_id: &str, old: &Native) -> Result<()> {
        tracing::info!(
            provider = %self.name,
            object = %old.describe(),
            record_id = %old.id(),
            "Deleting record",
        );
        let url = format!("{}/{}", Self::zone_url(zone_id, old.collection()), old.id());
        self.api_write::<serde_json::Value>(&url, WriteMethod::Delete, &json!({}))?;
        Ok(())
    }

    /// Turns one diff change into a correction addressing objects by ID.
    /// `priorities` holds the page rule priority of each desired redirect.
    fn correction<'a>(
        &'a self,
        zone_id: &str,
        change: Change,
        priorities: &BTreeMap<String, i32>,
    ) -> Result<Correction<'a>> {
        let msg = change.message();
        let zone_id = zone_id.to_string();
        let existing = |rc: &RecordConfig| -> Result<Native> {
            Native::of_existing(rc).context(ResponseSnafu {
                message: format!("{} {} has no Cloudflare ID", rc.name_fqdn(), rc.rtype),
            })
        };
        let desired = |rc: &RecordConfig| -> Result<Native> {
            let priority = priorities.get(&rule_key(rc)).copied().unwrap_or(1);
            Native::for_desired(rc, priority)
        };
        Ok(match change.verb {
            Verb::Report => Correction::report(msg),
            Verb::Create => {
                let new = change.new.iter().map(desired).collect::<Result<Vec<_>>>()?;
                Correction::new(msg, move || new.iter().try_for_each(|native| self.create(&zone_id, native)))
            }
            Verb::Delete => {
                let old = change.old.iter().map(existing).collect::<Result<Vec<_>>>()?;
                Correction::new(msg, move || old.iter().try_for_each(|native| self.delete(&zone_id, native)))
            }
            Verb::Change => {
                let old = change.old.iter().map(existing).collect::<Result<Vec<_>>>()?;
                let new = change.new.iter().map(desired).collect::<Result<Vec<_>>>()?;
                let pairs: Vec<(Native, Native)> = old.into_iter().zip(new).collect();
                Correction::new(msg, move || {
                    pairs.iter().try_for_each(|(old, new)| self.update(&zone_id, old, new))
                })
            }
        })
    }
}

fn rule_key(rc: &RecordConfig) -> String {
    format!("{} {}", rc.rtype, rc.target())
}

/// Page rule priorities follow declaration order, starting at 1.
fn redirect_priorities(records: &Records) -> BTreeMap<String, i32> {
    records
        .iter()
        .filter(|rc| matches!(RuleKind::of(&rc.rtype), Some(RuleKind::Redirect { .. })))
        .zip(1..)
        .map(|(rc, priority)| (rule_key(rc), priority))
        .collect()
}

/// The proxy flag a record ends up with, taking the domain default into
/// account. `None` for types that cannot be proxied.
fn effective_proxy<'r>(dc: &'r DomainConfig, rc: &'r RecordConfig) -> Option<&'r str> {
    if !proxyable(&rc.rtype) {
        return None;
    }
    rc.meta(META_PROXY)
        .or_else(|| dc.metadata.get(META_PROXY_DEFAULT).map(String::as_str))
}

/// The desired records in the form Cloudflare reads them back in.
fn desired_records(dc: &DomainConfig) -> Result<Records> {
    dc.records
        .iter()
        .map(|rc| {
            let mut rc = rc.clone();
            let proxy = effective_proxy(dc, &rc).map(str::to_string);
            if let Some(proxy) = proxy {
                if proxy == "on" {
                    rc.ttl = DEFAULT_TTL;
                }
                rc.metadata.insert(META_PROXY.to_string(), proxy);
            }
            let rtype = rc.rtype.clone();
            match &rtype {
                RecordType::LOC => {
                    let loc = canonical_loc(rc.target())?;
                    rc.set_target(loc);
                }
                RecordType::HTTPS | RecordType::SVCB => rc.svc_params = unquote_params(&rc.svc_params),
                rtype if RuleKind::of(rtype).is_some() => rc.ttl = DEFAULT_TTL,
                _ => {}
            }
            Ok(rc)
        })
        .collect()
}

impl DnsProvider for Cloudflare {
    fn get_nameservers(&self, domain: &str) -> Result<Vec<Nameserver>> {
        let zone = self.get_zone(domain)?;
        Ok(zone.name_servers.iter().map(|ns| Nameserver::new(ns)).collect())
    }

    fn get_zone_records(&self, domain: &str, _meta: &BTreeMap<String, String>) -> Result<Records> {
        let zone = self.get_zone(domain)?;
        let mut records = Records::new();
        for native in self.read_records(&zone.id)? {
            records.push(native.to_record_config(domain)?);
        }
        for rc in self.read_rules(&zone.id, domain)? {
            records.push(rc);
        }
        tracing::info!(
            provider = %self.name,
            domain = domain,
            records = records.len(),
            "Read completed",
        );
        Ok(records)
    }

    fn get_zone_records_corrections<'a>(
        &'a self,
        dc: &DomainConfig,
        existing: Records,
    ) -> Result<(Vec<Correction<'a>>, usize)> {
        let desired = desired_records(dc)?;
        let (changes, actual) = zone_differ(dc, false)
            .compare_with(proxy_setting)
            .by_record(&existing, &desired);
        if changes.is_empty() {
            tracing::info!(provider = %self.name, domain = %dc.name, "No changes detected");
            return Ok((Vec::new(), 0));
        }
        let zone = self.get_zone(&dc.name)?;
        let priorities = redirect_priorities(&desired);
        let corrections = changes
            .into_iter()
            .map(|change| self.correction(&zone.id, change, &priorities))
            .collect::<Result<Vec<_>>>()?;
        Ok((corrections, actual))
    }

    fn check_records(&self, dc: &DomainConfig) -> Vec<Error> {
        let mut errors = Vec::new();
        let problem = |rc: &RecordConfig, message: String| -> Error {
            AuditSnafu {
                label: rc.name_fqdn(),
                rtype: rc.rtype.as_str(),
                message,
            }
            .build()
        };
        if let Some(default) = dc.metadata.get(META_PROXY_DEFAULT) {
            if parse_proxy(default).is_none() {
                errors.push(
                    ValidationSnafu {
                        domain: dc.name.as_str(),
                        message: format!("{META_PROXY_DEFAULT} must be on or off, not {default:?}"),
                    }
                    .build(),
                );
            }
        }
        for rc in dc.records.iter() {
            if let Some(proxy) = rc.meta(META_PROXY) {
                if !proxyable(&rc.rtype) {
                    errors.push(problem(rc, format!("{} records cannot be proxied", rc.rtype)));
                } else if parse_proxy(proxy).is_none() {
                    errors.push(problem(rc, format!("{META_PROXY} must be on or off, not {proxy:?}")));
                }
            }
            if let Some(kind) = RuleKind::of(&rc.rtype) {
                errors.extend(check_rule(rc, kind, self.manage_redirects, self.manage_workers));
            }
            if rc.rtype == RecordType::LOC {
                if let Err(err) = canonical_loc(rc.target()) {
                    errors.push(problem(rc, err.to_string()));
                }
            }
        }
        errors
    }

    fn as_zone_lister(&self) -> Option<&dyn ZoneLister> {
        Some(self)
    }

    fn as_zone_creator(&self) -> Option<&dyn ZoneCreator> {
        Some(self)
    }

    fn as_dnssec_toggler(&self) -> Option<&dyn DnssecToggler> {
        Some(self)
    }
}

impl ZoneLister for Cloudflare {
    fn list_zones(&self) -> Result<Vec<String>> {
        Ok(self.load_zones()?.into_keys().collect())
    }
}

impl ZoneCreator for Cloudflare {
    fn ensure_zone_exists(&self, domain: &str) -> Result<()> {
        if self.load_zones()?.contains_key(domain) {
            return Ok(());
        }
        let Some(account) = &self.account_id else {
            return ResponseSnafu {
                message: format!("{}: account_id is required to create {domain}", self.name),
            }
            .fail();
        };
        tracing::info!(provider = %self.name, domain = domain, "Creating zone");
        let body = json!({"name": domain, "account": {"id": account}, "type": "full"});
        self.api_write::<Zone>(&format!("{API_BASE_URL}/zones"), WriteMethod::Create, &body)?;
        self.forget_zones();
        Ok(())
    }
}

impl DnssecToggler for Cloudflare {
    fn dnssec_enabled(&self, domain: &str) -> Result<bool> {
        let zone = self.get_zone(domain)?;
        let dnssec: Dnssec = self.api_get(&format!("{API_BASE_URL}/zones/{}/dnssec", zone.id))?;
        Ok(matches!(dnssec.status.as_str(), "active" | "pending"))
    }

    fn set_dnssec(&self, domain: &str, enabled: bool) -> Result<()> {
        let zone = self.get_zone(domain)?;
        let status = if enabled { "active" } else { "disabled" };
        tracing::info!(provider = %self.name, domain = domain, status = status, "Setting DNSSEC");
        self.api_write::<Dnssec>(
            &format!("{API_BASE_URL}/zones/{}/dnssec", zone.id),
            WriteMethod::Patch,
            &json!({ "status": status }),
        )?;
        Ok(())
    }
}
