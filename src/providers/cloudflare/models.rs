use crate::common::{RecordSnafu, Result};
use crate::models::txt::{parse_txt, render_txt};
use crate::models::{Original, RecordConfig, RecordType, DEFAULT_TTL};

use super::rdata::{api_host, apply_data, fqdn, to_data, uses_data};
use super::rules::{PageRule, RuleKind, WorkerRoute};
use super::PROVIDER_NAME;

pub(super) const DNS_RECORD_COMMENT: &str = "Managed by zonesync";
/// Record metadata holding the proxy flag, `on` or `off`.
pub const META_PROXY: &str = "cloudflare_proxy";
/// The TTL Cloudflare calls "automatic".
pub(super) const AUTO_TTL: u32 = 1;

#[derive(Debug, serde::Deserialize)]
pub(super) struct APIError {
    pub code: usize,
    pub message: String,
}

#[derive(serde::Deserialize)]
pub(super) struct PaginatedResponse<T> {
    pub success: bool,
    pub result: Vec<T>,
    #[serde(default)]
    pub errors: Vec<APIError>,
    pub result_info: Option<ResultInfo>,
}

#[derive(serde::Deserialize)]
pub(super) struct WriteResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Vec<APIError>,
}

#[derive(serde::Deserialize)]
pub(super) struct ResultInfo {
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub(super) struct Zone {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub name_servers: Vec<String>,
}

#[derive(serde::Deserialize)]
pub(super) struct Dnssec {
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub(super) struct DNSRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Domain metadata giving the proxy flag of records that set none.
pub const META_PROXY_DEFAULT: &str = "cloudflare_proxy_default";

pub(super) fn proxyable(rtype: &RecordType) -> bool {
    matches!(
        rtype,
        RecordType::A | RecordType::AAAA | RecordType::CNAME | RecordType::ALIAS
    )
}

/// The proxy flag as it takes part in comparisons.
pub(super) fn proxy_setting(rc: &RecordConfig) -> String {
    if !proxyable(&rc.rtype) {
        return String::new();
    }
    rc.meta(META_PROXY).unwrap_or("off").to_string()
}

pub(super) fn is_proxied(rc: &RecordConfig) -> bool {
    proxyable(&rc.rtype) && rc.meta(META_PROXY) == Some("on")
}

/// Parses a proxy flag, which is `on` or `off`.
pub(super) fn parse_proxy(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

impl DNSRecord {
    pub fn is_managed(&self) -> bool {
        self.comment.as_deref() == Some(DNS_RECORD_COMMENT)
    }

    /// Converts the API form into a record of `domain`. An apex CNAME is
    /// Cloudflare's flattened ALIAS.
    pub fn to_record_config(&self, domain: &str) -> Result<RecordConfig> {
        let mut rtype: RecordType = self
            .kind
            .parse()
            .map_err(|message| RecordSnafu { message }.build())?;
        let apex = self.name.trim_end_matches('.').eq_ignore_ascii_case(domain);
        if rtype == RecordType::CNAME && apex {
            rtype = RecordType::ALIAS;
        }

        let mut rc = RecordConfig::new(rtype, domain);
        rc.set_label_from_fqdn(&self.name, domain)?;
        rc.ttl = if self.ttl == AUTO_TTL { DEFAULT_TTL } else { self.ttl };

        let rtype = rc.rtype.clone();
        match &rtype {
            RecordType::A | RecordType::AAAA => rc.set_target(self.content.clone()),
            RecordType::MX => rc.set_target_mx(self.priority.unwrap_or_default(), fqdn(&self.content)),
            RecordType::TXT => {
                if self.content.starts_with('"') {
                    rc.set_target_txts(parse_txt(&self.content)?);
                } else {
                    rc.set_target_txt(self.content.clone());
                }
            }
            rtype if uses_data(rtype) => match &self.data {
                Some(data) => apply_data(&mut rc, data)?,
                None => rc.set_target_string(&self.content, domain)?,
            },
            rtype if rtype.has_hostname_target() => rc.set_target(fqdn(&self.content)),
            _ => rc.set_target_string(&self.content, domain)?,
        }

        if let Some(proxied) = self.proxied.filter(|_| proxyable(&rc.rtype)) {
            rc.metadata
                .insert(META_PROXY.to_string(), if proxied { "on" } else { "off" }.to_string());
        }
        rc.original = Some(Original::new(PROVIDER_NAME, self.clone()));
        Ok(rc)
    }

    /// The API form of a desired record. Proxied records always get the
    /// automatic TTL, Cloudflare refuses anything else for them.
    pub fn from_record_config(rc: &RecordConfig) -> Result<Self> {
        let mut record = Self {
            id: String::new(),
            kind: match rc.rtype {
                RecordType::ALIAS => "CNAME".to_string(),
                ref other => other.to_string(),
            },
            name: rc.name_fqdn().to_string(),
            content: String::new(),
            ttl: if is_proxied(rc) { AUTO_TTL } else { rc.ttl },
            proxied: None,
            priority: None,
            data: None,
            comment: Some(DNS_RECORD_COMMENT.to_string()),
        };
        match &rc.rtype {
            RecordType::MX => {
                record.content = api_host(rc.target());
                record.priority = Some(rc.mx_preference);
            }
            RecordType::TXT => {
                record.content = match rc.txt_strings.as_slice() {
                    [single] => single.clone(),
                    many => render_txt(many),
                };
            }
            rtype if uses_data(rtype) => record.data = Some(to_data(rc)?),
            rtype if rtype.has_hostname_target() => record.content = api_host(rc.target()),
            _ => record.content = rc.target_combined(),
        }
        if proxyable(&rc.rtype) {
            record.proxied = Some(is_proxied(rc));
        }
        Ok(record)
    }
}

/// The Cloudflare object behind an existing record, or the one to write
/// for a desired record.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum Native {
    Record(DNSRecord),
    PageRule(PageRule),
    WorkerRoute(WorkerRoute),
}

impl Native {
    /// The object stashed in an existing record.
    pub fn of_existing(rc: &RecordConfig) -> Option<Self> {
        let original = rc.original.as_ref()?;
        if let Some(record) = original.get::<DNSRecord>(PROVIDER_NAME) {
            return Some(Self::Record(record.clone()));
        }
        if let Some(rule) = original.get::<PageRule>(PROVIDER_NAME) {
            return Some(Self::PageRule(rule.clone()));
        }
        original
            .get::<WorkerRoute>(PROVIDER_NAME)
            .map(|route| Self::WorkerRoute(route.clone()))
    }

    /// The object to create for a desired record. `priority` only
    /// matters for redirects.
    pub fn for_desired(rc: &RecordConfig, priority: i32) -> Result<Self> {
        Ok(match RuleKind::of(&rc.rtype) {
            Some(RuleKind::Redirect { .. }) => Self::PageRule(PageRule::from_record_config(rc, priority)?),
            Some(RuleKind::WorkerRoute) => Self::WorkerRoute(WorkerRoute::from_record_config(rc)?),
            None => Self::Record(DNSRecord::from_record_config(rc)?),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Native::Record(record) => &record.id,
            Native::PageRule(rule) => &rule.id,
            Native::WorkerRoute(route) => &route.id,
        }
    }

    /// The API collection the object lives in, relative to the zone.
    pub fn collection(&self) -> &'static str {
        match self {
            Native::Record(_) => "dns_records",
            Native::PageRule(_) => "pagerules",
            Native::WorkerRoute(_) => "workers/routes",
        }
    }

    /// A one-line description for logs.
    pub fn describe(&self) -> String {
        match self {
            Native::Record(record) => format!("{} {} {}", record.kind, record.name, record.content),
            Native::PageRule(rule) => {
                let pattern = rule.targets.first().map(|t| t.constraint.value.as_str()).unwrap_or_default();
                format!("page rule {pattern}")
            }
            Native::WorkerRoute(route) => format!("worker route {} → {}", route.pattern, route.script),
        }
    }

    /// Whether zonesync created the object. Rules and routes carry no
    /// comment, so they always count as managed.
    pub fn is_managed(&self) -> bool {
        match self {
            Native::Record(record) => record.is_managed(),
            _ => true,
        }
    }

    /// The request body; IDs are part of the URL, not the body.
    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Native::Record(record) => serde_json::to_value(DNSRecord {
                id: String::new(),
                ..record.clone()
            }),
            Native::PageRule(rule) => serde_json::to_value(PageRule {
                id: String::new(),
                ..rule.clone()
            }),
            Native::WorkerRoute(route) => serde_json::to_value(WorkerRoute {
                id: String::new(),
                ..route.clone()
            }),
        }
    }
}
