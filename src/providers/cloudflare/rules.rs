//! Forwarding page rules and worker routes, exposed as the custom record
//! types `CF_REDIRECT`, `CF_TEMP_REDIRECT` and `CF_WORKER_ROUTE`.
//!
//! All three live at the zone apex and carry a target of the form
//! `pattern,destination` (or `pattern,script` for worker routes).

use crate::common::{AuditSnafu, Error, RecordSnafu, Result};
use crate::models::{Original, RecordConfig, RecordType, DEFAULT_TTL};

use super::PROVIDER_NAME;

pub const CF_REDIRECT: &str = "CF_REDIRECT";
pub const CF_TEMP_REDIRECT: &str = "CF_TEMP_REDIRECT";
pub const CF_WORKER_ROUTE: &str = "CF_WORKER_ROUTE";

pub(super) const CUSTOM_RTYPES: &[&str] = &[CF_REDIRECT, CF_TEMP_REDIRECT, CF_WORKER_ROUTE];

const FORWARDING_URL: &str = "forwarding_url";

/// Which Cloudflare object a custom record type stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RuleKind {
    Redirect { status_code: u16 },
    WorkerRoute,
}

impl RuleKind {
    pub fn of(rtype: &RecordType) -> Option<Self> {
        match rtype {
            RecordType::Custom(name) if name == CF_REDIRECT => Some(Self::Redirect { status_code: 301 }),
            RecordType::Custom(name) if name == CF_TEMP_REDIRECT => Some(Self::Redirect { status_code: 302 }),
            RecordType::Custom(name) if name == CF_WORKER_ROUTE => Some(Self::WorkerRoute),
            _ => None,
        }
    }
}

/// Splits a rule target at its first comma.
pub(super) fn split_rule_target(target: &str) -> Option<(&str, &str)> {
    let (pattern, destination) = target.split_once(',')?;
    let (pattern, destination) = (pattern.trim(), destination.trim());
    (!pattern.is_empty() && !destination.is_empty()).then_some((pattern, destination))
}

fn custom_record(rtype: &str, domain: &str, pattern: &str, destination: &str) -> RecordConfig {
    let mut rc = RecordConfig::new(RecordType::Custom(rtype.to_string()), domain);
    rc.ttl = DEFAULT_TTL;
    rc.set_target(format!("{pattern},{destination}"));
    rc
}

/// Problems with a desired rule record, judged without the API.
pub(super) fn check_rule(rc: &RecordConfig, kind: RuleKind, redirects: bool, workers: bool) -> Option<Error> {
    let problem = match kind {
        RuleKind::Redirect { .. } if !redirects => Some("manage_redirects is not enabled for this provider".to_string()),
        RuleKind::WorkerRoute if !workers => Some("manage_workers is not enabled for this provider".to_string()),
        _ if !rc.is_apex() => Some("rules are declared at the apex".to_string()),
        _ => match (kind, split_rule_target(rc.target())) {
            (_, None) => Some(format!("target {:?} is not of the form pattern,destination", rc.target())),
            (RuleKind::Redirect { .. }, Some((_, destination))) => url::Url::parse(destination)
                .err()
                .map(|err| format!("redirect destination {destination:?} is not a URL: {err}")),
            (RuleKind::WorkerRoute, Some((_, script))) if script.contains(char::is_whitespace) => {
                Some(format!("worker script name {script:?} contains whitespace"))
            }
            _ => None,
        },
    };
    problem.map(|message| {
        AuditSnafu {
            label: rc.name_fqdn(),
            rtype: rc.rtype.as_str(),
            message,
        }
        .build()
    })
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub(super) struct Constraint {
    pub operator: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub(super) struct PageRuleTarget {
    pub target: String,
    pub constraint: Constraint,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub(super) struct PageRuleAction {
    pub id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub(super) struct PageRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub targets: Vec<PageRuleTarget>,
    pub actions: Vec<PageRuleAction>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub status: String,
}

impl PageRule {
    /// The redirect this rule implements. Rules that do anything other
    /// than forward a single URL pattern are not ours and yield `None`.
    pub fn to_record_config(&self, domain: &str) -> Option<RecordConfig> {
        let [target] = self.targets.as_slice() else {
            return None;
        };
        let [action] = self.actions.as_slice() else {
            return None;
        };
        if action.id != FORWARDING_URL || target.target != "url" {
            return None;
        }
        let destination = action.value.get("url")?.as_str()?;
        let rtype = match action.value.get("status_code")?.as_u64()? {
            301 => CF_REDIRECT,
            302 => CF_TEMP_REDIRECT,
            _ => return None,
        };
        let mut rc = custom_record(rtype, domain, &target.constraint.value, destination);
        rc.original = Some(Original::new(PROVIDER_NAME, self.clone()));
        Some(rc)
    }

    /// The rule for a desired redirect record, at `priority`.
    pub fn from_record_config(rc: &RecordConfig, priority: i32) -> Result<Self> {
        let Some(RuleKind::Redirect { status_code }) = RuleKind::of(&rc.rtype) else {
            return RecordSnafu {
                message: format!("{} is not a redirect", rc.rtype),
            }
            .fail();
        };
        let (pattern, destination) = split_rule_target(rc.target()).ok_or_else(|| {
            RecordSnafu {
                message: format!("{}: malformed redirect {:?}", rc.rtype, rc.target()),
            }
            .build()
        })?;
        Ok(Self {
            id: String::new(),
            targets: vec![PageRuleTarget {
                target: "url".to_string(),
                constraint: Constraint {
                    operator: "matches".to_string(),
                    value: pattern.to_string(),
                },
            }],
            actions: vec![PageRuleAction {
                id: FORWARDING_URL.to_string(),
                value: serde_json::json!({ "url": destination, "status_code": status_code }),
            }],
            priority,
            status: "active".to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub(super) struct WorkerRoute {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub script: String,
}

impl WorkerRoute {
    /// Routes without a script only disable workers on a pattern and are
    /// left alone.
    pub fn to_record_config(&self, domain: &str) -> Option<RecordConfig> {
        if self.script.is_empty() {
            return None;
        }
        let mut rc = custom_record(CF_WORKER_ROUTE, domain, &self.pattern, &self.script);
        rc.original = Some(Original::new(PROVIDER_NAME, self.clone()));
        Some(rc)
    }

    pub fn from_record_config(rc: &RecordConfig) -> Result<Self> {
        let (pattern, script) = split_rule_target(rc.target()).ok_or_else(|| {
            RecordSnafu {
                message: format!("{}: malformed worker route {:?}", rc.rtype, rc.target()),
            }
            .build()
        })?;
        Ok(Self {
            id: String::new(),
            pattern: pattern.to_string(),
            script: script.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_record(rtype: &str, label: &str, target: &str) -> RecordConfig {
        let mut rc = RecordConfig::new(RecordType::Custom(rtype.into()), "example.com");
        rc.set_label(label, "example.com").unwrap();
        rc.set_target(target);
        rc
    }

    #[test]
    fn forwarding_rules_become_redirects() {
        let rule: PageRule = serde_json::from_value(json!({
            "id": "pr1",
            "targets": [{"target": "url", "constraint": {"operator": "matches", "value": "example.com/*"}}],
            "actions": [{"id": "forwarding_url", "value": {"url": "https://www.example.com/$1", "status_code": 302}}],
            "priority": 1,
            "status": "active"
        }))
        .unwrap();
        let rc = rule.to_record_config("example.com").unwrap();
        assert_eq!(rc.rtype.as_str(), CF_TEMP_REDIRECT);
        assert_eq!(rc.target(), "example.com/*,https://www.example.com/$1");
        assert!(rc.is_apex());
        assert_eq!(rc.original.as_ref().unwrap().get::<PageRule>(PROVIDER_NAME).unwrap().id, "pr1");

        let back = PageRule::from_record_config(&rc, 4).unwrap();
        assert_eq!(back.priority, 4);
        assert_eq!(back.targets, rule.targets);
        assert_eq!(back.actions, rule.actions);
    }

    #[test]
    fn other_page_rules_are_ignored() {
        let rule: PageRule = serde_json::from_value(json!({
            "id": "pr2",
            "targets": [{"target": "url", "constraint": {"operator": "matches", "value": "example.com/admin*"}}],
            "actions": [{"id": "cache_level", "value": "bypass"}]
        }))
        .unwrap();
        assert!(rule.to_record_config("example.com").is_none());
    }

    #[test]
    fn worker_routes() {
        let route = WorkerRoute {
            id: "r1".into(),
            pattern: "example.com/api/*".into(),
            script: "api-worker".into(),
        };
        let rc = route.to_record_config("example.com").unwrap();
        assert_eq!(rc.target(), "example.com/api/*,api-worker");
        assert_eq!(WorkerRoute::from_record_config(&rc).unwrap().script, "api-worker");

        let disabled = WorkerRoute {
            script: String::new(),
            ..route
        };
        assert!(disabled.to_record_config("example.com").is_none());
        assert_eq!(
            serde_json::to_value(WorkerRoute::from_record_config(&rc).unwrap()).unwrap(),
            json!({"pattern": "example.com/api/*", "script": "api-worker"})
        );
    }

    #[test]
    fn rule_checks() {
        let kind = |rc: &RecordConfig| RuleKind::of(&rc.rtype).unwrap();
        let ok = rule_record(CF_REDIRECT, "@", "example.com/*,https://www.example.com/$1");
        assert!(check_rule(&ok, kind(&ok), true, false).is_none());
        let disabled = check_rule(&ok, kind(&ok), false, true).unwrap();
        assert!(disabled.to_string().contains("manage_redirects"), "{disabled}");

        for (rtype, label, target) in [
            (CF_REDIRECT, "www", "example.com/*,https://www.example.com/"),
            (CF_REDIRECT, "@", "https://www.example.com/"),
            (CF_TEMP_REDIRECT, "@", "example.com/*,not a url"),
            (CF_WORKER_ROUTE, "@", "example.com/*,two words"),
        ] {
            let rc = rule_record(rtype, label, target);
            assert!(check_rule(&rc, kind(&rc), true, true).is_some(), "{rtype} {label} {target}");
        }
        let route = rule_record(CF_WORKER_ROUTE, "@", "example.com/*,my-worker");
        assert!(check_rule(&route, kind(&route), false, true).is_none());
        assert!(RuleKind::of(&RecordType::A).is_none());
    }
}
