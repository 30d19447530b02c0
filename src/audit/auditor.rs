use std::collections::BTreeMap;

use crate::common::{AuditSnafu, Error, ValidationSnafu};
use crate::models::{RecordConfig, RecordType};

use super::RejectIf;

/// The rejection rules of one provider, each scoped to a record type.
#[derive(Clone, Debug, Default)]
pub struct Auditor {
    rules: Vec<(RecordType, RejectIf)>,
}

impl Auditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects records of `rtype` that match `check`.
    pub fn reject(mut self, rtype: RecordType, check: RejectIf) -> Self {
        self.rules.push((rtype, check));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule against every record. All failures are returned,
    /// not just the first.
    pub fn audit(&self, records: &[RecordConfig]) -> Vec<Error> {
        let mut errors = Vec::new();
        for rc in records {
            for (rtype, check) in &self.rules {
                if &rc.rtype == rtype && check.rejects(rc) {
                    errors.push(audit_error(rc, check.reason()));
                }
            }
        }
        errors
    }
}

fn audit_error(rc: &RecordConfig, message: impl Into<String>) -> Error {
    AuditSnafu {
        label: rc.name_fqdn(),
        rtype: rc.rtype.as_str(),
        message: message.into(),
    }
    .build()
}

/// Reports, once per type, records the provider does not accept.
pub fn check_rtypes(records: &[RecordConfig], supports: impl Fn(&RecordConfig) -> bool) -> Vec<Error> {
    let mut errors: Vec<Error> = Vec::new();
    let mut seen: Vec<&RecordType> = Vec::new();
    for rc in records {
        if !supports(rc) && !seen.contains(&&rc.rtype) {
            seen.push(&rc.rtype);
            errors.push(audit_error(rc, format!("{} rtype is not supported", rc.rtype)));
        }
    }
    errors
}

/// Checks the rules that hold regardless of provider: a CNAME owns its
/// label exclusively, the apex cannot be a CNAME, and ALIAS stays at the
/// apex unless `alias_off_apex` says otherwise.
pub fn check_labels(domain: &str, records: &[RecordConfig], alias_off_apex: bool) -> Vec<Error> {
    let mut by_label: BTreeMap<&str, Vec<&RecordConfig>> = BTreeMap::new();
    for rc in records {
        by_label.entry(rc.name_fqdn()).or_default().push(rc);
    }

    let mut errors = Vec::new();
    for (label, members) in by_label {
        let cnames = members.iter().filter(|rc| rc.rtype == RecordType::CNAME).count();
        if cnames > 1 {
            errors.push(validation_error(domain, format!("{label} has more than one CNAME")));
        }
        if cnames > 0 && cnames < members.len() {
            errors.push(validation_error(
                domain,
                format!("{label} has a CNAME and other records, which is not allowed"),
            ));
        }
        for rc in members {
            if rc.is_apex() && rc.rtype == RecordType::CNAME {
                errors.push(validation_error(
                    domain,
                    "a CNAME is not allowed at the apex, use ALIAS instead".to_string(),
                ));
            }
            if !rc.is_apex() && rc.rtype == RecordType::ALIAS && !alias_off_apex {
                errors.push(validation_error(
                    domain,
                    format!("ALIAS at {label} is only allowed at the apex"),
                ));
            }
        }
    }
    errors
}

fn validation_error(domain: &str, message: String) -> Error {
    ValidationSnafu { domain, message }.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(label: &str, rtype: &str, content: &str) -> RecordConfig {
        RecordConfig::from_string(label, 300, rtype, content, "example.com").unwrap()
    }

    #[test]
    fn rules_only_apply_to_their_type() {
        let auditor = Auditor::new()
            .reject(RecordType::TXT, RejectIf::TxtHasMultipleStrings)
            .reject(RecordType::MX, RejectIf::MxNull);
        let records = vec![
            rec("@", "TXT", r#""a" "b""#),
            rec("@", "MX", "0 ."),
            rec("@", "A", "1.2.3.4"),
        ];
        let errors = auditor.audit(&records);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(Error::is_validation));
        assert_eq!(
            errors[0].to_string(),
            "example.com TXT: TXT records may only hold a single string"
        );
    }

    #[test]
    fn unsupported_types_are_reported_once() {
        let records = vec![rec("@", "CAA", "0 issue \"x\""), rec("www", "CAA", "0 issue \"y\"")];
        let errors = check_rtypes(&records, |rc| rc.rtype != RecordType::CAA);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().ends_with("CAA rtype is not supported"));
    }

    #[test]
    fn cname_must_be_alone() {
        let records = vec![rec("www", "CNAME", "@"), rec("www", "TXT", "x")];
        assert_eq!(check_labels("example.com", &records, false).len(), 1);
        let ok = vec![rec("www", "CNAME", "@"), rec("api", "A", "1.2.3.4")];
        assert!(check_labels("example.com", &ok, false).is_empty());
    }

    #[test]
    fn apex_rules() {
        assert_eq!(check_labels("example.com", &[rec("@", "CNAME", "other.net.")], false).len(), 1);
        let alias = rec("www", "ALIAS", "lb.example.net.");
        assert_eq!(check_labels("example.com", &[alias.clone()], false).len(), 1);
        assert!(check_labels("example.com", &[alias], true).is_empty());
    }
}
