//! Ordering used when writing zones, so that output is stable and easy on
//! the eyes regardless of the order records were fetched in.

use std::cmp::Ordering;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::models::{RecordConfig, RecordType};

/// Compares two short zone labels.
///
/// `@` sorts first, then `*`. Other labels are compared component by
/// component starting from the right; at each level `*` is smallest,
/// numeric components come before other ones and compare as integers,
/// and the remaining components compare as strings. When one label is a
/// suffix of the other, the shorter one sorts first.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a, b) {
        ("@", _) => return Ordering::Less,
        (_, "@") => return Ordering::Greater,
        _ => {}
    }
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    for (x, y) in left.iter().rev().zip(right.iter().rev()) {
        if x != y {
            return compare_components(x, y);
        }
    }
    left.len().cmp(&right.len())
}

/// `labelLess`: true when `a` sorts strictly before `b`.
pub fn label_less(a: &str, b: &str) -> bool {
    compare_labels(a, b) == Ordering::Less
}

fn compare_components(x: &str, y: &str) -> Ordering {
    match (x, y) {
        ("*", _) => return Ordering::Less,
        (_, "*") => return Ordering::Greater,
        _ => {}
    }
    match (x.parse::<u64>(), y.parse::<u64>()) {
        (Ok(nx), Ok(ny)) => nx.cmp(&ny).then_with(|| x.cmp(y)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => x.cmp(y),
    }
}

fn type_rank(rtype: &RecordType) -> u8 {
    match rtype {
        RecordType::SOA => 0,
        RecordType::NS => 1,
        _ => 2,
    }
}

/// Compares two record types: SOA first, NS second, the rest by name.
pub fn compare_types(a: &RecordType, b: &RecordType) -> Ordering {
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| a.as_str().cmp(b.as_str()))
}

/// Compares the RDATA of two records of the same type.
pub fn compare_rdata(a: &RecordConfig, b: &RecordConfig) -> Ordering {
    let by_type = match a.rtype {
        RecordType::A => match (a.target().parse::<Ipv4Addr>(), b.target().parse::<Ipv4Addr>()) {
            (Ok(x), Ok(y)) => x.octets().cmp(&y.octets()),
            _ => a.target().cmp(b.target()),
        },
        RecordType::AAAA => match (a.target().parse::<Ipv6Addr>(), b.target().parse::<Ipv6Addr>()) {
            (Ok(x), Ok(y)) => x.octets().cmp(&y.octets()),
            _ => a.target().cmp(b.target()),
        },
        RecordType::MX => a
            .mx_preference
            .cmp(&b.mx_preference)
            .then_with(|| a.target().cmp(b.target())),
        RecordType::SRV => a
            .srv_port
            .cmp(&b.srv_port)
            .then_with(|| a.srv_priority.cmp(&b.srv_priority))
            .then_with(|| a.srv_weight.cmp(&b.srv_weight))
            .then_with(|| a.target().cmp(b.target())),
        RecordType::PTR => a.target().cmp(b.target()),
        RecordType::CAA => a
            .caa_tag
            .cmp(&b.caa_tag)
            .then_with(|| b.caa_flag.cmp(&a.caa_flag))
            .then_with(|| a.target().cmp(b.target())),
        _ => a.target_combined().cmp(&b.target_combined()),
    };
    by_type
        .then_with(|| a.target_combined().cmp(&b.target_combined()))
        .then_with(|| a.ttl.cmp(&b.ttl))
        .then_with(|| a.metadata.cmp(&b.metadata))
}

/// Full ordering of records within one zone: label, type, then RDATA.
pub fn compare_records(a: &RecordConfig, b: &RecordConfig) -> Ordering {
    compare_labels(a.name(), b.name())
        .then_with(|| compare_types(&a.rtype, &b.rtype))
        .then_with(|| compare_rdata(a, b))
}

/// Sorts records into zone file order.
pub fn sort_records(records: &mut [RecordConfig]) {
    records.sort_by(compare_records);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Records;

    const ORDERED: [&str; 17] = [
        "@", "*", "foo", "bar.foo", "hip.foo", "mup", "a.mup", "bzt.mup", "*.bzt.mup", "1.bzt.mup",
        "2.bzt.mup", "10.bzt.mup", "aaa.bzt.mup", "zzz.bzt.mup", "nnn.mup", "zt.mup", "zap",
    ];

    #[test]
    fn labels_follow_the_natural_order() {
        for (i, a) in ORDERED.iter().enumerate() {
            for (j, b) in ORDERED.iter().enumerate() {
                assert_eq!(label_less(a, b), i < j, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn label_order_is_a_strict_total_order() {
        let labels = [
            "@", "*", "2", "10", "010", "1a", "a", "b.a", "*.a", "9.a", "_dmarc", "x-y", "a.b.c",
        ];
        for a in labels {
            assert!(!label_less(a, a));
            for b in labels {
                if a != b {
                    assert_ne!(label_less(a, b), label_less(b, a), "{a} vs {b}");
                }
                for c in labels {
                    if label_less(a, b) && label_less(b, c) {
                        assert!(label_less(a, c), "{a} < {b} < {c}");
                    }
                }
            }
        }
    }

    fn rec(label: &str, rtype: &str, content: &str) -> RecordConfig {
        RecordConfig::from_string(label, 300, rtype, content, "example.com").unwrap()
    }

    #[test]
    fn types_within_a_label() {
        let mut records: Records = vec![
            rec("@", "TXT", "x"),
            rec("@", "A", "1.1.1.1"),
            rec("@", "NS", "ns1."),
            rec("@", "SOA", "ns1. admin. 1 2 3 4 5"),
            rec("@", "CAA", "0 issue \"x\""),
        ]
        .into();
        sort_records(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.rtype.as_str()).collect();
        assert_eq!(order, vec!["SOA", "NS", "A", "CAA", "TXT"]);
    }

    #[test]
    fn addresses_sort_numerically() {
        let mut records: Records = vec![
            rec("@", "A", "10.0.0.1"),
            rec("@", "A", "9.0.0.1"),
            rec("@", "A", "10.0.0.10"),
            rec("@", "AAAA", "2001:db8::10"),
            rec("@", "AAAA", "2001:db8::9"),
        ]
        .into();
        sort_records(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.target()).collect();
        assert_eq!(order, vec!["9.0.0.1", "10.0.0.1", "10.0.0.10", "2001:db8::9", "2001:db8::10"]);
    }

    #[test]
    fn srv_sorts_by_port_then_priority_then_weight() {
        let mut records: Records = vec![
            rec("_sip._tcp", "SRV", "10 5 5061 b."),
            rec("_sip._tcp", "SRV", "20 5 5060 a."),
            rec("_sip._tcp", "SRV", "10 9 5060 a."),
            rec("_sip._tcp", "SRV", "10 1 5060 a."),
        ]
        .into();
        sort_records(&mut records);
        let order: Vec<String> = records.iter().map(|r| r.target_combined()).collect();
        assert_eq!(
            order,
            vec!["10 1 5060 a.", "10 9 5060 a.", "20 5 5060 a.", "10 5 5061 b."]
        );
    }
}
