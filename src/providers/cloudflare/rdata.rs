//! The `data` objects Cloudflare uses for record types with structured
//! RDATA, and the LOC presentation format they are compared in.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};
use snafu::OptionExt;

use crate::common::{Error, RecordSnafu, Result};
use crate::models::{RecordConfig, RecordType};

/// Record types whose RDATA travels in `data` rather than `content`.
pub(super) fn uses_data(rtype: &RecordType) -> bool {
    matches!(
        rtype,
        RecordType::SRV
            | RecordType::CAA
            | RecordType::TLSA
            | RecordType::SSHFP
            | RecordType::DS
            | RecordType::DNSKEY
            | RecordType::NAPTR
            | RecordType::LOC
            | RecordType::HTTPS
            | RecordType::SVCB
    )
}

fn field<'d>(data: &'d Value, key: &str) -> Result<&'d Value> {
    data.get(key).context(RecordSnafu {
        message: format!("Cloudflare data has no {key}"),
    })
}

fn number<T: TryFrom<u64>>(data: &Value, key: &str) -> Result<T> {
    let raw = field(data, key)?;
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
        .and_then(|n| T::try_from(n).ok())
        .context(RecordSnafu {
            message: format!("Cloudflare data {key} is not a valid number: {raw}"),
        })
}

fn float(data: &Value, key: &str) -> Result<f64> {
    let raw = field(data, key)?;
    raw.as_f64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
        .context(RecordSnafu {
            message: format!("Cloudflare data {key} is not a number: {raw}"),
        })
}

fn text(data: &Value, key: &str) -> Result<String> {
    let raw = field(data, key)?;
    raw.as_str().map(str::to_string).context(RecordSnafu {
        message: format!("Cloudflare data {key} is not a string: {raw}"),
    })
}

pub(super) fn fqdn(host: &str) -> String {
    if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    }
}

/// A host name the way the API wants it. The root stays `.`.
pub(super) fn api_host(host: &str) -> String {
    if host == "." {
        host.to_string()
    } else {
        host.trim_end_matches('.').to_string()
    }
}

/// SvcParams with the quotes around values removed, which is the form
/// zone files are read into. `alpn="h2,h3"` becomes `alpn=h2,h3`.
pub(super) fn unquote_params(params: &str) -> String {
    params
        .split_whitespace()
        .map(|param| match param.split_once('=') {
            Some((key, value)) => format!("{key}={}", value.trim_matches('"')),
            None => param.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fills `rc` from the `data` object of an API record.
pub(super) fn apply_data(rc: &mut RecordConfig, data: &Value) -> Result<()> {
    let rtype = rc.rtype.clone();
    match rtype {
        RecordType::SRV => rc.set_target_srv(
            number(data, "priority")?,
            number(data, "weight")?,
            number(data, "port")?,
            fqdn(&text(data, "target")?),
        ),
        RecordType::CAA => rc.set_target_caa(number(data, "flags")?, text(data, "tag")?, text(data, "value")?),
        RecordType::TLSA => rc.set_target_tlsa(
            number(data, "usage")?,
            number(data, "selector")?,
            number(data, "matching_type")?,
            text(data, "certificate")?.to_ascii_lowercase(),
        ),
        RecordType::SSHFP => rc.set_target_sshfp(
            number(data, "algorithm")?,
            number(data, "type")?,
            text(data, "fingerprint")?.to_ascii_lowercase(),
        ),
        RecordType::DS => rc.set_target_ds(
            number(data, "key_tag")?,
            number(data, "algorithm")?,
            number(data, "digest_type")?,
            text(data, "digest")?.to_ascii_lowercase(),
        ),
        RecordType::DNSKEY => rc.set_target_dnskey(
            number(data, "flags")?,
            number(data, "protocol")?,
            number(data, "algorithm")?,
            text(data, "public_key")?,
        ),
        RecordType::NAPTR => rc.set_target_naptr(
            number(data, "order")?,
            number(data, "preference")?,
            text(data, "flags")?,
            text(data, "service")?,
            text(data, "regex")?,
            fqdn(&text(data, "replacement")?),
        ),
        RecordType::LOC => rc.set_target(Loc::from_data(data)?.to_string()),
        RecordType::HTTPS | RecordType::SVCB => rc.set_target_svcb(
            number(data, "priority")?,
            fqdn(&text(data, "target")?),
            unquote_params(&text(data, "value").unwrap_or_default()),
        ),
        other => {
            return RecordSnafu {
                message: format!("Cloudflare does not send data for {other} records"),
            }
            .fail()
        }
    }
    Ok(())
}

/// The `data` object for a record of a type in [`uses_data`].
pub(super) fn to_data(rc: &RecordConfig) -> Result<Value> {
    Ok(match rc.rtype {
        RecordType::SRV => json!({
            "priority": rc.srv_priority,
            "weight": rc.srv_weight,
            "port": rc.srv_port,
            "target": api_host(rc.target()),
        }),
        RecordType::CAA => json!({
            "flags": rc.caa_flag,
            "tag": rc.caa_tag,
            "value": rc.target(),
        }),
        RecordType::TLSA => json!({
            "usage": rc.tlsa_usage,
            "selector": rc.tlsa_selector,
            "matching_type": rc.tlsa_matching_type,
            "certificate": rc.target(),
        }),
        RecordType::SSHFP => json!({
            "algorithm": rc.sshfp_algorithm,
            "type": rc.sshfp_fingerprint,
            "fingerprint": rc.target(),
        }),
        RecordType::DS => json!({
            "key_tag": rc.ds_key_tag,
            "algorithm": rc.ds_algorithm,
            "digest_type": rc.ds_digest_type,
            "digest": rc.ds_digest,
        }),
        RecordType::DNSKEY => json!({
            "flags": rc.dnskey_flags,
            "protocol": rc.dnskey_protocol,
            "algorithm": rc.dnskey_algorithm,
            "public_key": rc.target(),
        }),
        RecordType::NAPTR => json!({
            "order": rc.naptr_order,
            "preference": rc.naptr_preference,
            "flags": rc.naptr_flags,
            "service": rc.naptr_service,
            "regex": rc.naptr_regexp,
            "replacement": api_host(rc.target()),
        }),
        RecordType::LOC => rc.target().parse::<Loc>()?.to_data(),
        RecordType::HTTPS | RecordType::SVCB => json!({
            "priority": rc.svc_priority,
            "target": api_host(rc.target()),
            "value": rc.svc_params,
        }),
        ref other => {
            return RecordSnafu {
                message: format!("{other} records have no Cloudflare data form"),
            }
            .fail()
        }
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Coordinate {
    degrees: u32,
    minutes: u32,
    seconds: f64,
    direction: char,
}

/// A LOC record (RFC 1876). Sizes and precisions are in metres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Loc {
    latitude: Coordinate,
    longitude: Coordinate,
    altitude: f64,
    size: f64,
    precision_horz: f64,
    precision_vert: f64,
}

fn loc_error(message: impl Into<String>) -> Error {
    RecordSnafu {
        message: format!("LOC: {}", message.into()),
    }
    .build()
}

fn coordinate(fields: &mut std::slice::Iter<'_, &str>, directions: [char; 2], max: u32) -> Result<Coordinate> {
    let mut parts: Vec<&str> = Vec::new();
    let direction = loop {
        let field = fields.next().ok_or_else(|| loc_error("ends before a direction"))?;
        let mut chars = field.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            let c = c.to_ascii_uppercase();
            if directions.contains(&c) {
                break c;
            }
        }
        if parts.len() == 3 {
            return Err(loc_error(format!("expected {} or {}, got {field}", directions[0], directions[1])));
        }
        parts.push(field);
    };
    let degrees: u32 = parts
        .first()
        .ok_or_else(|| loc_error("missing degrees"))?
        .parse()
        .map_err(|_| loc_error(format!("invalid degrees {:?}", parts[0])))?;
    let minutes: u32 = match parts.get(1) {
        Some(m) => m.parse().map_err(|_| loc_error(format!("invalid minutes {m:?}")))?,
        None => 0,
    };
    let seconds: f64 = match parts.get(2) {
        Some(s) => s.parse().map_err(|_| loc_error(format!("invalid seconds {s:?}")))?,
        None => 0.0,
    };
    if degrees > max || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(loc_error(format!("{} is out of range", parts.join(" "))));
    }
    Ok(Coordinate {
        degrees,
        minutes,
        seconds,
        direction,
    })
}

fn metres(field: &str) -> Result<f64> {
    field
        .strip_suffix(|c| c == 'm' || c == 'M')
        .unwrap_or(field)
        .parse::<f64>()
        .map_err(|_| loc_error(format!("invalid distance {field:?}")))
}

impl FromStr for Loc {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let mut iter = fields.iter();
        let latitude = coordinate(&mut iter, ['N', 'S'], 90)?;
        let longitude = coordinate(&mut iter, ['E', 'W'], 180)?;
        let distances = iter.map(|f| metres(f)).collect::<Result<Vec<f64>>>()?;
        let altitude = *distances.first().ok_or_else(|| loc_error("missing altitude"))?;
        if distances.len() > 4 {
            return Err(loc_error("too many fields"));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude,
            size: distances.get(1).copied().unwrap_or(1.0),
            precision_horz: distances.get(2).copied().unwrap_or(10000.0),
            precision_vert: distances.get(3).copied().unwrap_or(10.0),
        })
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in [self.latitude, self.longitude] {
            write!(f, "{} {} {:.3} {} ", c.degrees, c.minutes, c.seconds, c.direction)?;
        }
        write!(
            f,
            "{:.2}m {:.2}m {:.2}m {:.2}m",
            self.altitude, self.size, self.precision_horz, self.precision_vert
        )
    }
}

impl Loc {
    fn from_data(data: &Value) -> Result<Self> {
        let direction = |key: &str| -> Result<char> {
            text(data, key)?
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase())
                .ok_or_else(|| loc_error(format!("{key} is empty")))
        };
        Ok(Self {
            latitude: Coordinate {
                degrees: number(data, "lat_degrees")?,
                minutes: number(data, "lat_minutes")?,
                seconds: float(data, "lat_seconds")?,
                direction: direction("lat_direction")?,
            },
            longitude: Coordinate {
                degrees: number(data, "long_degrees")?,
                minutes: number(data, "long_minutes")?,
                seconds: float(data, "long_seconds")?,
                direction: direction("long_direction")?,
            },
            altitude: float(data, "altitude")?,
            size: float(data, "size")?,
            precision_horz: float(data, "precision_horz")?,
            precision_vert: float(data, "precision_vert")?,
        })
    }

    fn to_data(self) -> Value {
        json!({
            "lat_degrees": self.latitude.degrees,
            "lat_minutes": self.latitude.minutes,
            "lat_seconds": self.latitude.seconds,
            "lat_direction": self.latitude.direction.to_string(),
            "long_degrees": self.longitude.degrees,
            "long_minutes": self.longitude.minutes,
            "long_seconds": self.longitude.seconds,
            "long_direction": self.longitude.direction.to_string(),
            "altitude": self.altitude,
            "size": self.size,
            "precision_horz": self.precision_horz,
            "precision_vert": self.precision_vert,
        })
    }
}

/// The canonical presentation of a LOC target, so that records written
/// by hand compare equal to what the API returns.
pub(super) fn canonical_loc(target: &str) -> Result<String> {
    Ok(target.parse::<Loc>()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(rtype: &str, content: &str) -> RecordConfig {
        RecordConfig::from_string("@", 300, rtype, content, "example.com").unwrap()
    }

    fn through_data(rc: &RecordConfig) -> RecordConfig {
        let data = to_data(rc).unwrap();
        let mut back = RecordConfig::new(rc.rtype.clone(), "example.com");
        apply_data(&mut back, &data).unwrap();
        back
    }

    #[test]
    fn structured_types_keep_their_fields() {
        for (rtype, content) in [
            ("SRV", "10 5 5060 sip.example.com."),
            ("CAA", "0 issuewild \"letsencrypt.org\""),
            ("TLSA", "3 1 1 0c72ac70b745ac19998811b131d662c9"),
            ("SSHFP", "4 2 123456789abcdef67890123456789abcdef67890"),
            ("DS", "60485 5 1 2bb183af5f22588179a53b0a98631fad1a292118"),
            ("DNSKEY", "257 3 13 mdsswUyr3DPW132mOi8V9xESWE8jTo0dxCjjnopKl+GqJxpVXckHAeF+KkxLbxILfDLUT0rAK9iUzy1L53eKGQ=="),
            ("NAPTR", "100 10 \"U\" \"E2U+sip\" \"!^.*$!sip:info@example.com!\" ."),
            ("HTTPS", "1 . alpn=h2,h3"),
            ("SVCB", "16 svc.example.net. port=8443"),
        ] {
            let rc = rec(rtype, content);
            assert_eq!(through_data(&rc).target_combined(), rc.target_combined(), "{rtype}");
        }
    }

    #[test]
    fn api_shapes() {
        let srv = to_data(&rec("SRV", "10 5 5060 sip.example.com.")).unwrap();
        assert_eq!(srv, json!({"priority": 10, "weight": 5, "port": 5060, "target": "sip.example.com"}));
        let https = to_data(&rec("HTTPS", "1 . alpn=h2")).unwrap();
        assert_eq!(https["target"], ".");
        let naptr = to_data(&rec("NAPTR", "100 10 \"S\" \"SIP+D2U\" \"\" _sip._udp")).unwrap();
        assert_eq!(naptr["replacement"], "_sip._udp.example.com");
        assert_eq!(naptr["regex"], "");
    }

    #[test]
    fn api_values_are_normalized() {
        let mut rc = RecordConfig::new(RecordType::HTTPS, "example.com");
        apply_data(&mut rc, &json!({"priority": "1", "target": ".", "value": "alpn=\"h3,h2\" port=\"443\""})).unwrap();
        assert_eq!(rc.target_combined(), "1 . alpn=h3,h2 port=443");

        let mut rc = RecordConfig::new(RecordType::TLSA, "example.com");
        apply_data(&mut rc, &json!({"usage": 3, "selector": 1, "matching_type": 1, "certificate": "ABCD"})).unwrap();
        assert_eq!(rc.target(), "abcd");

        let mut rc = RecordConfig::new(RecordType::SRV, "example.com");
        let err = apply_data(&mut rc, &json!({"priority": 70000, "weight": 0, "port": 1, "target": "x"})).unwrap_err();
        assert!(err.to_string().contains("priority is not a valid number"), "{err}");
        assert!(apply_data(&mut rc, &json!({"weight": 0})).is_err());
    }

    #[test]
    fn loc_defaults_and_canonical_form() {
        assert_eq!(
            canonical_loc("52 22 23 N 4 53 32 E -2m").unwrap(),
            "52 22 23.000 N 4 53 32.000 E -2.00m 1.00m 10000.00m 10.00m"
        );
        assert_eq!(
            canonical_loc("42 s 71 W 0").unwrap(),
            "42 0 0.000 S 71 0 0.000 W 0.00m 1.00m 10000.00m 10.00m"
        );
        let full = "52 22 23.000 N 4 53 32.000 E -2.00m 0.00m 10000.00m 10.00m";
        assert_eq!(canonical_loc(full).unwrap(), full);
    }

    #[test]
    fn loc_travels_as_data() {
        let rc = rec("LOC", "51 30 12.748 N 0 7 39.611 W 0.00m 0.00m 0.00m 0.00m");
        let data = to_data(&rc).unwrap();
        assert_eq!(data["lat_degrees"], 51);
        assert_eq!(data["long_direction"], "W");
        assert_eq!(through_data(&rc).target(), rc.target());
    }

    #[test]
    fn bad_loc_is_rejected() {
        for bad in ["91 N 0 E 0m", "10 61 N 0 E 0m", "10 N 0 E", "10 N 0 X 0m", "10 N 0 E 1m 2m 3m 4m 5m", "x N 0 E 0"] {
            assert!(canonical_loc(bad).is_err(), "{bad}");
        }
    }
}
