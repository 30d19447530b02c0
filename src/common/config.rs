use std::collections::BTreeMap;

use super::{ConfigSnafu, Result};

/// If the value begins with an '@', read the preceding file path,
/// otherwise returns the value.
///
/// prefix is used to provide context in case of an error.
pub(crate) fn key_file_or_string(value: String, prefix: String) -> Result<String> {
    Ok(match value.strip_prefix('@') {
        Some(key_file) => std::fs::read_to_string(key_file)
            .map_err(|err| {
                ConfigSnafu {
                    message: format!("Failed to read key from {key_file}: {err}"),
                    prefix,
                }
                .build()
            })?
            .trim()
            .into(),
        None => value,
    })
}

/// Fetches a required provider setting, resolving `@file` references.
pub(crate) fn required_setting(
    settings: &BTreeMap<String, String>,
    key: &str,
    prefix: &str,
) -> Result<String> {
    match settings.get(key) {
        Some(value) => key_file_or_string(value.clone(), format!("{prefix}.{key}")),
        None => ConfigSnafu {
            message: format!("missing required setting {key}"),
            prefix,
        }
        .fail(),
    }
}

/// Parses an optional numeric provider setting.
pub(crate) fn numeric_setting<T: std::str::FromStr>(
    settings: &BTreeMap<String, String>,
    key: &str,
    prefix: &str,
) -> Result<Option<T>> {
    match settings.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigSnafu {
                message: format!("{key} is not a valid number: {raw}"),
                prefix,
            }
            .build()
        }),
    }
}

/// Parses an optional boolean provider setting; absent is `false`.
pub(crate) fn bool_setting(settings: &BTreeMap<String, String>, key: &str, prefix: &str) -> Result<bool> {
    match settings.get(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(raw) => match raw.as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" | "" => Ok(false),
            _ => ConfigSnafu {
                message: format!("{key} must be true or false, not {raw:?}"),
                prefix,
            }
            .fail(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        let value = key_file_or_string("token".into(), "test".into()).unwrap();
        assert_eq!(value, "token");
    }

    #[test]
    fn at_prefix_reads_trimmed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "s3cret\n").unwrap();
        let value = key_file_or_string(format!("@{}", path.display()), "test".into()).unwrap();
        assert_eq!(value, "s3cret");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = key_file_or_string("@/nonexistent/zonesync".into(), "cf.api_token".into())
            .unwrap_err();
        assert!(err.to_string().starts_with("cf.api_token: Failed to read key"));
    }

    #[test]
    fn numeric_settings() {
        let mut settings = BTreeMap::new();
        settings.insert("min_ttl".to_string(), " 120 ".to_string());
        settings.insert("bad".to_string(), "abc".to_string());
        assert_eq!(numeric_setting::<u32>(&settings, "min_ttl", "p").unwrap(), Some(120));
        assert_eq!(numeric_setting::<u32>(&settings, "absent", "p").unwrap(), None);
        assert!(numeric_setting::<u32>(&settings, "bad", "p").is_err());
        assert!(required_setting(&settings, "api_token", "p").is_err());
    }

    #[test]
    fn bool_settings() {
        let mut settings = BTreeMap::new();
        settings.insert("a".to_string(), "True".to_string());
        settings.insert("b".to_string(), "off".to_string());
        settings.insert("c".to_string(), "maybe".to_string());
        assert!(bool_setting(&settings, "a", "p").unwrap());
        assert!(!bool_setting(&settings, "b", "p").unwrap());
        assert!(!bool_setting(&settings, "absent", "p").unwrap());
        let err = bool_setting(&settings, "c", "p").unwrap_err();
        assert_eq!(err.to_string(), "p: c must be true or false, not \"maybe\"");
    }
}
