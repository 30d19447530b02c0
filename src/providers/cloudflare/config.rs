use crate::common::{bool_setting, required_setting, Result};
use crate::providers::Settings;

#[derive(Clone, Default)]
pub struct Config {
    pub api_token: String,
    /// Needed to list and create zones.
    pub account_id: Option<String>,
    /// Manage forwarding page rules as `CF_REDIRECT` and
    /// `CF_TEMP_REDIRECT` records.
    pub manage_redirects: bool,
    /// Manage worker routes as `CF_WORKER_ROUTE` records.
    pub manage_workers: bool,
}

impl Config {
    pub fn from_settings(name: &str, settings: &Settings) -> Result<Self> {
        Ok(Self {
            api_token: required_setting(settings, "api_token", name)?,
            account_id: settings.get("account_id").filter(|id| !id.is_empty()).cloned(),
            manage_redirects: bool_setting(settings, "manage_redirects", name)?,
            manage_workers: bool_setting(settings, "manage_workers", name)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_required() {
        let mut settings = Settings::new();
        assert!(Config::from_settings("cf", &settings).is_err());
        settings.insert("api_token".into(), "abc".into());
        settings.insert("account_id".into(), "".into());
        let config = Config::from_settings("cf", &settings).unwrap();
        assert_eq!(config.api_token, "abc");
        assert_eq!(config.account_id, None);
        assert!(!config.manage_redirects);
        assert!(!config.manage_workers);
    }

    #[test]
    fn rule_management_is_opt_in() {
        let mut settings = Settings::new();
        settings.insert("api_token".into(), "abc".into());
        settings.insert("manage_redirects".into(), "true".into());
        settings.insert("manage_workers".into(), "yes".into());
        let config = Config::from_settings("cf", &settings).unwrap();
        assert!(config.manage_redirects);
        assert!(config.manage_workers);

        settings.insert("manage_workers".into(), "sometimes".into());
        assert!(Config::from_settings("cf", &settings).is_err());
    }
}
