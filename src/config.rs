//! Process-wide application settings.
//!
//! Read once at startup and frozen into the shared
//! [`Application`](crate::Application). `Config` derives serde so a host can
//! load it from whatever format it already uses. [`Config::from_env`] covers
//! the common twelve-factor case:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `APP_ENV` | `env` | `development` |
//! | `APP_PROXY` | `proxy` | `false` |
//! | `APP_SUBDOMAIN_OFFSET` | `subdomain_offset` | `2` |
//! | `APP_PROXY_IP_HEADER` | `proxy_ip_header` | `X-Forwarded-For` |
//! | `APP_MAX_IPS_COUNT` | `max_ips_count` | `0` (unlimited) |
//! | `APP_KEYS` | `keys` (comma-separated) | none |
//! | `APP_SILENT` | `silent` | `false` |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment name, e.g. `development` or `production`.
    pub env: String,
    /// Trust proxy headers (`X-Forwarded-*`).
    pub proxy: bool,
    /// Number of trailing host labels that are not subdomains.
    pub subdomain_offset: usize,
    /// Header carrying the client address chain when `proxy` is set.
    pub proxy_ip_header: String,
    /// Maximum addresses read from `proxy_ip_header`. 0 means no limit.
    pub max_ips_count: usize,
    /// Cookie signing keys.
    #[serde(skip_serializing)]
    pub keys: Vec<String>,
    /// Suppress the default error listener's output.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: "development".to_owned(),
            proxy: false,
            subdomain_offset: 2,
            proxy_ip_header: "X-Forwarded-For".to_owned(),
            max_ips_count: 0,
            keys: Vec::new(),
            silent: false,
        }
    }
}

impl Config {
    /// Reads the `APP_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(env) = lookup("APP_ENV") {
            config.env = env;
        }
        if let Some(v) = lookup("APP_PROXY") {
            config.proxy = parse_bool("APP_PROXY", &v)?;
        }
        if let Some(v) = lookup("APP_SUBDOMAIN_OFFSET") {
            config.subdomain_offset = parse("APP_SUBDOMAIN_OFFSET", &v)?;
        }
        if let Some(v) = lookup("APP_PROXY_IP_HEADER") {
            config.proxy_ip_header = v;
        }
        if let Some(v) = lookup("APP_MAX_IPS_COUNT") {
            config.max_ips_count = parse("APP_MAX_IPS_COUNT", &v)?;
        }
        if let Some(v) = lookup("APP_KEYS") {
            config.keys = v
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = lookup("APP_SILENT") {
            config.silent = parse_bool("APP_SILENT", &v)?;
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse `{value}`")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got `{value}`"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.subdomain_offset, 2);
        assert_eq!(config.env, "development");
    }

    #[test]
    fn reads_variables() {
        let config = Config::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("APP_PROXY", "true"),
            ("APP_MAX_IPS_COUNT", "3"),
            ("APP_KEYS", "k1, k2,"),
            ("APP_SILENT", "1"),
        ]))
        .unwrap();
        assert_eq!(config.env, "production");
        assert!(config.proxy);
        assert_eq!(config.max_ips_count, 3);
        assert_eq!(config.keys, ["k1", "k2"]);
        assert!(config.silent);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = Config::from_lookup(lookup(&[("APP_PROXY", "maybe")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_lookup(lookup(&[("APP_SUBDOMAIN_OFFSET", "-1")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"env":"test","proxy":true}"#).unwrap();
        assert_eq!(config.env, "test");
        assert!(config.proxy);
        assert_eq!(config.proxy_ip_header, "X-Forwarded-For");
    }
}
