//! Purpose: Read psqlx settings from the environment.
//! Exports: `Config`, `AiConfig`, default constants.
//! Role: Single source of tunables for the hook, the built-in AI plugin and the CLI.
//! Invariants: Missing variables fall back to defaults; malformed ones are `Usage` errors.
//! Invariants: Lookups go through a closure so tests never touch the process environment.
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Url,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_AI_MODEL.to_string(),
            base_url: default_base_url(),
            timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Overrides the platform plugin directory.
    pub plugin_dir: Option<PathBuf>,
    /// `tracing` filter directives, e.g. `debug` or `psqlx=trace`.
    pub log_filter: Option<String>,
    pub ai: AiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut ai = AiConfig {
            api_key: get("OPENAI_API_KEY"),
            ..AiConfig::default()
        };
        if let Some(model) = get("PSQLX_AI_MODEL") {
            ai.model = model;
        }
        if let Some(raw) = get("PSQLX_AI_BASE_URL") {
            ai.base_url = parse_base_url(&raw)?;
        }
        if let Some(raw) = get("PSQLX_AI_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid PSQLX_AI_TIMEOUT_SECS `{raw}`"))
                    .with_hint("Use a whole number of seconds, e.g. 60.")
            })?;
            ai.timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            plugin_dir: get("PSQLX_PLUGIN_DIR").map(PathBuf::from),
            log_filter: get("PSQLX_LOG"),
            ai,
        })
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_AI_BASE_URL).expect("default base url is valid")
}

fn parse_base_url(raw: &str) -> Result<Url, Error> {
    let url = Url::parse(raw.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid PSQLX_AI_BASE_URL `{raw}`"))
            .with_hint("Use an absolute URL such as https://api.openai.com/v1.")
            .with_source(err)
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unsupported PSQLX_AI_BASE_URL scheme `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_AI_MODEL};
    use crate::core::error::ErrorKind;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, crate::core::error::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("config");
        assert_eq!(config, Config::default());
        assert_eq!(config.ai.model, DEFAULT_AI_MODEL);
        assert_eq!(config.ai.base_url.as_str(), "https://api.openai.com/v1");
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("PSQLX_PLUGIN_DIR", "/opt/psqlx/plugins"),
            ("PSQLX_LOG", "debug"),
            ("OPENAI_API_KEY", "sk-test"),
            ("PSQLX_AI_MODEL", "gpt-4o"),
            ("PSQLX_AI_BASE_URL", "http://localhost:8080/v1"),
            ("PSQLX_AI_TIMEOUT_SECS", "5"),
        ])
        .expect("config");
        assert_eq!(config.plugin_dir, Some(PathBuf::from("/opt/psqlx/plugins")));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.ai.model, "gpt-4o");
        assert_eq!(config.ai.base_url.as_str(), "http://localhost:8080/v1");
        assert_eq!(config.ai.timeout, Duration::from_secs(5));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("OPENAI_API_KEY", "  ")]).expect("config");
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn malformed_values_are_usage_errors() {
        let err = config_from(&[("PSQLX_AI_BASE_URL", "not a url")]).expect_err("url");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = config_from(&[("PSQLX_AI_BASE_URL", "ftp://example.com")]).expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = config_from(&[("PSQLX_AI_TIMEOUT_SECS", "soon")]).expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
    }
}
