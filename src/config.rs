//! Runtime configuration read from `FINDER_*` environment variables.

use crate::wallet::sync::channel::ReconnectPolicy;

use std::time::Duration;
use thiserror::Error;

/// Upper bound on the exponential reconnect delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// How live updates are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LiveMode {
    /// Server-Sent Events subscription
    #[default]
    Push,
    /// Periodic re-fetch of the REST endpoints
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub live_mode: LiveMode,
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub wallet_limit: u32,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8888".to_string(),
            live_mode: LiveMode::Push,
            poll_interval: Duration::from_millis(5000),
            reconnect: ReconnectPolicy::default(),
            wallet_limit: 20,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source. Unset or blank variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Config::default();

        if let Some(url) = var("FINDER_API_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid("FINDER_API_URL", url, "expected an http(s) URL"));
            }
            config.api_url = url;
        }

        if let Some(mode) = var("FINDER_LIVE_MODE") {
            config.live_mode = match mode.to_ascii_lowercase().as_str() {
                "push" => LiveMode::Push,
                "poll" => LiveMode::Poll,
                _ => return Err(invalid("FINDER_LIVE_MODE", mode, "expected push or poll")),
            };
        }

        if let Some(raw) = var("FINDER_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(positive("FINDER_POLL_INTERVAL_MS", raw)?);
        }

        let delay = match var("FINDER_RECONNECT_DELAY_MS") {
            Some(raw) => Duration::from_millis(positive("FINDER_RECONNECT_DELAY_MS", raw)?),
            None => Duration::from_millis(5000),
        };
        let policy = var("FINDER_RECONNECT_POLICY").unwrap_or_else(|| "fixed".to_string());
        config.reconnect = match policy.to_ascii_lowercase().as_str() {
            "fixed" => ReconnectPolicy::Fixed(delay),
            "exponential" => ReconnectPolicy::Exponential {
                initial: delay,
                max: delay.max(MAX_RECONNECT_DELAY),
            },
            _ => {
                return Err(invalid(
                    "FINDER_RECONNECT_POLICY",
                    policy,
                    "expected fixed or exponential",
                ));
            }
        };

        if let Some(raw) = var("FINDER_WALLET_LIMIT") {
            let limit = positive("FINDER_WALLET_LIMIT", raw)?;
            config.wallet_limit = limit.min(crate::api::MAX_WALLET_LIMIT as u64) as u32;
        }

        if let Some(raw) = var("FINDER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(positive("FINDER_REQUEST_TIMEOUT_SECS", raw)?);
        }

        Ok(config)
    }
}

fn invalid(name: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value,
        reason,
    }
}

fn positive(name: &'static str, raw: String) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(invalid(name, raw, "must be greater than zero")),
        Ok(value) => Ok(value),
        Err(_) => Err(invalid(name, raw, "expected a whole number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(load(&[]).unwrap(), Config::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = load(&[
            ("FINDER_API_URL", "https://finder.example.com/"),
            ("FINDER_LIVE_MODE", "Poll"),
            ("FINDER_POLL_INTERVAL_MS", "2500"),
            ("FINDER_RECONNECT_DELAY_MS", "1000"),
            ("FINDER_RECONNECT_POLICY", "exponential"),
            ("FINDER_WALLET_LIMIT", "500"),
            ("FINDER_REQUEST_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "https://finder.example.com/");
        assert_eq!(config.live_mode, LiveMode::Poll);
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(60)
            }
        );
        assert_eq!(config.wallet_limit, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config = load(&[("FINDER_LIVE_MODE", "  "), ("FINDER_WALLET_LIMIT", "")]).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            load(&[("FINDER_LIVE_MODE", "websocket")]),
            Err(ConfigError::InvalidValue {
                name: "FINDER_LIVE_MODE",
                ..
            })
        ));
        assert!(load(&[("FINDER_POLL_INTERVAL_MS", "0")]).is_err());
        assert!(load(&[("FINDER_WALLET_LIMIT", "-3")]).is_err());
        assert!(load(&[("FINDER_RECONNECT_POLICY", "linear")]).is_err());
        assert!(load(&[("FINDER_API_URL", "localhost:8888")]).is_err());
    }
}
