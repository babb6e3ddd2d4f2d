//! Environment configuration.

use std::env;
use std::time::Duration;

use chat_api::{normalize_base_url, ChatApiConfig};
use thiserror::Error;

use crate::policy::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

pub const ENV_BASE_URL: &str = "CHAT_CLIENT_BASE_URL";
pub const ENV_API_KEY: &str = "CHAT_CLIENT_API_KEY";
pub const ENV_TIMEOUT_SEC: &str = "CHAT_CLIENT_TIMEOUT_SEC";
pub const ENV_MAX_ATTEMPTS: &str = "CHAT_CLIENT_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "CHAT_CLIENT_RETRY_BASE_MS";
pub const ENV_MODEL: &str = "CHAT_CLIENT_MODEL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be an integer, got {value:?}")]
    NotANumber { key: &'static str, value: String },

    #[error("{key} must be at least {min}, got {value}")]
    TooSmall {
        key: &'static str,
        min: u64,
        value: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub default_model: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: normalize_base_url(""),
            api_key: None,
            timeout: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base: DEFAULT_BASE_DELAY,
            default_model: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key).and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        let defaults = Self::default();
        let timeout = parse_u64(ENV_TIMEOUT_SEC, value(ENV_TIMEOUT_SEC), 1)?.map(Duration::from_secs);
        let max_attempts = parse_u64(ENV_MAX_ATTEMPTS, value(ENV_MAX_ATTEMPTS), 1)?
            .map(|attempts| u32::try_from(attempts).unwrap_or(u32::MAX))
            .unwrap_or(defaults.max_attempts);
        let retry_base = parse_u64(ENV_RETRY_BASE_MS, value(ENV_RETRY_BASE_MS), 0)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base);

        Ok(Self {
            base_url: normalize_base_url(value(ENV_BASE_URL).as_deref().unwrap_or_default()),
            api_key: value(ENV_API_KEY),
            timeout,
            max_attempts,
            retry_base,
            default_model: value(ENV_MODEL),
        })
    }

    pub fn api_config(&self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(&self.base_url);
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_base)
    }
}

fn parse_u64(key: &'static str, raw: Option<String>, min: u64) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let value = raw
        .parse::<u64>()
        .map_err(|_| ConfigError::NotANumber {
            key,
            value: raw.clone(),
        })?;
    if value < min {
        return Err(ConfigError::TooSmall { key, min, value });
    }

    Ok(Some(value))
}
