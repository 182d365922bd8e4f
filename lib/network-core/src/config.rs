//! Reconciler configuration

use std::time::Duration;

use network_api::Tags;
use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::{NetworkError, Result};

/// Settings shared by every reconciliation pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Attempts for tag and attribute healing, including the first
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_backoff_multiplier: f64,
    /// Tags applied to every managed resource, beneath ownership and role
    pub additional_tags: Tags,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            retry_max_attempts: retry.max_attempts,
            retry_initial_delay_ms: retry.initial_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
            retry_backoff_multiplier: retry.backoff_multiplier,
            additional_tags: Tags::new(),
        }
    }
}

impl NetworkConfig {
    /// Load configuration from `NETWORK_*` environment variables, falling
    /// back to defaults for unset ones
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("NETWORK_RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = parse("NETWORK_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("NETWORK_RETRY_INITIAL_DELAY_MS") {
            config.retry_initial_delay_ms = parse("NETWORK_RETRY_INITIAL_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("NETWORK_RETRY_MAX_DELAY_MS") {
            config.retry_max_delay_ms = parse("NETWORK_RETRY_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("NETWORK_RETRY_BACKOFF_MULTIPLIER") {
            config.retry_backoff_multiplier = parse("NETWORK_RETRY_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = lookup("NETWORK_ADDITIONAL_TAGS") {
            config.additional_tags = serde_json::from_str(&value).map_err(|e| {
                NetworkError::InvalidConfiguration(format!(
                    "NETWORK_ADDITIONAL_TAGS must be a JSON object of strings: {}",
                    e
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_max_attempts == 0 {
            return Err(NetworkError::InvalidConfiguration(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if self.retry_backoff_multiplier < 1.0 {
            return Err(NetworkError::InvalidConfiguration(format!(
                "retry backoff multiplier must be >= 1.0, got {}",
                self.retry_backoff_multiplier
            )));
        }
        Ok(())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        NetworkError::InvalidConfiguration(format!("{} has invalid value {:?}", key, value))
    })
}
