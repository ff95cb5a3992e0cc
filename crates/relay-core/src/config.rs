//! Orchestrator configuration.
//!
//! Defaults come from each policy's `Default`; a JSON file may override any
//! subset of fields, and `RELAY_*` environment variables override both.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{RelayError, Result};
use crate::policy::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl OrchestratorConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded orchestrator config");
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `RELAY_*` overrides read through `lookup`, then validate.
    ///
    /// Reads:
    /// - RELAY_RATE_LIMIT_MAX, RELAY_RATE_WINDOW_MS
    /// - RELAY_BREAKER_THRESHOLD, RELAY_BREAKER_COOLDOWN_MS
    /// - RELAY_RETRY_MAX_ATTEMPTS, RELAY_RETRY_BASE_DELAY_MS, RELAY_RETRY_OPEN_CIRCUIT
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "RELAY_RATE_LIMIT_MAX", &mut self.rate_limit.max_requests)?;
        override_from(&lookup, "RELAY_RATE_WINDOW_MS", &mut self.rate_limit.window_ms)?;
        override_from(
            &lookup,
            "RELAY_BREAKER_THRESHOLD",
            &mut self.circuit_breaker.failure_threshold,
        )?;
        override_from(
            &lookup,
            "RELAY_BREAKER_COOLDOWN_MS",
            &mut self.circuit_breaker.cooldown_ms,
        )?;
        override_from(&lookup, "RELAY_RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        override_from(&lookup, "RELAY_RETRY_BASE_DELAY_MS", &mut self.retry.base_delay_ms)?;
        override_from(
            &lookup,
            "RELAY_RETRY_OPEN_CIRCUIT",
            &mut self.retry.retry_open_circuit,
        )?;
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(RelayError::Config(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(RelayError::Config(
                "rate_limit.window_ms must be positive".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RelayError::Config(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RelayError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| RelayError::Config(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.max_requests, 60);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.retry.base_delay_ms, 75);
        assert!(!config.retry.retry_open_circuit);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = OrchestratorConfig::default();
        config
            .apply_env_with(lookup(&[
                ("RELAY_RATE_LIMIT_MAX", "5"),
                ("RELAY_BREAKER_COOLDOWN_MS", "2500"),
                ("RELAY_RETRY_OPEN_CIRCUIT", "true"),
            ]))
            .unwrap();
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.circuit_breaker.cooldown_ms, 2500);
        assert!(config.retry.retry_open_circuit);
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut config = OrchestratorConfig::default();
        let err = config
            .apply_env_with(lookup(&[("RELAY_RETRY_MAX_ATTEMPTS", "three")]))
            .unwrap_err();
        assert!(matches!(err, RelayError::Config(msg) if msg.contains("RELAY_RETRY_MAX_ATTEMPTS")));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut config = OrchestratorConfig::default();
        assert!(config
            .apply_env_with(lookup(&[("RELAY_RETRY_MAX_ATTEMPTS", "0")]))
            .is_err());

        let mut config = OrchestratorConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_overrides_subset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retry": {{"max_attempts": 5}}, "rate_limit": {{"window_ms": 1000}}}}"#)
            .unwrap();

        let config = OrchestratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 75);
        assert_eq!(config.rate_limit.window_ms, 1000);
        assert_eq!(config.rate_limit.max_requests, 60);
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let err = OrchestratorConfig::from_file("/nonexistent/relay.json").unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
