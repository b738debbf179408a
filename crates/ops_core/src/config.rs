//! Per-handler environment configuration.
//!
//! Handlers resolve their configuration through [`EnvSource`] instead of
//! touching `std::env` directly, so tests can prove that a misconfigured
//! handler answers before any AWS call is made. A resolution failure names
//! every missing variable at once, not just the first one encountered.

use std::collections::HashMap;
use std::time::Duration;

pub const VOLUME_TAG_KEY_VAR: &str = "VOLUME_TAG_KEY";
pub const VOLUME_TAG_VALUE_VAR: &str = "VOLUME_TAG_VALUE";
pub const WAIT_TIMEOUT_VAR: &str = "DETACH_WAIT_TIMEOUT_SECS";
pub const POLL_INTERVAL_VAR: &str = "DETACH_POLL_INTERVAL_SECS";
pub const CLUSTER_NAME_VAR: &str = "ECS_CLUSTER_NAME";
pub const SERVICE_NAME_VAR: &str = "ECS_SERVICE_NAME";
pub const VERIFICATION_SECRET_VAR: &str = "VERIFICATION_SECRET";
pub const SUBSCRIPTIONS_TABLE_VAR: &str = "SUBSCRIPTIONS_TABLE_NAME";

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads from the process environment; the implementation binaries use this.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn missing(names: &[&str]) -> Self {
        Self {
            message: format!(
                "Missing required environment variables: {}",
                names.join(", ")
            ),
        }
    }

    fn invalid(name: &str, detail: impl std::fmt::Display) -> Self {
        Self {
            message: format!("Invalid value for {name}: {detail}"),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}

fn required(env: &impl EnvSource, name: &'static str, missing: &mut Vec<&'static str>) -> String {
    match env.var(name) {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

fn duration_secs(
    env: &impl EnvSource,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match env.var(name) {
        None => Ok(default),
        Some(raw) => {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(name, format!("'{raw}' is not a whole number of seconds"))
            })?;
            if secs == 0 {
                return Err(ConfigError::invalid(name, "must be at least 1 second"));
            }
            Ok(Duration::from_secs(secs))
        }
    }
}

/// Configuration for the EBS lifecycle detach handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachConfig {
    pub volume_tag_key: String,
    pub volume_tag_value: String,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl DetachConfig {
    pub fn resolve(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let volume_tag_key = required(env, VOLUME_TAG_KEY_VAR, &mut missing);
        let volume_tag_value = required(env, VOLUME_TAG_VALUE_VAR, &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::missing(&missing));
        }

        Ok(Self {
            volume_tag_key,
            volume_tag_value,
            wait_timeout: duration_secs(env, WAIT_TIMEOUT_VAR, DEFAULT_WAIT_TIMEOUT)?,
            poll_interval: duration_secs(env, POLL_INTERVAL_VAR, DEFAULT_POLL_INTERVAL)?,
        })
    }

    /// Number of polls that fit in the wait timeout, never less than one.
    pub fn max_polls(&self) -> u64 {
        (self.wait_timeout.as_secs() / self.poll_interval.as_secs().max(1)).max(1)
    }
}

/// Configuration for the ECR push redeploy handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeployConfig {
    pub cluster: String,
    pub service: String,
}

impl RedeployConfig {
    pub fn resolve(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let cluster = required(env, CLUSTER_NAME_VAR, &mut missing);
        let service = required(env, SERVICE_NAME_VAR, &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::missing(&missing));
        }
        Ok(Self { cluster, service })
    }
}

/// Configuration for the email verification handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyConfig {
    pub secret: String,
    pub table_name: String,
}

impl VerifyConfig {
    pub fn resolve(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let secret = required(env, VERIFICATION_SECRET_VAR, &mut missing);
        let table_name = required(env, SUBSCRIPTIONS_TABLE_VAR, &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::missing(&missing));
        }
        Ok(Self { secret, table_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn detach_config_applies_wait_defaults() {
        let config = DetachConfig::resolve(&env(&[
            (VOLUME_TAG_KEY_VAR, "kubernetes.io/cluster/dev"),
            (VOLUME_TAG_VALUE_VAR, "owned"),
        ]))
        .expect("config should resolve");

        assert_eq!(config.wait_timeout, DEFAULT_WAIT_TIMEOUT);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.max_polls(), 24);
    }

    #[test]
    fn detach_config_rejects_non_numeric_timeout() {
        let error = DetachConfig::resolve(&env(&[
            (VOLUME_TAG_KEY_VAR, "stack"),
            (VOLUME_TAG_VALUE_VAR, "dev"),
            (WAIT_TIMEOUT_VAR, "soon"),
        ]))
        .expect_err("config should be rejected");

        assert!(error.message().contains(WAIT_TIMEOUT_VAR));
    }

    #[test]
    fn redeploy_config_lists_all_missing_variables() {
        let error = RedeployConfig::resolve(&env(&[])).expect_err("config should be rejected");

        assert!(error.message().contains(CLUSTER_NAME_VAR));
        assert!(error.message().contains(SERVICE_NAME_VAR));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let error = VerifyConfig::resolve(&env(&[
            (VERIFICATION_SECRET_VAR, "   "),
            (SUBSCRIPTIONS_TABLE_VAR, "subscriptions"),
        ]))
        .expect_err("config should be rejected");

        assert!(error.message().contains(VERIFICATION_SECRET_VAR));
        assert!(!error.message().contains(SUBSCRIPTIONS_TABLE_VAR));
    }
}
