//! Configuration management for Redlimit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RedlimitError, Result};
use crate::ratelimit::{effective_window_secs, MAX_LIMIT, MAX_WINDOW_SECS};

/// Main configuration for Redlimit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedlimitConfig {
    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Upper bound on one store round trip, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_ms: default_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_key_prefix() -> String {
    "ratelimit:".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Window size in seconds; zero means the default
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Optional path to a replacement check-and-increment procedure
    #[serde(default)]
    pub script_path: Option<String>,

    /// Requests allowed per window, by key
    #[serde(default)]
    pub limits: HashMap<String, u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            script_path: None,
            limits: HashMap::new(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

impl LimiterConfig {
    /// The window the limiter will run with.
    pub fn effective_window(&self) -> u64 {
        effective_window_secs(self.window_secs)
    }
}

impl RedlimitConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RedlimitConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RedlimitError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.store.url.trim().is_empty() {
            return Err(RedlimitError::Config("store.url must not be empty".to_string()));
        }
        if self.store.timeout_ms == 0 {
            return Err(RedlimitError::Config(
                "store.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.limiter.window_secs > MAX_WINDOW_SECS {
            return Err(RedlimitError::Config(format!(
                "limiter.window_secs must not exceed {}",
                MAX_WINDOW_SECS
            )));
        }
        if let Some((key, limit)) = self.limiter.limits.iter().find(|(_, l)| **l > MAX_LIMIT) {
            return Err(RedlimitError::Config(format!(
                "limit {} for key {} exceeds the maximum of {}",
                limit, key, MAX_LIMIT
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedlimitConfig::default();
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
        assert_eq!(config.store.timeout(), Duration::from_millis(250));
        assert_eq!(config.store.key_prefix, "ratelimit:");
        assert_eq!(config.limiter.window_secs, 60);
        assert!(config.limiter.limits.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
store:
  url: redis://cache:6380/2
  timeout_ms: 100
  key_prefix: "api:"
limiter:
  window_secs: 5
  script_path: /etc/redlimit/window.lua
  limits:
    Raamu: 20
    Shaamu: 40
"#;
        let config = RedlimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.url, "redis://cache:6380/2");
        assert_eq!(config.store.timeout_ms, 100);
        assert_eq!(config.store.key_prefix, "api:");
        assert_eq!(config.limiter.window_secs, 5);
        assert_eq!(
            config.limiter.script_path.as_deref(),
            Some("/etc/redlimit/window.lua")
        );
        assert_eq!(config.limiter.limits["Raamu"], 20);
        assert_eq!(config.limiter.limits["Shaamu"], 40);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
limiter:
  limits:
    tenant_a: 100
"#;
        let config = RedlimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
        assert_eq!(config.limiter.window_secs, 60);
        assert_eq!(config.limiter.limits.len(), 1);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let yaml = r#"
store:
  timeout_ms: 0
"#;
        assert!(matches!(
            RedlimitConfig::from_yaml(yaml),
            Err(RedlimitError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let yaml = format!("limiter:\n  window_secs: {}\n", u64::MAX);
        assert!(matches!(
            RedlimitConfig::from_yaml(&yaml),
            Err(RedlimitError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_limit() {
        let yaml = format!("limiter:\n  limits:\n    big: {}\n", u64::MAX);
        assert!(matches!(
            RedlimitConfig::from_yaml(&yaml),
            Err(RedlimitError::Config(_))
        ));

        let yaml = format!("limiter:\n  limits:\n    big: {}\n", MAX_LIMIT);
        assert!(RedlimitConfig::from_yaml(&yaml).is_ok());
    }

    #[test]
    fn test_effective_window() {
        let mut config = LimiterConfig::default();
        assert_eq!(config.effective_window(), 60);
        config.window_secs = 0;
        assert_eq!(config.effective_window(), 60);
        config.window_secs = 5;
        assert_eq!(config.effective_window(), 5);
    }

    #[test]
    fn test_rejects_negative_limit() {
        let yaml = r#"
limiter:
  limits:
    bad: -1
"#;
        assert!(RedlimitConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RedlimitConfig::from_file("/nonexistent/redlimit.yaml"),
            Err(RedlimitError::Io(_))
        ));
    }
}
