//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TurnstileError};

/// Prefix for environment variable overrides, e.g. `TURNSTILE__LIMITER__TENANT`.
const ENV_PREFIX: &str = "TURNSTILE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Engine configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Shared store connection settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Log output settings for the binary
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine construction parameters.
///
/// Both fields are optional at the serde level so that a missing value
/// surfaces as `InvalidConfiguration` instead of a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// The tenant this engine serves
    pub tenant: Option<String>,

    /// Window width used when a stored policy carries none
    pub window_size_secs: Option<u64>,
}

impl LimiterConfig {
    /// Create a limiter configuration for a tenant and window size.
    pub fn new(tenant: impl Into<String>, window_size_secs: u64) -> Self {
        Self {
            tenant: Some(tenant.into()),
            window_size_secs: Some(window_size_secs),
        }
    }

    /// Check that the required parameters are present.
    ///
    /// Returns the tenant name and window size.
    pub fn validate(&self) -> Result<(&str, u64)> {
        let tenant = match self.tenant.as_deref().map(str::trim) {
            Some(tenant) if !tenant.is_empty() => tenant,
            _ => {
                return Err(TurnstileError::InvalidConfiguration(
                    "tenant name is required".to_string(),
                ))
            }
        };

        let window_size_secs = match self.window_size_secs {
            Some(secs) if secs > 0 => secs,
            Some(_) => {
                return Err(TurnstileError::InvalidConfiguration(
                    "window size must be greater than zero".to_string(),
                ))
            }
            None => {
                return Err(TurnstileError::InvalidConfiguration(
                    "window size is required".to_string(),
                ))
            }
        };

        Ok((tenant, window_size_secs))
    }
}

/// Which store implementation backs the counters and policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, not shared between instances
    #[default]
    Memory,
    /// Redis server shared by all instances
    Redis,
}

/// Store connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL, required for Redis (e.g. `redis://127.0.0.1/`)
    pub url: Option<String>,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::InvalidConfiguration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limiter:
  tenant: acme
  window_size_secs: 60
store:
  backend: redis
  url: redis://127.0.0.1/
logging:
  level: debug
  json: true
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.validate().unwrap(), ("acme", 60));
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = TurnstileConfig::from_yaml("limiter:\n  tenant: acme\n").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_missing_tenant_is_invalid() {
        let config = LimiterConfig {
            tenant: None,
            window_size_secs: Some(60),
        };
        assert!(matches!(
            config.validate(),
            Err(TurnstileError::InvalidConfiguration(_))
        ));

        let config = LimiterConfig::new("   ", 60);
        assert!(matches!(
            config.validate(),
            Err(TurnstileError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_or_zero_window_is_invalid() {
        let config = LimiterConfig {
            tenant: Some("acme".to_string()),
            window_size_secs: None,
        };
        assert!(matches!(
            config.validate(),
            Err(TurnstileError::InvalidConfiguration(_))
        ));

        let config = LimiterConfig::new("acme", 0);
        assert!(matches!(
            config.validate(),
            Err(TurnstileError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_load_without_file() {
        let config = TurnstileConfig::load(None).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }
}
