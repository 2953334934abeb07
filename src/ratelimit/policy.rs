//! Tenant policy documents and limit resolution.
//!
//! A policy is stored as JSON under `policy:{tenant}`. Field names from
//! older documents (`excludeIps`, `windowSizeInSeconds`, `ip`, ...) are
//! accepted on read.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, TurnstileError};

/// Per-tenant rate limiting policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPolicy {
    /// Default maximum requests per window
    pub general_limit: u64,

    /// Window width recorded with the policy; counting uses the engine's window
    #[serde(alias = "windowSizeInSeconds")]
    pub window_size_seconds: u64,

    /// Identities that are always allowed and never counted
    #[serde(default, alias = "excludeIps")]
    pub exclude_identities: BTreeSet<String>,

    /// Per-identity overrides; the first matching entry wins
    #[serde(default)]
    pub custom_limits: Vec<CustomLimit>,

    /// Tenant-wide switch for rate limiting
    #[serde(default = "default_true")]
    pub enable_rate_limit: bool,

    /// Tenant-wide switch for decision logging
    #[serde(default = "default_true")]
    pub enable_logging: bool,

    /// Minimum level of decision messages emitted for this tenant
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Blocking settings are stored and returned as-is; decisions never read them.
    #[serde(default)]
    pub block_strategy: String,

    #[serde(default, alias = "blockDurationInSeconds")]
    pub block_duration_seconds: u64,

    #[serde(default, alias = "blockedIps")]
    pub blocked_identities: Vec<BlockedIdentity>,
}

/// A limit override for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomLimit {
    /// The identity this limit applies to
    #[serde(alias = "ip")]
    pub identity: String,
    /// Maximum requests per window for this identity
    pub limit: u64,
}

/// A recorded block of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedIdentity {
    #[serde(alias = "ip")]
    pub identity: String,
    pub block_start_time: DateTime<Utc>,
    #[serde(alias = "blockDurationInSeconds")]
    pub block_duration_seconds: u64,
}

/// Severity of a decision message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parse a level name. Unknown names fall back to `Info`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warning" | "warn" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn sample_block(identity: &str, start: i64, duration: u64) -> BlockedIdentity {
    BlockedIdentity {
        identity: identity.to_string(),
        block_start_time: Utc.timestamp_opt(start, 0).single().unwrap_or_default(),
        block_duration_seconds: duration,
    }
}

impl Default for TenantPolicy {
    /// The policy written for a tenant seen for the first time.
    fn default() -> Self {
        Self {
            general_limit: 100,
            window_size_seconds: 60,
            exclude_identities: ["192.168.1.1", "192.168.1.2"]
                .into_iter()
                .map(String::from)
                .collect(),
            custom_limits: vec![
                CustomLimit {
                    identity: "203.0.113.1".to_string(),
                    limit: 200,
                },
                CustomLimit {
                    identity: "203.0.113.2".to_string(),
                    limit: 50,
                },
            ],
            enable_rate_limit: true,
            enable_logging: true,
            log_level: default_log_level(),
            block_strategy: "temporary".to_string(),
            block_duration_seconds: 300,
            blocked_identities: vec![
                // 2023-12-20T12:00:00Z
                sample_block("198.51.100.1", 1_703_073_600, 600),
                // 2023-12-20T13:00:00Z
                sample_block("198.51.100.2", 1_703_077_200, 1200),
            ],
        }
    }
}

impl TenantPolicy {
    /// Parse a stored policy document.
    pub fn from_json(tenant: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| TurnstileError::CorruptPolicy {
            tenant: tenant.to_string(),
            source,
        })
    }

    /// Encode the policy for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether `identity` bypasses counting.
    pub fn is_excluded(&self, identity: &str) -> bool {
        self.exclude_identities.contains(identity)
    }

    /// Resolve the limit that applies to `identity`.
    ///
    /// The first custom limit for the identity wins; a zero custom limit
    /// falls back to the general limit. Returns `None` when no usable
    /// limit exists.
    pub fn resolve_limit(&self, identity: &str) -> Option<u64> {
        self.custom_limits
            .iter()
            .find(|custom| custom.identity == identity)
            .map(|custom| custom.limit)
            .filter(|limit| *limit > 0)
            .or(Some(self.general_limit))
            .filter(|limit| *limit > 0)
    }

    /// The configured minimum message level.
    pub fn log_threshold(&self) -> LogLevel {
        LogLevel::parse(&self.log_level)
    }

    /// Whether a message at `level` should be emitted for this tenant.
    pub fn logs_at(&self, level: LogLevel) -> bool {
        self.enable_logging && level >= self.log_threshold()
    }
}
