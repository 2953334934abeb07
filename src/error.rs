//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Missing or unusable construction parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A stored policy document could not be parsed
    #[error("Corrupt policy for tenant {tenant}: {source}")]
    CorruptPolicy {
        tenant: String,
        #[source]
        source: serde_json::Error,
    },

    /// The shared store could not be reached or rejected an operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Policy encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for TurnstileError {
    fn from(err: redis::RedisError) -> Self {
        TurnstileError::StoreUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::InvalidConfiguration(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
