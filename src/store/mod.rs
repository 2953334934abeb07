//! Shared key-value stores backing policies and window counters.
//!
//! Policies live under plain string keys; window counters are sorted sets
//! of `(timestamp, member)` entries with a key-level expiry. Every method is
//! a single store operation; no transaction spans two calls.

mod memory;
mod redis_store;

pub use self::memory::InMemoryStore;
pub use self::redis_store::RedisStore;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, TurnstileError};

/// Trait for the shared store.
///
/// Implementations must be safe to call from many tasks at once; each
/// individual operation is expected to be atomic.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove sorted-set entries scored strictly below `bound`.
    async fn remove_below(&self, key: &str, bound: i64) -> Result<()>;

    /// Count sorted-set entries scored in `[start, end)`.
    async fn count_between(&self, key: &str, start: i64, end: i64) -> Result<u64>;

    /// Add a sorted-set entry and reset the key's expiry in one atomic step.
    async fn record(&self, key: &str, score: i64, member: &str, ttl_secs: u64) -> Result<()>;
}

/// Open the store described by `config`.
pub async fn connect(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new(clock))),
        StoreBackend::Redis => {
            let url = config.url.as_deref().ok_or_else(|| {
                TurnstileError::InvalidConfiguration("redis store requires a url".to_string())
            })?;
            Ok(Arc::new(RedisStore::connect(url).await?))
        }
    }
}
