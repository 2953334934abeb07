//! Redis-backed store.
//!
//! Window counters are Redis sorted sets scored by Unix second. Range
//! bounds use Redis' exclusive `(` prefix so that every range is half-open.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use super::CounterStore;
use crate::error::Result;

/// Redis implementation of [`CounterStore`].
///
/// Cloning is cheap; clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("Connected to redis store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn remove_below(&self, key: &str, bound: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.zrembyscore(key, "-inf", format!("({bound}")).await?;
        Ok(())
    }

    async fn count_between(&self, key: &str, start: i64, end: i64) -> Result<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.zcount(key, start, format!("({end}")).await?;
        Ok(count)
    }

    async fn record(&self, key: &str, score: i64, member: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);

        redis::pipe()
            .atomic()
            .zadd(key, member, score)
            .ignore()
            .expire(key, ttl)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! These tests need a Redis instance at `redis://127.0.0.1/`.
    //! Run with `cargo test -- --ignored`.

    use super::*;

    const REDIS_URL: &str = "redis://127.0.0.1/";

    fn unique_key(name: &str) -> String {
        format!("rate:test-{}:{name}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_string_roundtrip() {
        let store = RedisStore::connect(REDIS_URL).await.unwrap();
        let key = unique_key("policy");

        assert_eq!(store.get(&key).await.unwrap(), None);
        store.set(&key, "{\"generalLimit\":5}").await.unwrap();
        assert_eq!(
            store.get(&key).await.unwrap().as_deref(),
            Some("{\"generalLimit\":5}")
        );
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_window_ranges() {
        let store = RedisStore::connect(REDIS_URL).await.unwrap();
        let key = unique_key("window");

        for (score, member) in [(59, "a"), (60, "b"), (60, "c"), (61, "d")] {
            store.record(&key, score, member, 30).await.unwrap();
        }

        assert_eq!(store.count_between(&key, 0, 60).await.unwrap(), 1);
        assert_eq!(store.count_between(&key, 60, 62).await.unwrap(), 3);

        store.remove_below(&key, 60).await.unwrap();
        assert_eq!(store.count_between(&key, 0, 100).await.unwrap(), 3);
    }
}
