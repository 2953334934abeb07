//! Process-local store.
//!
//! Mirrors the subset of Redis semantics the limiter relies on: string
//! values, sorted sets, key expiry driven by a [`Clock`], and empty sorted
//! sets disappearing. Useful for single-instance deployments and tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::CounterStore;
use crate::clock::Clock;
use crate::error::{Result, TurnstileError};

#[derive(Debug)]
enum Value {
    Text(String),
    Scores(BTreeSet<(i64, String)>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    /// Unix second at which the key stops existing
    expires_at: Option<i64>,
}

impl Slot {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory implementation of [`CounterStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    slots: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store whose expiry follows `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every operation fail with `StoreUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_unix();
        self.slots.iter().filter(|slot| !slot.is_expired(now)).count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in the sorted set at `key`, zero if absent.
    pub fn cardinality(&self, key: &str) -> usize {
        self.purge_expired(key);
        match self.slots.get(key).as_deref() {
            Some(Slot {
                value: Value::Scores(scores),
                ..
            }) => scores.len(),
            _ => 0,
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TurnstileError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn purge_expired(&self, key: &str) {
        let now = self.clock.now_unix();
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
    }
}

fn wrong_type(key: &str) -> TurnstileError {
    TurnstileError::StoreUnavailable(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        self.purge_expired(key);

        match self.slots.get(key).as_deref() {
            None => Ok(None),
            Some(Slot {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Text(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn remove_below(&self, key: &str, bound: i64) -> Result<()> {
        self.ensure_available()?;
        self.purge_expired(key);

        if let Some(mut slot) = self.slots.get_mut(key) {
            match &mut slot.value {
                Value::Scores(scores) => scores.retain(|(score, _)| *score >= bound),
                Value::Text(_) => return Err(wrong_type(key)),
            }
        }

        self.slots.remove_if(key, |_, slot| {
            matches!(&slot.value, Value::Scores(scores) if scores.is_empty())
        });
        Ok(())
    }

    async fn count_between(&self, key: &str, start: i64, end: i64) -> Result<u64> {
        self.ensure_available()?;
        self.purge_expired(key);

        match self.slots.get(key).as_deref() {
            None => Ok(0),
            Some(Slot {
                value: Value::Scores(scores),
                ..
            }) => Ok(scores
                .iter()
                .filter(|(score, _)| (start..end).contains(score))
                .count() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn record(&self, key: &str, score: i64, member: &str, ttl_secs: u64) -> Result<()> {
        self.ensure_available()?;
        self.purge_expired(key);

        let expires_at = self
            .clock
            .now_unix()
            .saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX));

        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Scores(BTreeSet::new()),
            expires_at: None,
        });

        match &mut slot.value {
            Value::Scores(scores) => {
                scores.insert((score, member.to_string()));
            }
            Value::Text(_) => return Err(wrong_type(key)),
        }
        slot.expires_at = Some(expires_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_at(start: i64) -> (InMemoryStore, ManualClock) {
        let clock = ManualClock::new(start);
        (InMemoryStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let (store, _) = store_at(0);
        assert_eq!(store.get("policy:acme").await.unwrap(), None);

        store.set("policy:acme", "{}").await.unwrap();
        assert_eq!(store.get("policy:acme").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_count_is_half_open() {
        let (store, _) = store_at(0);
        for (score, member) in [(10, "a"), (20, "b"), (30, "c")] {
            store.record("rate:t:i", score, member, 60).await.unwrap();
        }

        assert_eq!(store.count_between("rate:t:i", 10, 30).await.unwrap(), 2);
        assert_eq!(store.count_between("rate:t:i", 10, 31).await.unwrap(), 3);
        assert_eq!(store.count_between("rate:t:i", 31, 40).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_score_distinct_members() {
        let (store, _) = store_at(0);
        store.record("rate:t:i", 5, "a", 60).await.unwrap();
        store.record("rate:t:i", 5, "b", 60).await.unwrap();
        assert_eq!(store.cardinality("rate:t:i"), 2);
    }

    #[tokio::test]
    async fn test_remove_below_is_strict() {
        let (store, _) = store_at(0);
        store.record("rate:t:i", 9, "a", 60).await.unwrap();
        store.record("rate:t:i", 10, "b", 60).await.unwrap();

        store.remove_below("rate:t:i", 10).await.unwrap();
        assert_eq!(store.cardinality("rate:t:i"), 1);

        store.remove_below("rate:t:i", 11).await.unwrap();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_record_refreshes_expiry() {
        let (store, clock) = store_at(100);
        store.record("rate:t:i", 100, "a", 60).await.unwrap();

        clock.advance(50);
        store.record("rate:t:i", 150, "b", 60).await.unwrap();

        clock.advance(50);
        assert_eq!(store.cardinality("rate:t:i"), 2);

        clock.advance(10);
        assert_eq!(store.cardinality("rate:t:i"), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let (store, _) = store_at(0);
        store.set("k", "v").await.unwrap();
        assert!(store.count_between("k", 0, 1).await.is_err());
        assert!(store.record("k", 0, "a", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let (store, _) = store_at(0);
        store.set_unavailable(true);
        assert!(matches!(
            store.get("k").await,
            Err(TurnstileError::StoreUnavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.get("k").await.is_ok());
    }
}
