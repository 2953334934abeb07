//! Per-tenant policy resolution and caching.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::keys::policy_key;
use super::policy::TenantPolicy;
use crate::error::Result;
use crate::store::CounterStore;

/// Loads tenant policies from the store and keeps them for the life of the process.
///
/// The first load for an unseen tenant writes the default policy. There is
/// no lock around that write: concurrent first loads write the same
/// document. Cached snapshots are never refreshed.
#[derive(Debug)]
pub struct PolicyStore {
    store: Arc<dyn CounterStore>,
    cache: DashMap<String, Arc<TenantPolicy>>,
}

impl PolicyStore {
    /// Create a policy store over `store`.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Resolve the policy for `tenant`.
    pub async fn load(&self, tenant: &str) -> Result<Arc<TenantPolicy>> {
        if let Some(policy) = self.cache.get(tenant) {
            return Ok(Arc::clone(policy.value()));
        }

        let key = policy_key(tenant);
        let policy = match self.store.get(&key).await? {
            Some(json) => TenantPolicy::from_json(tenant, &json)?,
            None => {
                let policy = TenantPolicy::default();
                self.store.set(&key, &policy.to_json()?).await?;
                info!(tenant = %tenant, "Initialized default policy");
                policy
            }
        };

        debug!(
            tenant = %tenant,
            general_limit = policy.general_limit,
            window_size_seconds = policy.window_size_seconds,
            enabled = policy.enable_rate_limit,
            "Loaded tenant policy"
        );

        // Another task may have raced us; keep whichever snapshot landed first.
        let cached = self
            .cache
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(policy));
        Ok(Arc::clone(cached.value()))
    }

    /// Write a policy document for `tenant`.
    ///
    /// Engines that already cached the tenant keep their snapshot.
    pub async fn put(&self, tenant: &str, policy: &TenantPolicy) -> Result<()> {
        self.store.set(&policy_key(tenant), &policy.to_json()?).await?;
        info!(tenant = %tenant, "Stored tenant policy");
        Ok(())
    }

    /// Number of tenants with a cached snapshot.
    pub fn cached_tenants(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TurnstileError;
    use crate::store::InMemoryStore;

    fn memory_store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new(Arc::new(ManualClock::new(0))))
    }

    #[tokio::test]
    async fn test_unseen_tenant_gets_default() {
        let store = memory_store();
        let policies = PolicyStore::new(store.clone());

        let policy = policies.load("newco").await.unwrap();
        assert_eq!(*policy, TenantPolicy::default());

        let stored = store.get("policy:newco").await.unwrap().unwrap();
        assert_eq!(TenantPolicy::from_json("newco", &stored).unwrap(), *policy);
    }

    #[tokio::test]
    async fn test_initialization_is_idempotent() {
        let store = memory_store();

        let first = PolicyStore::new(store.clone()).load("newco").await.unwrap();
        let second = PolicyStore::new(store.clone()).load("newco").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_cached() {
        let store = memory_store();
        let policies = PolicyStore::new(store.clone());

        let first = policies.load("acme").await.unwrap();

        let changed = TenantPolicy {
            general_limit: 1,
            ..TenantPolicy::default()
        };
        policies.put("acme", &changed).await.unwrap();

        let second = policies.load("acme").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.general_limit, 100);
        assert_eq!(policies.cached_tenants(), 1);

        // A fresh store sees the new document.
        let fresh = PolicyStore::new(store).load("acme").await.unwrap();
        assert_eq!(fresh.general_limit, 1);
    }

    #[tokio::test]
    async fn test_existing_policy_is_used() {
        let store = memory_store();
        store
            .set(
                "policy:acme",
                r#"{"generalLimit": 2, "windowSizeSeconds": 60}"#,
            )
            .await
            .unwrap();

        let policy = PolicyStore::new(store).load("acme").await.unwrap();
        assert_eq!(policy.general_limit, 2);
    }

    #[tokio::test]
    async fn test_corrupt_policy_is_surfaced() {
        let store = memory_store();
        store.set("policy:acme", "{broken").await.unwrap();

        let policies = PolicyStore::new(store.clone());
        let result = policies.load("acme").await;
        assert!(matches!(result, Err(TurnstileError::CorruptPolicy { .. })));

        // Not silently replaced with a default.
        assert_eq!(store.get("policy:acme").await.unwrap().as_deref(), Some("{broken"));
        assert_eq!(policies.cached_tenants(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let store = memory_store();
        store.set_unavailable(true);

        let result = PolicyStore::new(store).load("acme").await;
        assert!(matches!(result, Err(TurnstileError::StoreUnavailable(_))));
    }

    #[test]
    fn test_load_outside_async_test() {
        let policies = PolicyStore::new(memory_store());
        let policy = tokio_test::block_on(policies.load("blocking")).unwrap();
        assert_eq!(policy.general_limit, 100);
    }
}
