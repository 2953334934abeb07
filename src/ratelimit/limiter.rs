//! Core rate limiter implementation.

use std::sync::Arc;

use futures::future::try_join;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::decision::{AllowReason, Decision, FailOpenCause};
use super::keys::WindowKey;
use super::logger::{DecisionLogger, TracingLogger};
use super::policy::{LogLevel, TenantPolicy};
use super::policy_store::PolicyStore;
use super::window::SlidingWindow;
use crate::clock::{Clock, SystemClock};
use crate::config::{LimiterConfig, TurnstileConfig};
use crate::error::Result;
use crate::store::{self, CounterStore};

/// Request attributes carried into decision messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub path: String,
    pub method: String,
}

impl RequestMeta {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }
}

/// A request as seen by the limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Client identity, usually from [`crate::identity::extract_identity`]
    pub identity: Option<String>,
    pub meta: RequestMeta,
}

impl AdmissionRequest {
    pub fn new(identity: impl Into<String>, meta: RequestMeta) -> Self {
        Self {
            identity: Some(identity.into()),
            meta,
        }
    }
}

/// The admission engine for one tenant.
///
/// Cheap to share behind an `Arc`; `check` may run concurrently from many
/// tasks. The prune, count and record steps of one check are separate store
/// operations, so concurrent checks for the same identity can each see a
/// rate just under the limit and all be admitted.
pub struct RateLimiter {
    /// Tenant served by [`RateLimiter::check`]
    tenant: String,
    /// Width of the counting window for every tenant
    window_size_secs: u64,
    /// Snapshot of the home tenant's policy, loaded at construction
    policy: Arc<TenantPolicy>,
    policies: PolicyStore,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn DecisionLogger>,
}

impl RateLimiter {
    /// Open the configured store and build a limiter on it.
    pub async fn connect(config: &TurnstileConfig) -> Result<Self> {
        config.limiter.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let store = store::connect(&config.store, Arc::clone(&clock)).await?;
        Ok(Self::new(&config.limiter, store).await?.with_clock(clock))
    }

    /// Build a limiter on an existing store.
    ///
    /// Returns once the tenant's policy is loaded (and initialized if the
    /// tenant is new). A stored policy that does not parse is an error.
    pub async fn new(config: &LimiterConfig, store: Arc<dyn CounterStore>) -> Result<Self> {
        let (tenant, window_size_secs) = config.validate()?;

        let policies = PolicyStore::new(Arc::clone(&store));
        let policy = policies.load(tenant).await?;

        info!(
            tenant = %tenant,
            general_limit = policy.general_limit,
            window_size_secs = window_size_secs,
            "Rate limiter ready"
        );

        Ok(Self {
            tenant: tenant.to_string(),
            window_size_secs,
            policy,
            policies,
            store,
            clock: Arc::new(SystemClock::new()),
            logger: Arc::new(TracingLogger),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the sink for decision messages.
    pub fn with_logger(mut self, logger: Arc<dyn DecisionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// The tenant served by [`RateLimiter::check`].
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The home tenant's policy snapshot.
    pub fn policy(&self) -> &TenantPolicy {
        &self.policy
    }

    /// The policy cache shared by all tenants this limiter has seen.
    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    /// Decide a request for the home tenant.
    pub async fn check(&self, request: &AdmissionRequest) -> Decision {
        let Some(identity) = request.identity.as_deref() else {
            self.logger.error(&format!(
                "No client identity for {} {} in tenant {}, allowing request",
                request.meta.method, request.meta.path, self.tenant
            ));
            return Decision::Allowed(AllowReason::FailOpen(FailOpenCause::MissingIdentity));
        };

        self.evaluate(&self.tenant, &self.policy, identity, &request.meta)
            .await
    }

    /// Decide a request for any tenant, loading its policy on first use.
    ///
    /// Never fails: errors become [`AllowReason::FailOpen`] and are logged.
    pub async fn check_for(&self, tenant: &str, identity: &str, meta: &RequestMeta) -> Decision {
        let policy = match self.policies.load(tenant).await {
            Ok(policy) => policy,
            Err(err) => {
                self.logger.error(&format!(
                    "Failed to load policy for tenant {tenant}, allowing request from {identity}: {err}"
                ));
                return Decision::Allowed(AllowReason::FailOpen(FailOpenCause::Policy(err)));
            }
        };

        self.evaluate(tenant, &policy, identity, meta).await
    }

    async fn evaluate(
        &self,
        tenant: &str,
        policy: &TenantPolicy,
        identity: &str,
        meta: &RequestMeta,
    ) -> Decision {
        if !policy.enable_rate_limit {
            self.notice(policy, &format!("Rate limiter is disabled for tenant {tenant}"));
            return Decision::Allowed(AllowReason::Disabled);
        }

        if policy.is_excluded(identity) {
            self.notice(
                policy,
                &format!("Rate limiter skipped for excluded identity {identity}"),
            );
            return Decision::Allowed(AllowReason::Excluded);
        }

        let Some(limit) = policy.resolve_limit(identity) else {
            self.logger.error(&format!(
                "Unable to resolve a request limit for {identity} in tenant {tenant}, allowing request"
            ));
            return Decision::Allowed(AllowReason::FailOpen(FailOpenCause::LimitUnresolved));
        };

        let key = WindowKey::new(tenant, identity);
        match self.apply_window(&key, limit).await {
            Ok(decision) => {
                if let Some(retry_after) = decision.retry_after() {
                    self.emit(
                        policy,
                        LogLevel::Warning,
                        &format!(
                            "Rate limit exceeded for identity {identity}, endpoint {} and method {} (tenant {tenant}, retry after {retry_after}s)",
                            meta.path, meta.method
                        ),
                    );
                }
                decision
            }
            Err(err) => {
                self.logger.error(&format!(
                    "Rate limit check failed for identity {identity} in tenant {tenant}, allowing request: {err}"
                ));
                Decision::Allowed(AllowReason::FailOpen(FailOpenCause::Store(err)))
            }
        }
    }

    /// Run the weighted sliding-window check and record the request if admitted.
    async fn apply_window(
        &self,
        key: &WindowKey,
        limit: u64,
    ) -> Result<Decision> {
        let window = SlidingWindow::at(self.clock.now_unix(), self.window_size_secs);
        let store_key = key.to_store_key();

        trace!(
            key = %key,
            limit = limit,
            window_start = window.current_start,
            "Checking rate limit"
        );

        self.store
            .remove_below(&store_key, window.previous_start)
            .await?;

        let (previous_start, previous_end) = window.previous_range();
        let (current_start, current_end) = window.current_range();
        let (previous_count, current_count) = try_join(
            self.store
                .count_between(&store_key, previous_start, previous_end),
            self.store
                .count_between(&store_key, current_start, current_end),
        )
        .await?;

        let weighted_rate = window.weighted_rate(previous_count, current_count);

        if weighted_rate >= limit as f64 {
            debug!(
                key = %key,
                previous_count = previous_count,
                current_count = current_count,
                weighted_rate = weighted_rate,
                limit = limit,
                "Rate limit exceeded"
            );
            return Ok(Decision::Denied {
                retry_after_secs: window.retry_after(),
                weighted_rate,
                limit,
            });
        }

        let member = format!("{}-{}", window.now, Uuid::new_v4());
        self.store
            .record(&store_key, window.now, &member, window.size_secs)
            .await?;

        Ok(Decision::Allowed(AllowReason::UnderLimit {
            weighted_rate,
            limit,
        }))
    }

    /// Bypass notices follow the tenant's logging switch but not its level.
    fn notice(&self, policy: &TenantPolicy, message: &str) {
        if policy.enable_logging {
            self.logger.info(message);
        }
    }

    fn emit(&self, policy: &TenantPolicy, level: LogLevel, message: &str) {
        if !policy.logs_at(level) {
            return;
        }
        match level {
            LogLevel::Debug | LogLevel::Info => self.logger.info(message),
            LogLevel::Warning => self.logger.warn(message),
            LogLevel::Error => self.logger.error(message),
        }
    }
}
