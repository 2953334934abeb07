//! Rate limiting logic and policy management.

mod decision;
mod keys;
mod limiter;
mod logger;
mod policy;
mod policy_store;
mod window;

pub use decision::{AllowReason, Decision, FailOpenCause};
pub use keys::{policy_key, WindowKey};
pub use limiter::{AdmissionRequest, RateLimiter, RequestMeta};
pub use logger::{DecisionLogger, Recorded, RecordingLogger, TracingLogger};
pub use policy::{BlockedIdentity, CustomLimit, LogLevel, TenantPolicy};
pub use policy_store::PolicyStore;
pub use window::SlidingWindow;
