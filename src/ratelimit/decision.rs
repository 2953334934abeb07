//! Outcome of an admission check.

use crate::error::TurnstileError;

/// The result of checking one request.
#[derive(Debug)]
pub enum Decision {
    /// Let the request through.
    Allowed(AllowReason),
    /// Reject the request.
    Denied {
        /// Seconds until the current window rolls over
        retry_after_secs: u64,
        /// The estimated rate that tripped the limit
        weighted_rate: f64,
        /// The limit that applied
        limit: u64,
    },
}

/// Why a request was allowed.
#[derive(Debug)]
pub enum AllowReason {
    /// Rate limiting is switched off for the tenant
    Disabled,
    /// The identity is on the tenant's exclusion list
    Excluded,
    /// The estimated rate was below the limit; the request was recorded
    UnderLimit { weighted_rate: f64, limit: u64 },
    /// No decision could be computed
    FailOpen(FailOpenCause),
}

/// What prevented a decision from being computed.
#[derive(Debug)]
pub enum FailOpenCause {
    /// The request carried no usable identity
    MissingIdentity,
    /// The policy yielded no usable limit for the identity
    LimitUnresolved,
    /// The tenant policy could not be loaded
    Policy(TurnstileError),
    /// A window counter operation failed
    Store(TurnstileError),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// Whether the request was allowed only because no decision could be made.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, Decision::Allowed(AllowReason::FailOpen(_)))
    }

    /// Seconds the caller should wait before retrying, for denied requests.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Decision::Denied {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            Decision::Allowed(_) => None,
        }
    }
}

impl From<Decision> for bool {
    fn from(decision: Decision) -> Self {
        decision.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_carries_retry_after() {
        let decision = Decision::Denied {
            retry_after_secs: 58,
            weighted_rate: 2.0,
            limit: 2,
        };
        assert!(!decision.is_allowed());
        assert!(!decision.is_fail_open());
        assert_eq!(decision.retry_after(), Some(58));
        assert!(!bool::from(decision));
    }

    #[test]
    fn test_fail_open_is_allowed() {
        let decision = Decision::Allowed(AllowReason::FailOpen(FailOpenCause::Store(
            TurnstileError::StoreUnavailable("down".to_string()),
        )));
        assert!(decision.is_allowed());
        assert!(decision.is_fail_open());
        assert_eq!(decision.retry_after(), None);
    }
}
