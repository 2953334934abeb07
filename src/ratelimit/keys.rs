//! Store key namespace.

/// Store key holding a tenant's policy document.
pub fn policy_key(tenant: &str) -> String {
    format!("policy:{}", tenant)
}

/// A key that identifies the window counter of one identity within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// The tenant the identity belongs to
    pub tenant: String,
    /// The client identity being counted
    pub identity: String,
}

impl WindowKey {
    /// Create a new window key.
    pub fn new(tenant: &str, identity: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            identity: identity.to_string(),
        }
    }

    /// The store key of the counter, `rate:{tenant}:{identity}`.
    pub fn to_store_key(&self) -> String {
        format!("rate:{}:{}", self.tenant, self.identity)
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_key() {
        assert_eq!(policy_key("acme"), "policy:acme");
    }

    #[test]
    fn test_window_key_to_string() {
        let key = WindowKey::new("acme", "1.2.3.4");
        assert_eq!(key.to_store_key(), "rate:acme:1.2.3.4");
        assert_eq!(key.to_string(), "rate:acme:1.2.3.4");
    }

    #[test]
    fn test_window_key_equality() {
        assert_eq!(WindowKey::new("acme", "a"), WindowKey::new("acme", "a"));
        assert_ne!(WindowKey::new("acme", "a"), WindowKey::new("other", "a"));
    }
}
