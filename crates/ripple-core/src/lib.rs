// Delivery core for the ripple event server.
//
// The topic manager owns tenant-scoped topics; a topic fans published
// messages out to per-client subscriber actors, each with a bounded inbox
// and an explicit drop policy. Registries use reader-writer locks, all
// observability counters are atomics, and no lock is ever held across a
// transport write.

use std::fmt;

pub mod message;
pub mod metrics;
pub mod recent_cache;
pub mod subscriber;
pub mod topic;
pub mod topic_manager;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use message::Message;
pub use metrics::{ManagerMetrics, TopicMetrics};
pub use recent_cache::RecentCache;
pub use subscriber::{DropStrategy, Subscriber, SubscriberMetrics};
pub use topic::Topic;
pub use topic_manager::TopicManager;
pub use transport::ClientTransport;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("tenant mismatch: subscriber {subscriber_id} belongs to {subscriber_tenant}, topic belongs to {topic_tenant}")]
    TenantMismatch {
        subscriber_id: String,
        subscriber_tenant: String,
        topic_tenant: String,
    },
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    #[error("subscriber not found: {0}")]
    SubscriberNotFound(String),
    #[error("subscriber {0}: buffer full")]
    BufferFull(String),
    #[error("subscriber {0}: circuit breaker tripped")]
    CircuitBreakerTripped(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("subscriber {0}: closed")]
    Closed(String),
    #[error("topic manager is shut down")]
    ShutDown,
}

impl Error {
    /// Debug-friendly kind tag, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::TenantMismatch { .. } => "tenant_mismatch",
            Error::TopicNotFound(_) => "topic_not_found",
            Error::SubscriberNotFound(_) => "subscriber_not_found",
            Error::BufferFull(_) => "buffer_full",
            Error::CircuitBreakerTripped(_) => "circuit_breaker_tripped",
            Error::Transport(_) => "transport",
            Error::Closed(_) => "closed",
            Error::ShutDown => "shut_down",
        }
    }
}

/// Composite registry key; tenant isolation holds because the tenant id is
/// embedded verbatim.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TopicKey {
    tenant_id: String,
    name: String,
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.name)
    }
}

impl TopicKey {
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            name: name.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_key_embeds_tenant_verbatim() {
        let key = TopicKey::new("acme", "orders");
        assert_eq!(key.to_string(), "acme:orders");
        assert_eq!(key.tenant_id(), "acme");
        assert_eq!(key.name(), "orders");
    }

    #[test]
    fn same_name_different_tenant_is_a_different_key() {
        let a = TopicKey::new("a", "t");
        let b = TopicKey::new("b", "t");
        assert_ne!(a, b);
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(Error::ShutDown.kind(), "shut_down");
        assert_eq!(Error::BufferFull("s".into()).kind(), "buffer_full");
        let err = Error::TenantMismatch {
            subscriber_id: "s1".into(),
            subscriber_tenant: "a".into(),
            topic_tenant: "b".into(),
        };
        assert!(err.to_string().contains("s1"));
        assert!(err.to_string().contains("tenant mismatch"));
    }
}
