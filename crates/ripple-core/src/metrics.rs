// Typed snapshots for the read-only metrics endpoints.

use chrono::{DateTime, Utc};
use ripple_adaptive::ThrottlerMetrics;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TopicMetrics {
    pub name: String,
    pub tenant_id: String,
    pub messages_published: u64,
    pub active_subscribers: usize,
    /// Lifetime count of subscribers that ever joined this topic.
    pub total_subscribers: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerMetrics {
    pub total_topics: usize,
    pub total_subscribers: usize,
    pub slow_subscribers: usize,
    pub topics: Vec<TopicMetrics>,
    pub throttler_metrics: ThrottlerMetrics,
}
