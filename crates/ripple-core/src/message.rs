// Immutable event record. Constructed once at ingress; never mutated.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Wall-clock ids collide under concurrent publishes, so every id carries a
// process-wide monotonic sequence suffix.
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// One published event. Serializes to the wire shape delivered to
/// subscribers: `{id, topic, tenant_id, data, timestamp}` with an RFC-3339
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub tenant_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        topic: impl Into<String>,
        tenant_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("msg-{}-{seq}", now.timestamp_micros()),
            topic: topic.into(),
            tenant_id: tenant_id.into(),
            data,
            timestamp: now,
        }
    }
}
