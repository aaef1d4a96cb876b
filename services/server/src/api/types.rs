//! Request and response shapes for the gateway API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    // Both fields are validated by the handler so their absence maps to a
    // 400 rather than a deserialization rejection.
    pub topic: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: String,
    pub topics: usize,
    pub subscribers: usize,
    pub tasks: usize,
    pub memory: MemoryStats,
}

#[derive(Debug, Serialize)]
pub struct MemoryStats {
    pub alloc_mb: f64,
    pub total_alloc_mb: f64,
    pub peak_alloc_mb: f64,
}
