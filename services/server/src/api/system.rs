//! System endpoints: index, health, and the metrics readers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use ripple_adaptive::alloc;
use ripple_core::ManagerMetrics;

use crate::api::types::{HealthResponse, MemoryStats};
use crate::app::AppState;

pub async fn index() -> &'static str {
    "ripple event streaming server\n\n\
     Endpoints:\n\
    \x20 POST /publish             - Publish a message\n\
    \x20 WS   /subscribe?topic=    - Subscribe to a topic\n\
    \x20 GET  /health              - Health check\n\
    \x20 GET  /metrics             - System metrics\n\
    \x20 GET  /metrics/prometheus  - Prometheus metrics\n"
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let tasks = tokio::runtime::Handle::current()
        .metrics()
        .num_alive_tasks();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime: format!("{:?}", state.started_at.elapsed()),
        topics: state.manager.topic_count().await,
        subscribers: state.manager.total_subscriber_count().await,
        tasks,
        memory: MemoryStats {
            alloc_mb: to_mb(alloc::allocated_bytes()),
            total_alloc_mb: to_mb(alloc::total_allocated_bytes()),
            peak_alloc_mb: to_mb(alloc::peak_allocated_bytes()),
        },
    })
}

pub async fn manager_metrics(State(state): State<AppState>) -> Json<ManagerMetrics> {
    Json(state.manager.metrics().await)
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
