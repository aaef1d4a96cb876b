//! Gateway application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use ripple_adaptive::{AdaptiveBufferManager, AdaptiveThrottler};
use ripple_core::TopicManager;
use tower_http::trace::TraceLayer;

use crate::api;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TopicManager>,
    pub buffers: Arc<AdaptiveBufferManager>,
    pub throttler: Arc<AdaptiveThrottler>,
    pub started_at: Instant,
    pub metrics_handle: PrometheusHandle,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .route("/", get(api::system::index))
        .route("/publish", post(api::publish::publish))
        .route("/subscribe", get(api::subscribe::subscribe))
        .route("/health", get(api::system::health))
        .route("/metrics", get(api::system::manager_metrics))
        .route("/metrics/prometheus", get(api::system::prometheus_metrics))
        .layer(axum::middleware::from_fn(api::tenant::resolve_tenant))
        .layer(trace_layer)
        .with_state(state)
}
