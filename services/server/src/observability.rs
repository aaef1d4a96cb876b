use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber and the Prometheus metrics recorder.
/// Returns the handle the gateway uses to render `/metrics/prometheus`.
pub fn init_observability() -> PrometheusHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    PrometheusBuilder::new()
        .install_recorder()
        .expect("install metrics recorder")
}

/// A render-only handle for tests, without touching the global recorder.
pub fn test_metrics_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
