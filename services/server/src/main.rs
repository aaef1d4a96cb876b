// Gateway service main entry point.
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ripple_adaptive::alloc::TrackingAllocator;
use ripple_adaptive::{AdaptiveBufferManager, AdaptiveThrottler, RuntimeLoad, ThrottleConfig};
use ripple_core::TopicManager;
use ripple_server::{app, config, observability};
use tokio::sync::Notify;

// Heap accounting for the buffer manager, the throttler's memory signal,
// and the health endpoint.
#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let metrics_handle = observability::init_observability();

    let config = config::ServerConfig::from_env_or_yaml().context("load server config")?;
    tracing::info!(
        address = %config.address,
        max_memory_mb = config.max_memory / (1024 * 1024),
        "configuration loaded"
    );

    let buffers = Arc::new(AdaptiveBufferManager::new(config.max_memory));
    buffers.start();
    tracing::info!("buffer manager started");

    let throttler = Arc::new(AdaptiveThrottler::new(
        ThrottleConfig::default(),
        Box::new(RuntimeLoad::new(config.max_memory)),
    ));
    tracing::info!("adaptive throttler initialized");

    let manager = TopicManager::new(Arc::clone(&buffers), Arc::clone(&throttler));
    tracing::info!("topic manager started");

    let state = app::AppState {
        manager: Arc::clone(&manager),
        buffers: Arc::clone(&buffers),
        throttler,
        started_at: Instant::now(),
        metrics_handle,
    };
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("bind {}", config.address))?;
    tracing::info!(address = %config.address, "server listening");

    let drain = Arc::new(Notify::new());
    let drain_signal = Arc::clone(&drain);
    let server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { drain_signal.notified().await })
            .await
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received; draining");

    // Close the delivery core first: cancelling every subscriber is what
    // lets the open WebSocket connections drain.
    drain.notify_one();
    manager.shutdown().await;
    buffers.stop();

    match tokio::time::timeout(SHUTDOWN_DEADLINE, server).await {
        Ok(result) => result.context("join server task")?.context("serve")?,
        Err(_) => tracing::warn!("graceful shutdown deadline exceeded"),
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
