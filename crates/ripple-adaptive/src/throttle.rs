// Publisher-side adaptive throttling.
//
// The throttler is a best-effort advisory: it never errors and never
// blocks anything other than the publisher that chose to consult it. The
// decision combines the share of slow subscribers (pushed in by the topic
// manager's monitor loop) with CPU and memory signals sampled through a
// pluggable [`SystemLoad`] source, so tests can inject pressure and
// production can swap in real OS measurements.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::alloc;

/// Fixed-point scale for the stored CPU/memory fractions.
const SIGNAL_SCALE: f64 = 1_000_000.0;

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub slow_sub_threshold: f64,
    pub throttle_duration: Duration,
    pub check_interval: Duration,
    pub min_publish_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 0.80,
            memory_threshold: 0.80,
            slow_sub_threshold: 0.50,
            throttle_duration: Duration::from_secs(5),
            check_interval: Duration::from_secs(1),
            min_publish_interval: Duration::from_millis(10),
        }
    }
}

/// CPU and memory pressure signals, both in `[0, 1]`.
pub trait SystemLoad: Send + Sync {
    fn cpu_fraction(&self) -> f64;
    fn memory_fraction(&self) -> f64;
}

/// Default signal source: alive-task count as a CPU proxy, tracked heap
/// usage against the configured ceiling as a memory proxy.
pub struct RuntimeLoad {
    max_memory: u64,
}

impl RuntimeLoad {
    pub fn new(max_memory: u64) -> Self {
        Self { max_memory }
    }
}

impl SystemLoad for RuntimeLoad {
    fn cpu_fraction(&self) -> f64 {
        let tasks = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.metrics().num_alive_tasks(),
            Err(_) => 0,
        };
        // Crude bucketing of task count into a load fraction.
        if tasks > 10_000 {
            0.9
        } else if tasks > 5_000 {
            0.7
        } else if tasks > 1_000 {
            0.5
        } else {
            tasks as f64 / 1_000.0
        }
    }

    fn memory_fraction(&self) -> f64 {
        if self.max_memory == 0 {
            return 0.0;
        }
        (alloc::allocated_bytes() as f64 / self.max_memory as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThrottlerMetrics {
    pub is_throttling: bool,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub slow_subscribers: usize,
    pub total_subscribers: usize,
}

pub struct AdaptiveThrottler {
    config: ThrottleConfig,
    load: Box<dyn SystemLoad>,
    // Shared with the one-shot disarm task, so arming needs no handle to
    // the throttler itself.
    is_throttling: Arc<AtomicBool>,
    // Millis since `epoch`; avoids widening Instant into the atomic.
    last_check_ms: AtomicU64,
    slow_subscribers: AtomicUsize,
    total_subscribers: AtomicUsize,
    last_cpu: AtomicU64,
    last_memory: AtomicU64,
    epoch: Instant,
}

impl AdaptiveThrottler {
    pub fn new(config: ThrottleConfig, load: Box<dyn SystemLoad>) -> Self {
        Self {
            config,
            load,
            is_throttling: Arc::new(AtomicBool::new(false)),
            last_check_ms: AtomicU64::new(0),
            slow_subscribers: AtomicUsize::new(0),
            total_subscribers: AtomicUsize::new(0),
            last_cpu: AtomicU64::new(0),
            last_memory: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Push the latest subscriber census. Called by the topic manager's
    /// monitor loop; this is the only control-plane input.
    pub fn update_subscribers(&self, slow: usize, total: usize) {
        self.slow_subscribers.store(slow, Ordering::Relaxed);
        self.total_subscribers.store(total, Ordering::Relaxed);
    }

    /// Current throttle decision.
    ///
    /// An armed window short-circuits to `true`. Otherwise the decision is
    /// re-evaluated at most once per `check_interval`: the cached value is
    /// returned between checks, and a fresh sample of the load signals is
    /// combined with the slow-subscriber share on expiry.
    pub fn should_throttle(&self) -> bool {
        if self.is_throttling.load(Ordering::Relaxed) {
            return true;
        }

        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last_ms = self.last_check_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last_ms) < self.config.check_interval.as_millis() as u64 {
            return self.is_throttling.load(Ordering::Relaxed);
        }
        self.last_check_ms.store(now_ms, Ordering::Relaxed);

        let cpu = self.load.cpu_fraction();
        let memory = self.load.memory_fraction();
        self.last_cpu.store((cpu * SIGNAL_SCALE) as u64, Ordering::Relaxed);
        self.last_memory
            .store((memory * SIGNAL_SCALE) as u64, Ordering::Relaxed);

        let slow = self.slow_subscribers.load(Ordering::Relaxed);
        let total = self.total_subscribers.load(Ordering::Relaxed);
        if total == 0 {
            return false;
        }

        let slow_share = slow as f64 / total as f64;
        let decision = slow_share > self.config.slow_sub_threshold
            && (cpu > self.config.cpu_threshold || memory > self.config.memory_threshold);

        if decision {
            self.arm();
        }
        decision
    }

    /// Delay the caller by `min_publish_interval` while a window is armed.
    pub async fn apply_throttle(&self) {
        if self.is_throttling.load(Ordering::Relaxed) {
            tokio::time::sleep(self.config.min_publish_interval).await;
        }
    }

    pub fn is_throttling(&self) -> bool {
        self.is_throttling.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> ThrottlerMetrics {
        ThrottlerMetrics {
            is_throttling: self.is_throttling(),
            cpu_usage: self.last_cpu.load(Ordering::Relaxed) as f64 / SIGNAL_SCALE,
            memory_usage: self.last_memory.load(Ordering::Relaxed) as f64 / SIGNAL_SCALE,
            slow_subscribers: self.slow_subscribers.load(Ordering::Relaxed),
            total_subscribers: self.total_subscribers.load(Ordering::Relaxed),
        }
    }

    // Arm the throttle window and schedule the one-shot disarm. Re-arming
    // during an active window is a no-op; the window is never extended.
    fn arm(&self) {
        if self.is_throttling.swap(true, Ordering::Relaxed) {
            return;
        }
        tracing::info!(
            duration_ms = self.config.throttle_duration.as_millis() as u64,
            "publish throttling armed"
        );
        metrics::counter!("ripple_throttle_armed_total").increment(1);
        let flag = Arc::clone(&self.is_throttling);
        let window = self.config.throttle_duration;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            flag.store(false, Ordering::Relaxed);
            tracing::debug!("publish throttling disarmed");
        });
    }
}
