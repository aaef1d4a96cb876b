// Global subscriber accounting and adaptive per-subscriber buffer sizing.
//
// Every subscriber samples `buffer_size()` once at creation time and keeps
// that inbox capacity for its lifetime; the manager only adjusts the value
// handed to *future* subscribers. The recalculation loop divides the heap
// headroom among current subscribers and clamps the result, so the read
// path on subscribe stays a single atomic load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::alloc;

/// Lower clamp for a subscriber inbox, in messages.
pub const MIN_BUFFER_SIZE: usize = 100;
/// Upper clamp for a subscriber inbox, in messages.
pub const MAX_BUFFER_SIZE: usize = 1000;

const RECALC_INTERVAL: Duration = Duration::from_secs(5);
const AVG_MESSAGE_SIZE: u64 = 1024;

/// Source of the live-heap estimate used by the recalculation loop.
///
/// The default reads the tracking allocator; tests inject fixed values.
pub trait MemorySampler: Send + Sync {
    fn allocated_bytes(&self) -> u64;
}

struct HeapSampler;

impl MemorySampler for HeapSampler {
    fn allocated_bytes(&self) -> u64 {
        alloc::allocated_bytes()
    }
}

// Cloning shares the underlying counters; the recalculation worker is just
// another clone of the handle.
#[derive(Clone)]
pub struct AdaptiveBufferManager {
    max_total_memory: u64,
    subscriber_count: Arc<AtomicUsize>,
    buffer_size: Arc<AtomicUsize>,
    sampler: Arc<dyn MemorySampler>,
    stop_tx: watch::Sender<bool>,
}

impl AdaptiveBufferManager {
    pub fn new(max_total_memory: u64) -> Self {
        Self::with_sampler(max_total_memory, Arc::new(HeapSampler))
    }

    pub fn with_sampler(max_total_memory: u64, sampler: Arc<dyn MemorySampler>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            max_total_memory,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
            buffer_size: Arc::new(AtomicUsize::new(MAX_BUFFER_SIZE)),
            sampler,
            stop_tx,
        }
    }

    /// Spawn the periodic recalculation loop. Runs until [`stop`] is called.
    ///
    /// [`stop`]: AdaptiveBufferManager::stop
    pub fn start(&self) {
        let worker = self.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RECALC_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => worker.recalculate(),
                    _ = stop_rx.changed() => return,
                }
            }
        });
    }

    /// Signal the recalculation loop to exit. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Divide heap headroom among current subscribers, clamp, and publish.
    ///
    /// With no subscribers there is nothing to size, so the previous value
    /// is left in place for the next subscriber to sample.
    pub fn recalculate(&self) {
        let subscribers = self.subscriber_count.load(Ordering::Relaxed);
        if subscribers == 0 {
            return;
        }

        let allocated = self.sampler.allocated_bytes();
        let available = self.max_total_memory.saturating_sub(allocated);
        let per_subscriber = (available / subscribers as u64 / AVG_MESSAGE_SIZE) as usize;
        let clamped = per_subscriber.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);

        let previous = self.buffer_size.swap(clamped, Ordering::Relaxed);
        if previous != clamped {
            tracing::debug!(
                previous,
                current = clamped,
                subscribers,
                allocated,
                "adaptive buffer size updated"
            );
        }
        metrics::gauge!("ripple_buffer_size").set(clamped as f64);
    }

    /// The inbox capacity a subscriber created right now should use.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::Relaxed)
    }

    pub fn on_subscriber_added(&self) {
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_subscriber_removed(&self) {
        // Saturating: an unbalanced removal must not wrap the counter.
        let _ = self
            .subscriber_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSampler(u64);

    impl MemorySampler for FixedSampler {
        fn allocated_bytes(&self) -> u64 {
            self.0
        }
    }

    fn manager_with(max_total: u64, allocated: u64) -> AdaptiveBufferManager {
        AdaptiveBufferManager::with_sampler(max_total, Arc::new(FixedSampler(allocated)))
    }

    #[test]
    fn starts_at_max_buffer_size() {
        let manager = manager_with(2 * 1024 * 1024 * 1024, 0);
        assert_eq!(manager.buffer_size(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn recalculate_without_subscribers_keeps_current_value() {
        let manager = manager_with(1024, 1024);
        manager.recalculate();
        assert_eq!(manager.buffer_size(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn recalculate_clamps_to_min_under_pressure() {
        // All memory consumed: headroom is zero, so the floor applies.
        let manager = manager_with(1024 * 1024, 1024 * 1024);
        manager.on_subscriber_added();
        manager.recalculate();
        assert_eq!(manager.buffer_size(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn recalculate_clamps_to_max_with_headroom() {
        let manager = manager_with(8 * 1024 * 1024 * 1024, 0);
        manager.on_subscriber_added();
        manager.recalculate();
        assert_eq!(manager.buffer_size(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn recalculate_divides_headroom_between_subscribers() {
        // 1 GiB of headroom over 2048 subscribers at 1 KiB per message
        // lands mid-range: 1 GiB / 2048 / 1024 = 512.
        let manager = manager_with(1024 * 1024 * 1024, 0);
        for _ in 0..2048 {
            manager.on_subscriber_added();
        }
        manager.recalculate();
        assert_eq!(manager.buffer_size(), 512);
    }

    #[test]
    fn clones_share_one_ledger() {
        let manager = manager_with(1024, 0);
        let other = manager.clone();
        manager.on_subscriber_added();
        assert_eq!(other.subscriber_count(), 1);
    }

    #[test]
    fn subscriber_ledger_tracks_add_and_remove() {
        let manager = manager_with(1024, 0);
        manager.on_subscriber_added();
        manager.on_subscriber_added();
        manager.on_subscriber_removed();
        assert_eq!(manager.subscriber_count(), 1);
        manager.on_subscriber_removed();
        // Extra removals must not wrap.
        manager.on_subscriber_removed();
        assert_eq!(manager.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn start_and_stop_are_clean() {
        let manager = manager_with(1024 * 1024, 0);
        manager.start();
        manager.stop();
        // A second stop is a no-op.
        manager.stop();
    }
}
