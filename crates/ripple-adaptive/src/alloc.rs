// Heap accounting via a wrapping global allocator.
//
// The buffer manager and the throttler both need an estimate of live heap
// usage. Rather than shelling out to the OS, the server binary installs
// `TrackingAllocator` as its `#[global_allocator]`; the counters here are
// process-wide statics so they can be read from any crate without wiring.
// When the allocator is not installed (unit tests, embedding), every
// counter reads zero and callers fall back to their configured defaults.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOCATED: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static PEAK_ALLOCATED: AtomicU64 = AtomicU64::new(0);

/// Drop-in wrapper around the system allocator that keeps live, cumulative,
/// and peak byte counters up to date.
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size() as u64);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size() as u64);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        ALLOCATED.fetch_sub(layout.size() as u64, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            ALLOCATED.fetch_sub(layout.size() as u64, Ordering::Relaxed);
            record_alloc(new_size as u64);
        }
        new_ptr
    }
}

fn record_alloc(bytes: u64) {
    let live = ALLOCATED.fetch_add(bytes, Ordering::Relaxed) + bytes;
    TOTAL_ALLOCATED.fetch_add(bytes, Ordering::Relaxed);
    // Lock-free high-water update; losing a race to a larger value is fine.
    loop {
        let peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
        if live <= peak {
            break;
        }
        if PEAK_ALLOCATED
            .compare_exchange(peak, live, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

/// Bytes currently live on the heap.
pub fn allocated_bytes() -> u64 {
    ALLOCATED.load(Ordering::Relaxed)
}

/// Cumulative bytes allocated over the process lifetime.
pub fn total_allocated_bytes() -> u64 {
    TOTAL_ALLOCATED.load(Ordering::Relaxed)
}

/// High-water mark of live heap bytes.
pub fn peak_allocated_bytes() -> u64 {
    PEAK_ALLOCATED.load(Ordering::Relaxed)
}
