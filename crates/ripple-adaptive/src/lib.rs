// Adaptive resource management for the ripple event server: a tracking
// allocator for heap accounting, the per-subscriber buffer size manager,
// and the publisher-side adaptive throttler.
//
// Everything here is read by many tasks and mutated only through atomics;
// none of these types take locks on their hot paths.

pub mod alloc;
pub mod buffer;
pub mod throttle;

pub use buffer::{AdaptiveBufferManager, MemorySampler, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use throttle::{AdaptiveThrottler, RuntimeLoad, SystemLoad, ThrottleConfig, ThrottlerMetrics};
