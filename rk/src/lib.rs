//! RequestKit - request-shaping primitives for flaky networks
//!
//! Small, dependency-light building blocks used by everything that talks
//! to a backend:
//!
//! - [`backoff`] - retry with exponential backoff and jitter
//! - [`cache`] - TTL cache for read responses
//! - [`tracker`] - in-flight request coalescing (deduplication)
//! - [`throttle`] / [`debounce`] - call-rate shaping with cancel support

pub mod backoff;
pub mod cache;
pub mod debounce;
pub mod throttle;
pub mod tracker;

pub use backoff::{BackoffPolicy, retry_with_backoff};
pub use cache::RequestCache;
pub use debounce::Debounce;
pub use throttle::Throttle;
pub use tracker::{RequestTracker, TrackError};
