//! Work queue for reconciliation controllers
//!
//! Decouples "a change was observed" from "a change is being worked on":
//! producers add items, workers take them one at a time, and failed items go
//! back in with a growing delay.
//!
//! # Example
//!
//! ```no_run
//! use workqueue::RateLimitingQueue;
//!
//! # async fn example() {
//! let queue: RateLimitingQueue<String> = RateLimitingQueue::default();
//! queue.add("default/web-0".to_string());
//!
//! while let Some(key) = queue.get().await {
//!     let result: Result<(), ()> = Ok(()); // reconcile `key` here
//!     match result {
//!         Ok(()) => queue.forget(&key),
//!         Err(()) => queue.add_rate_limited(key.clone()),
//!     }
//!     queue.done(&key);
//! }
//! # }
//! ```
//!
//! # Features
//!
//! - **Coalescing**: at most one pending entry per item; the latest payload wins
//! - **Per-item exclusivity**: an item is never handed to two workers at once
//! - **Delayed adds**: `add_after` with timers cancelled on shutdown; a fired
//!   timer never replaces a payload that is already waiting
//! - **Rate limiting**: per-item exponential backoff combined with an overall token bucket

pub mod backoff;
pub mod queue;
pub mod rate_limiter;
pub mod rate_limiting;

pub use backoff::ExponentialBackoff;
pub use queue::WorkQueue;
pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};
pub use rate_limiting::RateLimitingQueue;
