//! Work queue with rate-limited requeues.

use crate::queue::WorkQueue;
use crate::rate_limiter::{RateLimiter, default_controller_rate_limiter};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A [`WorkQueue`] that knows how to put failed items back with a growing delay.
pub struct RateLimitingQueue<T> {
    queue: WorkQueue<T>,
    rate_limiter: Arc<dyn RateLimiter<T>>,
}

impl<T> Clone for RateLimitingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            rate_limiter: Arc::clone(&self.rate_limiter),
        }
    }
}

impl<T> fmt::Debug for RateLimitingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitingQueue")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl<T> Default for RateLimitingQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(default_controller_rate_limiter())
    }
}

impl<T> RateLimitingQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Creates an empty queue using `rate_limiter` for requeue delays.
    #[must_use]
    pub fn new(rate_limiter: Arc<dyn RateLimiter<T>>) -> Self {
        Self {
            queue: WorkQueue::new(),
            rate_limiter,
        }
    }

    /// See [`WorkQueue::add`].
    pub fn add(&self, item: T) {
        self.queue.add(item);
    }

    /// See [`WorkQueue::get`].
    pub async fn get(&self) -> Option<T> {
        self.queue.get().await
    }

    /// See [`WorkQueue::done`].
    pub fn done(&self, item: &T) {
        self.queue.done(item);
    }

    /// See [`WorkQueue::add_after`].
    pub fn add_after(&self, item: T, delay: Duration) {
        self.queue.add_after(item, delay);
    }

    /// Adds `item` back after the delay the rate limiter picks for it.
    /// Each call counts as one more failure for the item. If a newer payload
    /// for the item is waiting when the delay ends, that payload is kept.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.rate_limiter.when(&item);
        trace!(?delay, "Requeueing item rate limited");
        self.queue.add_after(item, delay);
    }

    /// Stops tracking failures for `item`; its next failure starts from scratch.
    pub fn forget(&self, item: &T) {
        self.rate_limiter.forget(item);
    }

    /// Number of rate-limited requeues of `item` since it was last forgotten.
    #[must_use]
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.rate_limiter.num_requeues(item)
    }

    /// See [`WorkQueue::shut_down`].
    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    /// See [`WorkQueue::is_shutting_down`].
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }

    /// See [`WorkQueue::len`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// See [`WorkQueue::is_empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
