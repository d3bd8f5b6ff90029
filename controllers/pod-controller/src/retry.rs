//! Retry budget for failed reconciliations.
//!
//! The delay between attempts comes from the queue's rate limiter; this
//! module only decides whether another attempt is allowed.

/// Default number of rate-limited requeues per key before it is dropped.
pub const MAX_RETRIES: u32 = 5;

/// What to do with an item whose reconciliation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put it back with a rate-limited delay
    Requeue,
    /// Give up and forget its failure history
    Drop,
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Allows `max_retries` requeues per key after its first failure, so a
    /// key is reconciled at most `max_retries + 1` times in a row.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Number of requeues allowed per key.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides what to do after a failure, given how many times the key has
    /// already been requeued.
    #[must_use]
    pub fn decide(&self, previous_requeues: u32) -> RetryDecision {
        if previous_requeues < self.max_retries {
            RetryDecision::Requeue
        } else {
            RetryDecision::Drop
        }
    }
}
