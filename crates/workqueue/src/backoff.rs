//! # Exponential Backoff
//!
//! Provides the exponential backoff math used by the per-item failure rate limiter.
//! Each consecutive failure doubles the delay, starting at a base delay and capped
//! at a maximum: base, base*2, base*4, ... max.

use std::time::Duration;

/// Exponential backoff calculator
///
/// Holds no failure counter of its own: the rate limiters keep one per item
/// and ask for the delay that matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay for the first failure
    base: Duration,
    /// Upper bound for any delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given base and maximum delays
    ///
    /// # Arguments
    ///
    /// * `base` - Delay returned for the first failure
    /// * `max` - Cap for every later delay
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Calculate the backoff for a given number of previous failures
    ///
    /// `failures == 0` yields `base`, `failures == 1` yields `base * 2`, and so on.
    /// Overflow of the multiplication saturates to `max`.
    #[must_use]
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        let factor = match 2u32.checked_pow(failures) {
            Some(factor) => factor,
            None => return self.max,
        };

        match self.base.checked_mul(factor) {
            Some(delay) if delay <= self.max => delay,
            _ => self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1));

        let delays: Vec<Duration> = (0..5).map(|n| backoff.delay_for_failures(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(backoff.delay_for_failures(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_failures(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_failures(2), Duration::from_millis(400));
        // Next would be 800ms, but should be capped at 500ms
        assert_eq!(backoff.delay_for_failures(3), Duration::from_millis(500));
        assert_eq!(backoff.delay_for_failures(4), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_for_failures_saturates_on_overflow() {
        let max = Duration::from_secs(1000);
        assert_eq!(
            ExponentialBackoff::new(Duration::from_millis(5), max).delay_for_failures(64),
            max
        );
        assert_eq!(
            ExponentialBackoff::new(Duration::from_secs(1), max).delay_for_failures(31),
            max
        );
    }
}
