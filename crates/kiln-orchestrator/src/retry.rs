//! Retry policy for scheduler calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries. Zero fails on the first error.
    pub max_retries: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self { max_retries, initial_delay, max_delay, multiplier }
    }

    /// Calculate the delay for a given retry attempt.
    ///
    /// Uses exponential backoff: initial_delay * multiplier^retry_count, capped at max_delay.
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let delay_ms = (self.initial_delay.as_millis() as f64 * self.multiplier.powi(retry_count as i32))
            .min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    #[must_use]
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fails_fast() {
        let policy = RetryPolicy::default();
        assert!(!policy.allows_retry(0));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500), 2.0);
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(500));
        assert!(policy.allows_retry(4));
        assert!(!policy.allows_retry(5));
    }
}
