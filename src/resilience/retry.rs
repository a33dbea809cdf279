//! Retry policy with exponential backoff and jitter.
//!
//! The balancer never retries on its own; dispatchers use this policy to
//! decide whether and when to call `select_provider` again.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Retry decisions derived from `RetryConfig`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    multiplier: f64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            multiplier: config.backoff_multiplier.max(1.0),
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Whether a request that has already been retried `retry_count` times may retry again.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_ms = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `attempt`, plus 0-10% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let base_ms = base.as_millis() as u64;

        let jitter_range = base_ms / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(base_ms + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, multiplier: f64, cap: u64) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_retries: 3,
            base_delay_ms: base,
            backoff_multiplier: multiplier,
            max_delay_ms: cap,
        })
    }

    #[test]
    fn test_backoff_calculation() {
        let p = policy(100, 2.0, 2000);
        assert_eq!(p.base_delay(0).as_millis(), 0);
        assert_eq!(p.base_delay(1).as_millis(), 100);
        assert_eq!(p.base_delay(2).as_millis(), 200);
        assert_eq!(p.base_delay(3).as_millis(), 400);
        assert_eq!(p.base_delay(10).as_millis(), 2000);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let p = policy(100, 2.0, 1000);
        for _ in 0..100 {
            let d = p.delay_for_attempt(2).as_millis();
            assert!((200..220).contains(&d), "delay {}", d);
        }
    }

    #[test]
    fn test_should_retry() {
        let p = policy(100, 2.0, 1000);
        assert!(p.should_retry(0));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }
}
