//! Retry delay computation for the mailbox loops.
//!
//! A [`BackoffPolicy`] is pure: it maps an attempt number to a delay and says
//! whether an attempt count is past the limit. [`RetryState`] is the per-loop
//! counter built on top of it; every retry loop owns its own.

use async_trait::async_trait;
use megagen_core::config::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// `min(base * 2^attempt, max_delay)` with no attempt limit
    pub fn exponential(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            max_attempts: u32::MAX,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Time spent sleeping by a loop that runs out of attempts
    pub fn total_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.next_delay(attempt))
            .try_fold(Duration::ZERO, Duration::checked_add)
            .unwrap_or(Duration::MAX)
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        BackoffPolicy::exponential(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
        .with_max_attempts(config.max_attempts)
    }
}

/// Attempt counter for one logical retry loop
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: BackoffPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of failed attempts recorded so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.policy.exhausted(self.attempt)
    }

    /// Count a failed attempt and return the delay to wait before the next one
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.policy.next_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}

/// Suspension point used between retries
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_exponential_table() {
        let policy = BackoffPolicy::exponential(ms(1_000), ms(30_000));
        let table = [
            (0, 1_000),
            (1, 2_000),
            (2, 4_000),
            (3, 8_000),
            (4, 16_000),
            (5, 30_000),
            (6, 30_000),
            (31, 30_000),
            (32, 30_000),
            (u32::MAX, 30_000),
        ];
        for (attempt, expected) in table {
            assert_eq!(policy.next_delay(attempt), ms(expected), "attempt {}", attempt);
        }
    }

    #[test]
    fn test_delay_bounded_and_non_decreasing() {
        let policy = BackoffPolicy::exponential(ms(1_500), ms(30_000));
        let mut previous = Duration::ZERO;
        for attempt in 0..100 {
            let delay = policy.next_delay(attempt);
            assert!(delay <= policy.max_delay());
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_total_delay() {
        let policy = BackoffPolicy::exponential(ms(1_000), ms(30_000)).with_max_attempts(20);
        // 1+2+4+8+16 seconds, then 14 capped sleeps
        assert_eq!(policy.total_delay(), ms(31_000 + 14 * 30_000));

        assert_eq!(policy.with_max_attempts(1).total_delay(), Duration::ZERO);
        assert_eq!(policy.with_max_attempts(0).total_delay(), Duration::ZERO);
    }

    #[test]
    fn test_exhausted_boundary() {
        for limit in [0, 1, 5, 20, 30] {
            let policy = BackoffPolicy::exponential(ms(10), ms(100)).with_max_attempts(limit);
            for attempt in 0..limit {
                assert!(!policy.exhausted(attempt));
            }
            assert!(policy.exhausted(limit));
            assert!(policy.exhausted(limit + 1));
        }
    }

    #[test]
    fn test_retry_state_counts() {
        let policy = BackoffPolicy::exponential(ms(100), ms(250)).with_max_attempts(3);
        let mut state = RetryState::new(policy);
        assert!(!state.exhausted());
        assert_eq!(state.record_failure(), ms(100));
        assert_eq!(state.record_failure(), ms(200));
        assert!(!state.exhausted());
        assert_eq!(state.record_failure(), ms(250));
        assert_eq!(state.attempt(), 3);
        assert!(state.exhausted());
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 20,
        };
        let policy = BackoffPolicy::from(&config);
        assert!(!policy.exhausted(19));
        assert!(policy.exhausted(20));
        assert_eq!(policy.next_delay(1), ms(2_000));
    }
}
