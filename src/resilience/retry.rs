//! Retry Policy
//!
//! Bounded exponential backoff with jitter, shared by every gateway call.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Backoff policy parameterized by attempts, base delay, cap and jitter.
///
/// Delay before retry `n` (0-based) is `base * 2^n + U(0, jitter)`, capped at
/// `max_delay`. A server `Retry-After` hint replaces the exponential term but
/// is bounded by the same cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per call, including the first.
    pub max_attempts: u32,
    /// Base delay.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        DEFAULT_RETRY_POLICY
    }
}

/// Default retry policy.
pub const DEFAULT_RETRY_POLICY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(500),
    max_delay: Duration::from_secs(30),
    jitter: Duration::from_millis(250),
};

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt fits the budget after `attempts_made`.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts.max(1)
    }

    /// Exponential delay before retry number `retry` (0-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        let exponential = self.base_delay.saturating_mul(factor);
        self.bounded(exponential.saturating_add(self.random_jitter()))
    }

    /// Delay before retry number `retry`, honoring a server hint if present.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => self.bounded(hint.saturating_add(self.random_jitter())),
            None => self.backoff_delay(retry),
        }
    }

    fn bounded(&self, delay: Duration) -> Duration {
        delay.min(self.max_delay)
    }

    fn random_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = no_jitter();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(50),
            ..no_jitter()
        };
        for _ in 0..100 {
            let delay = policy.backoff_delay(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_retry_after_bounded_by_cap() {
        let policy = no_jitter();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_millis(700))),
            Duration::from_millis(700)
        );
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(120))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_attempt_budget() {
        let policy = no_jitter();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::none().allows_retry(1));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }
}
