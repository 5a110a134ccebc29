//! Bounded retry for optimistic-concurrency conflicts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

impl core::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            other => Err(format!("unknown backoff strategy '{other}'")),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0) to spread out colliding writers
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Run once, surface the first conflict.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed), before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32 << attempt.saturating_sub(1).min(20);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay.max(self.base_delay))
    }

    /// `delay_for_attempt` spread by up to `jitter` of itself in either direction,
    /// so writers that collided once do not collide again in lockstep.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let spread = delay.mul_f64(self.jitter.clamp(0.0, 1.0));
        if spread.is_zero() {
            return delay;
        }
        (delay + spread.mul_f64(2.0 * rand::random::<f64>())).saturating_sub(spread)
    }

    /// Whether another attempt is allowed after `attempt` attempts have failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. Each attempt must reload whatever state it depends on.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: impl FnMut() -> ServiceResult<T>,
) -> ServiceResult<T> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.jittered_delay(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "conflict, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(operation, attempt, error = %err, "retries exhausted");
                }
                return Err(err);
            }
            Ok(value) => return Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use stockledger_core::DomainError;

    #[test]
    fn exponential_delay_is_capped() {
        let mut policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        policy.jitter = 0.0;

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(50));
    }

    #[test]
    fn jitter_stays_within_its_spread() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::fixed(3, Duration::from_millis(100))
        };
        for attempt in 1..=3 {
            let d = policy.jittered_delay(attempt);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150), "{d:?}");
        }
        assert_eq!(RetryPolicy::fixed(3, Duration::ZERO).jittered_delay(1), Duration::ZERO);
    }

    #[test]
    fn retries_conflicts_until_success() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let mut calls = 0;
        let out = with_retry(&policy, "test", || {
            calls += 1;
            if calls < 3 {
                Err(ServiceError::from(DomainError::conflict("stale")))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out, Ok(3));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::fixed(2, Duration::ZERO);
        let mut calls = 0;
        let out: ServiceResult<()> = with_retry(&policy, "test", || {
            calls += 1;
            Err(ServiceError::from(DomainError::conflict("stale")))
        });
        assert!(out.is_err_and(|e| e.is_retryable()));
        assert_eq!(calls, 2);
    }

    #[test]
    fn domain_failures_are_not_retried() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let mut calls = 0;
        let out: ServiceResult<()> = with_retry(&policy, "test", || {
            calls += 1;
            Err(ServiceError::from(DomainError::validation("bad")))
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("Linear".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Linear));
        assert!("random".parse::<BackoffStrategy>().is_err());
    }
}
