//! Runtime configuration for the ledger services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{BackoffStrategy, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Applied to every operation that can hit an optimistic conflict.
    pub retry: RetryPolicy,
    /// Reorder scan threshold when the caller does not pass one.
    pub default_threshold_percent: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            default_threshold_percent: 100,
        }
    }
}

impl LedgerConfig {
    /// Load from `STOCKLEDGER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_attempts = parse_or(
            &lookup,
            "STOCKLEDGER_RETRY_MAX_ATTEMPTS",
            defaults.retry.max_attempts,
        );
        let base_delay_ms = parse_or(
            &lookup,
            "STOCKLEDGER_RETRY_BASE_DELAY_MS",
            defaults.retry.base_delay.as_millis() as u64,
        );
        let max_delay_ms = parse_or(
            &lookup,
            "STOCKLEDGER_RETRY_MAX_DELAY_MS",
            defaults.retry.max_delay.as_millis() as u64,
        );
        let strategy: BackoffStrategy =
            parse_or(&lookup, "STOCKLEDGER_RETRY_STRATEGY", defaults.retry.strategy);
        let threshold = parse_or(
            &lookup,
            "STOCKLEDGER_REORDER_THRESHOLD_PERCENT",
            defaults.default_threshold_percent,
        );

        let max_attempts = if max_attempts == 0 {
            tracing::warn!("STOCKLEDGER_RETRY_MAX_ATTEMPTS must be at least 1; using 1");
            1
        } else {
            max_attempts
        };

        Self {
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms.max(base_delay_ms)),
                strategy,
                jitter: defaults.retry.jitter,
            },
            default_threshold_percent: threshold,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: core::str::FromStr + core::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, ?default, "invalid config value; using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = LedgerConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(5));
        assert_eq!(cfg.retry.max_delay, Duration::from_millis(200));
    }

    #[test]
    fn reads_overrides() {
        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("STOCKLEDGER_RETRY_MAX_ATTEMPTS", "3"),
            ("STOCKLEDGER_RETRY_BASE_DELAY_MS", "1"),
            ("STOCKLEDGER_RETRY_MAX_DELAY_MS", "8"),
            ("STOCKLEDGER_RETRY_STRATEGY", "linear"),
            ("STOCKLEDGER_REORDER_THRESHOLD_PERCENT", "120"),
        ]));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(1));
        assert_eq!(cfg.retry.max_delay, Duration::from_millis(8));
        assert_eq!(cfg.retry.strategy, BackoffStrategy::Linear);
        assert_eq!(cfg.default_threshold_percent, 120);
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("STOCKLEDGER_RETRY_MAX_ATTEMPTS", "lots"),
            ("STOCKLEDGER_RETRY_STRATEGY", "random"),
        ]));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.strategy, BackoffStrategy::Exponential);
    }
}
