//! Retry back-off computation and rule matching.
//!
//! Delays follow `IntervalSeconds * BackoffRate^(attempt-1)`, bounded by
//! the rule's `MaxDelaySeconds` and then by the simulator-wide cap (100 ms
//! by default) — a local simulator must never sleep for minutes. The
//! pre-cap value is preserved in the execution record so tests can assert
//! on the schedule the service would have used.

use rand::RngExt;

use crate::asl::{JitterStrategy, RetryRule};
use crate::errors::StatesError;

/// A computed back-off: what the service would wait vs. what we sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffDelay {
    pub backoff_ms: u64,
    pub slept_ms: u64,
}

/// Compute the delay before retry number `attempt` (1-based) under `rule`.
pub fn compute_backoff(rule: &RetryRule, attempt: u32, cap_ms: u64) -> BackoffDelay {
    let exponent = attempt.saturating_sub(1);
    let mut seconds = rule.interval_seconds * rule.backoff_rate.powi(exponent as i32);
    if let Some(max_delay) = rule.max_delay_seconds {
        seconds = seconds.min(max_delay);
    }
    if rule.jitter_strategy == JitterStrategy::Full {
        seconds = rand::rng().random_range(0.0..=seconds.max(0.0));
    }
    let backoff_ms = (seconds * 1000.0).max(0.0).round() as u64;
    BackoffDelay {
        backoff_ms,
        slept_ms: backoff_ms.min(cap_ms),
    }
}

/// Find the first Retry rule that matches `fault` and still has attempts
/// left. `attempts_used` is indexed alongside `rules`.
pub fn find_retry<'a>(
    rules: &'a [RetryRule],
    fault: &StatesError,
    attempts_used: &[u32],
) -> Option<(usize, &'a RetryRule)> {
    rules.iter().enumerate().find(|(index, rule)| {
        rule.error_equals
            .iter()
            .any(|name| name == StatesError::ALL || *name == fault.error)
            && attempts_used[*index] < rule.max_attempts
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(interval: f64, max_attempts: u32, backoff: f64) -> RetryRule {
        RetryRule {
            error_equals: vec![StatesError::TASK_FAILED.to_string()],
            interval_seconds: interval,
            max_attempts,
            backoff_rate: backoff,
            max_delay_seconds: None,
            jitter_strategy: JitterStrategy::None,
        }
    }

    #[test]
    fn backoff_grows_exponentially_but_sleep_is_capped() {
        let rule = rule(1.0, 5, 2.0);
        let first = compute_backoff(&rule, 1, 100);
        let third = compute_backoff(&rule, 3, 100);
        assert_eq!(first.backoff_ms, 1000);
        assert_eq!(first.slept_ms, 100);
        assert_eq!(third.backoff_ms, 4000);
        assert_eq!(third.slept_ms, 100);
    }

    #[test]
    fn max_delay_bounds_the_precap_value() {
        let mut rule = rule(10.0, 3, 3.0);
        rule.max_delay_seconds = Some(15.0);
        let delay = compute_backoff(&rule, 2, 100);
        assert_eq!(delay.backoff_ms, 15_000);
    }

    #[test]
    fn full_jitter_stays_within_the_base() {
        let mut rule = rule(1.0, 3, 2.0);
        rule.jitter_strategy = JitterStrategy::Full;
        for _ in 0..32 {
            let delay = compute_backoff(&rule, 2, 100);
            assert!(delay.backoff_ms <= 2000);
        }
    }

    #[test]
    fn rules_are_consulted_in_order_with_budgets() {
        let rules = vec![rule(1.0, 1, 2.0), rule(1.0, 2, 2.0)];
        let fault = StatesError::task_failed("boom");
        let found = find_retry(&rules, &fault, &[0, 0]).unwrap();
        assert_eq!(found.0, 0);
        // First rule exhausted: the next matching rule takes over.
        let found = find_retry(&rules, &fault, &[1, 0]).unwrap();
        assert_eq!(found.0, 1);
        assert!(find_retry(&rules, &fault, &[1, 2]).is_none());
    }

    #[test]
    fn wildcard_rule_matches_custom_faults() {
        let mut wildcard = rule(1.0, 3, 2.0);
        wildcard.error_equals = vec![StatesError::ALL.to_string()];
        let fault = StatesError::new("Custom.Kaboom", "oh no");
        assert!(find_retry(&[wildcard], &fault, &[0]).is_some());
    }
}
