//! Exponential backoff policy for failed webhook jobs.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Retry policy for webhook processing.
///
/// Delays grow exponentially from `base_delay`, capped at `max_delay`,
/// with random jitter to spread redeliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of processing attempts (including the first).
    pub max_attempts: i32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any retry delay.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.25,
        }
    }
}

/// Outcome of a retry decision for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redeliver the job after the given delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// Stop retrying.
    GiveUp {
        /// Why the job will not run again.
        reason: String,
    },
}

impl RetryPolicy {
    /// Decides whether a job that just failed its `attempt`-th try (1-based)
    /// should be redelivered.
    pub fn decide(&self, attempt: i32, error: &JobError) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.max_attempts),
            };
        }

        if !error.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable error: {error}") };
        }

        RetryDecision::Retry { delay: self.delay_for_attempt(attempt) }
    }

    /// Delay after the `attempt`-th failure (1-based): base * 2^(attempt-1),
    /// capped, then jittered.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(0).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let capped = std::cmp::min(self.base_delay * multiplier, self.max_delay);

        std::cmp::min(apply_jitter(capped, self.jitter_factor), self.max_delay)
    }
}

/// Randomizes a delay by plus or minus `jitter_factor` to avoid
/// synchronized redelivery spikes.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() }
    }

    #[test]
    fn delays_double_per_attempt() {
        let policy = no_jitter();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn delays_cap_at_max_delay() {
        let policy = no_jitter();

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let policy = no_jitter();

        match policy.decide(3, &JobError::remote("timeout")) {
            RetryDecision::GiveUp { reason } => assert!(reason.contains("maximum attempts")),
            RetryDecision::Retry { .. } => unreachable!("should not retry at max attempts"),
        }
    }

    #[test]
    fn gives_up_on_non_retryable_errors() {
        let policy = no_jitter();

        match policy.decide(1, &JobError::Cancelled) {
            RetryDecision::GiveUp { reason } => assert!(reason.contains("non-retryable")),
            RetryDecision::Retry { .. } => unreachable!("should not retry cancellation"),
        }
    }

    #[test]
    fn retries_retryable_errors_within_budget() {
        let policy = no_jitter();

        assert_eq!(
            policy.decide(1, &JobError::remote("timeout")),
            RetryDecision::Retry { delay: Duration::from_secs(1) }
        );
        assert_eq!(
            policy.decide(2, &JobError::handler("flaky")),
            RetryDecision::Retry { delay: Duration::from_secs(2) }
        );
    }

    #[test]
    fn jitter_varies_delay_within_bounds() {
        let base = Duration::from_secs(10);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..20 {
            let jittered = apply_jitter(base, 0.5);
            assert!(jittered >= Duration::from_secs(5));
            assert!(jittered <= Duration::from_secs(15));
            seen.insert(jittered.as_millis());
        }

        assert!(seen.len() > 1, "jitter should create variation");
    }
}
