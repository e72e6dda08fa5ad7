//! Error policy for failed steps.
//!
//! Maps a step's `on_error` directive and its failure to a decision for the
//! enclosing scope.

use std::time::Duration;

use crate::blueprint::OnError;
use crate::error::StepError;

/// Backoff for the per-step `on_error: retry` flag.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Re-attempts after the first failure.
    pub max_retries: u32,

    /// Delay before the first re-attempt.
    pub initial_delay: Duration,

    /// Cap on any single delay.
    pub max_delay: Duration,

    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Policy that never re-attempts.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before re-attempt number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        if capped.is_finite() && capped > 0.0 {
            Duration::from_millis(capped as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        }
    }
}

/// What the enclosing scope does after a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Proceed to the next sibling.
    Continue,
    /// Abort the enclosing scope.
    Stop,
    /// Re-attempt the same step after `delay`.
    Retry { delay: Duration },
}

/// Decides how failures propagate.
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    retry: RetryPolicy,
}

impl ErrorPolicy {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Decide what happens after `error`.
    ///
    /// `retries` is how many re-attempts of this step already ran. With
    /// `fail_fast` set, `continue` is treated as `stop`. Fatal errors always stop.
    pub fn decide(
        &self,
        on_error: OnError,
        error: &StepError,
        retries: u32,
        fail_fast: bool,
    ) -> PolicyDecision {
        if error.is_fatal() {
            return PolicyDecision::Stop;
        }

        match on_error {
            OnError::Continue if fail_fast => PolicyDecision::Stop,
            OnError::Continue => PolicyDecision::Continue,
            OnError::Stop => PolicyDecision::Stop,
            OnError::Retry if retries < self.retry.max_retries => PolicyDecision::Retry {
                delay: self.retry.delay_for(retries + 1),
            },
            OnError::Retry => PolicyDecision::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> StepError {
        StepError::ActionInvocation("boom".to_string())
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_millis(10000));
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(10000));
        assert_eq!(RetryPolicy::no_retry().delay_for(1), Duration::ZERO);
    }

    #[test]
    fn test_continue_and_stop() {
        let policy = ErrorPolicy::default();
        assert_eq!(
            policy.decide(OnError::Continue, &failure(), 0, false),
            PolicyDecision::Continue
        );
        assert_eq!(
            policy.decide(OnError::Stop, &failure(), 0, false),
            PolicyDecision::Stop
        );
    }

    #[test]
    fn test_fail_fast_overrides_continue() {
        let policy = ErrorPolicy::default();
        assert_eq!(
            policy.decide(OnError::Continue, &failure(), 0, true),
            PolicyDecision::Stop
        );
    }

    #[test]
    fn test_retry_is_bounded() {
        let policy = ErrorPolicy::new(RetryPolicy::default());
        assert_eq!(
            policy.decide(OnError::Retry, &failure(), 0, false),
            PolicyDecision::Retry {
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(
            policy.decide(OnError::Retry, &failure(), 2, false),
            PolicyDecision::Retry {
                delay: Duration::from_millis(2000)
            }
        );
        assert_eq!(
            policy.decide(OnError::Retry, &failure(), 3, false),
            PolicyDecision::Stop
        );
    }

    #[test]
    fn test_fatal_errors_always_stop() {
        let policy = ErrorPolicy::default();
        let internal = StepError::Internal("panic".to_string());
        assert_eq!(
            policy.decide(OnError::Continue, &internal, 0, false),
            PolicyDecision::Stop
        );
        assert_eq!(
            policy.decide(OnError::Retry, &StepError::Cancelled, 0, false),
            PolicyDecision::Stop
        );
    }
}
