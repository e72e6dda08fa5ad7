//! Engine configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::engine::policy::RetryPolicy;
use crate::error::{EngineError, EngineResult};

/// Engine-wide configuration loaded from environment variables.
///
/// Environment variables are prefixed with `BLUEPRINT_`:
/// - `BLUEPRINT_ACTION_TIMEOUT_SECS`: Bound on each action and agent call (default: 30)
/// - `BLUEPRINT_RETRY_MAX_RETRIES`: Re-attempts for `on_error: retry` steps (default: 3)
/// - `BLUEPRINT_RETRY_INITIAL_DELAY_MS`: First backoff delay (default: 500)
/// - `BLUEPRINT_RETRY_MAX_DELAY_MS`: Backoff cap (default: 10000)
/// - `BLUEPRINT_RETRY_BACKOFF_MULTIPLIER`: Exponential factor (default: 2.0)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Timeout in seconds for a single action invocation.
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    /// Maximum number of re-attempts after the first failure.
    #[serde(default = "default_retry_max_retries")]
    pub retry_max_retries: u32,

    /// Delay before the first re-attempt in milliseconds.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Maximum delay between re-attempts in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
}

fn default_action_timeout_secs() -> u64 {
    30
}

fn default_retry_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10000
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let config = envy::prefixed("BLUEPRINT_").from_env::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which no step could ever succeed.
    pub fn validate(&self) -> EngineResult<()> {
        if self.action_timeout_secs == 0 {
            return Err(EngineError::Config(
                "action_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(self.retry_backoff_multiplier.is_finite() && self.retry_backoff_multiplier >= 1.0) {
            return Err(EngineError::Config(format!(
                "retry_backoff_multiplier must be >= 1.0, got {}",
                self.retry_backoff_multiplier
            )));
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Backoff policy for the per-step `on_error: retry` flag.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max_retries,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: default_action_timeout_secs(),
            retry_max_retries: default_retry_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
        }
    }
}
