//! Error types for the blueprint engine.
//!
//! Run-level errors (`EngineError`) reject a blueprint before any step executes.
//! Everything that happens while steps run is a `StepError` and ends up inside
//! the `RunResult` instead of being returned to the caller.

use thiserror::Error;

/// Errors that prevent a run from starting.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Blueprint is structurally invalid (duplicate ids, bad bounds, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Blueprint text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Engine configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected engine fault while preparing the run.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

/// Failure of a single step.
///
/// Integration and agent messages are carried verbatim so callers see exactly
/// what the external system reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// No usable credential for the action's platform.
    #[error("{0}")]
    Credential(String),

    /// Integration call returned failure or raised.
    #[error("{0}")]
    ActionInvocation(String),

    /// Agent collaborator failed.
    #[error("{0}")]
    AgentCall(String),

    /// Malformed expression, missing variable or wrong value shape.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// External call exceeded the configured bound.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Run was cancelled while the step was suspended.
    #[error("Run cancelled")]
    Cancelled,

    /// Unexpected engine fault. Halts the run.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A compound step failed because its nested scope failed.
    #[error("{0}")]
    Nested(String),
}

impl StepError {
    /// Whether the message belongs in `RunResult.errors`.
    ///
    /// Nested failures repeat a message that was already collected, and
    /// cancellation is reported once for the whole run.
    pub fn is_reported(&self) -> bool {
        !matches!(self, StepError::Nested(_) | StepError::Cancelled)
    }

    /// Whether the error halts the run regardless of any enclosing policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::Internal(_) | StepError::Cancelled)
    }
}

/// Credential lookup errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    /// No active credential registered for the platform.
    #[error("No active credential for platform '{platform}'")]
    NotFound { platform: String },

    /// Credential store could not be reached.
    #[error("Credential lookup failed: {0}")]
    Unavailable(String),
}

/// Errors raised by integrations and agent callers.
#[derive(Error, Debug)]
pub enum IntegrationError {
    /// Integration not found in registry.
    #[error("Integration not found: {0}")]
    NotFound(String),

    /// Method is not supported by the integration.
    #[error("Unsupported method '{method}' for integration '{integration}'")]
    UnsupportedMethod { integration: String, method: String },

    /// Call failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Parameters could not be interpreted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for IntegrationError {
    fn from(e: serde_json::Error) -> Self {
        IntegrationError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        IntegrationError::Http(e.to_string())
    }
}

/// Persistence sink errors.
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
