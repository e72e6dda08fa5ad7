//! Action invocation result types.

use serde::{Deserialize, Serialize};

/// What an integration reports back for one call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,

    /// Result data (integration-specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    /// Error message if the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ActionResult {
    /// Create a successful result with output.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            duration_ms: None,
        }
    }

    /// Create a failed result with message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(message.into()),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Output to record for the step, `null` when the integration returned none.
    pub fn output_or_null(&self) -> serde_json::Value {
        self.output.clone().unwrap_or(serde_json::Value::Null)
    }
}
