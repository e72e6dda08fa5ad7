//! Run recorder.
//!
//! Collects one `StepResult` per step that ran (or was skipped) together with
//! the run-wide error list, then assembles the final `RunResult`.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Terminal status of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "SUCCEEDED"),
            StepStatus::Failed => write!(f, "FAILED"),
            StepStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

impl StepResult {
    pub fn succeeded(step_id: impl Into<String>, output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Succeeded,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(step_id: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Summary of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: Uuid,
    pub success: bool,
    pub duration_ms: u64,
    pub results: Vec<StepResult>,
    pub errors: Vec<String>,
}

impl RunResult {
    /// Latest result recorded for a step id.
    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().rev().find(|r| r.step_id == step_id)
    }

    /// All results recorded for a step id, in order.
    pub fn results_for<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a StepResult> + 'a {
        self.results.iter().filter(move |r| r.step_id == step_id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Position in the recorder used to inspect what a scope produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    errors: usize,
}

/// Accumulates results for one run. Append-only.
#[derive(Debug, Default)]
pub struct RunRecorder {
    results: Vec<StepResult>,
    errors: Vec<String>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn mark(&self) -> Mark {
        Mark {
            errors: self.errors.len(),
        }
    }

    /// Most recent error message collected after `mark`.
    pub fn last_error_since(&self, mark: Mark) -> Option<&str> {
        self.errors[mark.errors..].last().map(String::as_str)
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Close the run that began at `started_at`.
    pub fn finish(self, run_id: Uuid, success: bool, started_at: Instant) -> RunResult {
        RunResult {
            run_id,
            success,
            duration_ms: elapsed_ms(started_at),
            results: self.results,
            errors: self.errors,
        }
    }
}

/// Elapsed milliseconds since `start`, rounded up so any real work is non-zero.
pub fn elapsed_ms(start: Instant) -> u64 {
    let nanos = start.elapsed().as_nanos().div_ceil(1_000_000);
    u64::try_from(nanos).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(StepStatus::Succeeded).unwrap(),
            json!("SUCCEEDED")
        );
        assert_eq!(StepStatus::Skipped.to_string(), "SKIPPED");
    }

    #[test]
    fn test_step_result_json_shape() {
        let result = StepResult::failed("s1", "boom", 3);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"step_id": "s1", "status": "FAILED", "error": "boom", "duration_ms": 3})
        );
    }

    #[test]
    fn test_marks_scope_errors() {
        let mut recorder = RunRecorder::new();
        recorder.record(StepResult::failed("a", "first", 1));
        recorder.record_error("first");

        let mark = recorder.mark();
        assert_eq!(recorder.last_error_since(mark), None);

        recorder.record(StepResult::succeeded("b", json!({}), 1));
        recorder.record(StepResult::failed("c", "second", 1));
        recorder.record_error("second");

        assert_eq!(recorder.last_error_since(mark), Some("second"));
        assert_eq!(recorder.results().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_builds_run_result() {
        let started_at = Instant::now();
        let mut recorder = RunRecorder::new();
        recorder.record(StepResult::succeeded("a", json!({"ok": true}), 2));
        recorder.record(StepResult::skipped("b"));

        let run_id = Uuid::new_v4();
        tokio::time::advance(std::time::Duration::from_millis(40)).await;
        let result = recorder.finish(run_id, true, started_at);

        assert_eq!(result.run_id, run_id);
        assert!(result.success);
        assert_eq!(result.duration_ms, 40);
        assert_eq!(result.count(StepStatus::Skipped), 1);
        assert_eq!(result.result("a").unwrap().output, Some(json!({"ok": true})));
    }
}
