//! Per-run execution context.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::blueprint::TriggerContext;

/// Output recorded by a succeeded step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepOutput {
    pub step_id: String,
    pub value: serde_json::Value,
}

/// Mutable state of a single run.
///
/// Contains:
/// - Run identity (automation id, run id)
/// - Variables visible to expressions (blueprint variables, trigger, agent outputs)
/// - Append-only log of step outputs
/// - Monotonic start time
///
/// Owned by exactly one run and never shared.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub automation_id: String,
    pub run_id: Uuid,
    variables: HashMap<String, serde_json::Value>,
    outputs: Vec<StepOutput>,
    started_at: Instant,
}

impl ExecutionContext {
    /// Create an empty context.
    pub fn new(automation_id: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            automation_id: automation_id.into(),
            run_id,
            variables: HashMap::new(),
            outputs: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Create a context seeded with blueprint variables and the trigger.
    pub fn seeded(
        automation_id: impl Into<String>,
        run_id: Uuid,
        variables: &HashMap<String, serde_json::Value>,
        trigger: &TriggerContext,
    ) -> Result<Self, serde_json::Error> {
        let mut ctx = Self::new(automation_id, run_id);
        ctx.merge_variables(variables);
        ctx.set_variable("trigger", serde_json::to_value(trigger)?);
        Ok(ctx)
    }

    /// Set a variable value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(name.into(), value);
    }

    /// Get a variable value.
    pub fn get_variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.variables.get(name)
    }

    /// Merge variables into this context, overwriting existing names.
    pub fn merge_variables(&mut self, other: &HashMap<String, serde_json::Value>) {
        for (k, v) in other {
            self.variables.insert(k.clone(), v.clone());
        }
    }

    /// Bind a scoped variable, returning the value it shadows.
    pub fn bind(&mut self, name: &str, value: serde_json::Value) -> Option<serde_json::Value> {
        self.variables.insert(name.to_string(), value)
    }

    /// Undo a `bind`.
    pub fn restore(&mut self, name: &str, shadowed: Option<serde_json::Value>) {
        match shadowed {
            Some(value) => {
                self.variables.insert(name.to_string(), value);
            }
            None => {
                self.variables.remove(name);
            }
        }
    }

    /// Append a step output to the log.
    pub fn record_output(&mut self, step_id: impl Into<String>, value: serde_json::Value) {
        self.outputs.push(StepOutput {
            step_id: step_id.into(),
            value,
        });
    }

    /// Latest output recorded for a step.
    pub fn output(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.outputs
            .iter()
            .rev()
            .find(|o| o.step_id == step_id)
            .map(|o| &o.value)
    }

    pub fn outputs(&self) -> &[StepOutput] {
        &self.outputs
    }

    /// Monotonic instant the run began.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Convert context to a JSON object for expression evaluation.
    ///
    /// `steps` maps each step id to its latest output and `run` carries the
    /// run identity; both shadow variables of the same name.
    pub fn to_template_context(&self) -> serde_json::Value {
        let mut ctx: serde_json::Map<String, serde_json::Value> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut steps = serde_json::Map::new();
        for output in &self.outputs {
            steps.insert(output.step_id.clone(), output.value.clone());
        }
        ctx.insert("steps".to_string(), serde_json::Value::Object(steps));
        ctx.insert(
            "run".to_string(),
            serde_json::json!({
                "automation_id": self.automation_id,
                "run_id": self.run_id.to_string(),
            }),
        );

        serde_json::Value::Object(ctx)
    }
}
