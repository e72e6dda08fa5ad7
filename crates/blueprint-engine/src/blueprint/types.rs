//! Blueprint type definitions.
//!
//! A blueprint is a trigger plus a tree of steps:
//! - step.type selects one of seven kinds
//! - the kind payload lives under a key named after the kind
//! - condition/loop/retry/fallback nest further step arrays with the same schema
//! - step.on_error governs what the enclosing scope does when the step fails

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete blueprint definition. Read-only once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blueprint {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: String,

    /// What starts a run of this blueprint.
    pub trigger: TriggerSpec,

    /// Top-level step scope.
    pub steps: Vec<Step>,

    /// Blueprint-level variables seeded into every run.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Blueprint {
    /// Visit every step in the tree, depth-first, in declaration order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Step)) {
        walk_steps(&self.steps, visit);
    }

    /// Total number of steps at every depth.
    pub fn step_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

fn walk_steps<'a>(steps: &'a [Step], visit: &mut impl FnMut(&'a Step)) {
    for step in steps {
        visit(step);
        for scope in step.nested_scopes() {
            walk_steps(scope, visit);
        }
    }
}

/// Supported trigger kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Webhook,
    #[serde(alias = "schedule", alias = "cron")]
    Scheduled,
    Platform,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerType::Manual => "manual",
            TriggerType::Webhook => "webhook",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Platform => "platform",
        };
        write!(f, "{}", s)
    }
}

/// Trigger declared by the blueprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TriggerSpec {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,

    /// Trigger-specific settings (cron expression, webhook path, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

/// Normalized trigger event handed to the engine by the ingestion layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerContext {
    pub trigger_type: TriggerType,

    /// User or system that fired the trigger.
    pub triggered_by: String,

    pub timestamp: DateTime<Utc>,

    /// Event payload (webhook body, platform event, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TriggerContext {
    pub fn new(trigger_type: TriggerType, triggered_by: impl Into<String>) -> Self {
        Self {
            trigger_type,
            triggered_by: triggered_by.into(),
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    /// Manual trigger fired now.
    pub fn manual(triggered_by: impl Into<String>) -> Self {
        Self::new(TriggerType::Manual, triggered_by)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Per-step failure directive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Proceed to the next sibling.
    Continue,
    /// Abort the enclosing scope.
    #[default]
    Stop,
    /// Re-attempt the step under the engine-wide retry policy, then stop.
    Retry,
}

impl std::fmt::Display for OnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnError::Continue => write!(f, "continue"),
            OnError::Stop => write!(f, "stop"),
            OnError::Retry => write!(f, "retry"),
        }
    }
}

/// One node of the step tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique within the whole blueprint.
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnError>,

    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Effective failure directive.
    pub fn on_error(&self) -> OnError {
        self.on_error.unwrap_or_default()
    }

    /// Name for logs, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Step arrays nested directly under this step.
    pub fn nested_scopes(&self) -> Vec<&[Step]> {
        match &self.kind {
            StepKind::Action { .. } | StepKind::Delay { .. } | StepKind::AiAgentCall { .. } => {
                Vec::new()
            }
            StepKind::Condition { condition } => {
                let mut scopes: Vec<&[Step]> =
                    condition.cases.iter().map(|c| c.steps.as_slice()).collect();
                if let Some(ref default_steps) = condition.default_steps {
                    scopes.push(default_steps);
                }
                scopes
            }
            StepKind::Loop { spec } => vec![spec.steps.as_slice()],
            StepKind::Retry { retry } => {
                let mut scopes = vec![retry.steps.as_slice()];
                if let Some(ref on_fail) = retry.on_retry_fail_steps {
                    scopes.push(on_fail);
                }
                scopes
            }
            StepKind::Fallback { fallback } => vec![
                fallback.primary_steps.as_slice(),
                fallback.fallback_steps.as_slice(),
            ],
        }
    }
}

/// Step kind with its payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Action {
        action: ActionSpec,
    },
    Condition {
        condition: ConditionSpec,
    },
    Loop {
        #[serde(rename = "loop")]
        spec: LoopSpec,
    },
    Delay {
        delay: DelaySpec,
    },
    AiAgentCall {
        ai_agent_call: AgentCallSpec,
    },
    Retry {
        retry: RetrySpec,
    },
    Fallback {
        fallback: FallbackSpec,
    },
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Action { .. } => "action",
            StepKind::Condition { .. } => "condition",
            StepKind::Loop { .. } => "loop",
            StepKind::Delay { .. } => "delay",
            StepKind::AiAgentCall { .. } => "ai_agent_call",
            StepKind::Retry { .. } => "retry",
            StepKind::Fallback { .. } => "fallback",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direct integration call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionSpec {
    /// Integration name (e.g. "http", "slack").
    pub integration: String,

    /// Integration method (e.g. "send", "post").
    pub method: String,

    /// Parameters; strings may contain templates.
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,

    /// Credential reference naming the platform to resolve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ActionSpec {
    /// Platform whose credential the action needs.
    pub fn platform(&self) -> &str {
        self.credential.as_deref().unwrap_or(&self.integration)
    }
}

/// Ordered first-match branching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionSpec {
    #[serde(default)]
    pub cases: Vec<ConditionCase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_steps: Option<Vec<Step>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionCase {
    pub label: String,

    /// Boolean-coercible expression.
    pub expression: String,

    pub steps: Vec<Step>,
}

/// Sequential iteration over an evaluated sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopSpec {
    /// Expression yielding an array.
    pub array_source: String,

    pub steps: Vec<Step>,

    /// Variable bound to the current element.
    #[serde(default = "default_item_variable")]
    pub item_variable: String,

    /// Variable bound to the zero-based position.
    #[serde(default = "default_index_variable")]
    pub index_variable: String,
}

fn default_item_variable() -> String {
    "item".to_string()
}

fn default_index_variable() -> String {
    "index".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelaySpec {
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCallSpec {
    pub agent_id: String,

    /// Prompt template rendered against the context.
    pub input_prompt: String,

    /// Variable receiving the agent output.
    pub output_variable: String,
}

/// Bounded re-execution of a whole nested scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySpec {
    pub max_attempts: u32,

    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_retry_fail_steps: Option<Vec<Step>>,
}

/// Primary scope with a replacement scope on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackSpec {
    pub primary_steps: Vec<Step>,
    pub fallback_steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_step_wire_format() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "type": "action",
            "action": {"integration": "x", "method": "send", "parameters": {}}
        }))
        .unwrap();

        assert_eq!(step.id, "s1");
        assert_eq!(step.display_name(), "s1");
        assert_eq!(step.on_error(), OnError::Stop);
        match step.kind {
            StepKind::Action { ref action } => {
                assert_eq!(action.integration, "x");
                assert_eq!(action.platform(), "x");
            }
            _ => panic!("expected action"),
        }
    }

    #[test]
    fn test_loop_step_defaults() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "id": "each",
            "type": "loop",
            "on_error": "continue",
            "loop": {"array_source": "users", "steps": []}
        }))
        .unwrap();

        assert_eq!(step.on_error(), OnError::Continue);
        match step.kind {
            StepKind::Loop { ref spec } => {
                assert_eq!(spec.item_variable, "item");
                assert_eq!(spec.index_variable, "index");
            }
            _ => panic!("expected loop"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<Step, _> = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "type": "teleport",
            "teleport": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_nested_array_rejected() {
        let result: Result<Step, _> = serde_json::from_value(serde_json::json!({
            "id": "f",
            "type": "fallback",
            "fallback": {"primary_steps": []}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_walk_visits_nested_steps() {
        let blueprint: Blueprint = serde_json::from_value(serde_json::json!({
            "trigger": {"type": "manual"},
            "steps": [
                {"id": "r", "type": "retry", "retry": {
                    "max_attempts": 2,
                    "steps": [{"id": "a", "type": "delay", "delay": {"duration_seconds": 1}}],
                    "on_retry_fail_steps": [{"id": "b", "type": "delay", "delay": {"duration_seconds": 1}}]
                }},
                {"id": "c", "type": "delay", "delay": {"duration_seconds": 0.5}}
            ]
        }))
        .unwrap();

        let mut ids = Vec::new();
        blueprint.walk(&mut |step| ids.push(step.id.as_str()));
        assert_eq!(ids, vec!["r", "a", "b", "c"]);
        assert_eq!(blueprint.step_count(), 4);
        assert_eq!(blueprint.version, "1.0");
    }

    #[test]
    fn test_trigger_type_aliases() {
        let spec: TriggerSpec = serde_json::from_value(serde_json::json!({"type": "cron"})).unwrap();
        assert_eq!(spec.trigger_type, TriggerType::Scheduled);
        assert_eq!(spec.trigger_type.to_string(), "scheduled");
    }
}
