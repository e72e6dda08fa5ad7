//! Blueprint parser and validator.
//!
//! Parses YAML or JSON blueprint definitions and checks the structural
//! invariants that must hold before any step runs:
//! - step ids unique across the whole tree
//! - retry.max_attempts >= 1
//! - delays finite and non-negative
//! - required action/loop/agent fields non-empty

use std::collections::HashSet;
use std::path::Path;

use crate::blueprint::types::{Blueprint, Step, StepKind};
use crate::error::{EngineError, EngineResult};

/// Parse a YAML (or JSON) string into a validated Blueprint.
pub fn parse_blueprint(content: &str) -> EngineResult<Blueprint> {
    let blueprint: Blueprint = serde_yaml::from_str(content)?;
    validate_blueprint(&blueprint)?;
    Ok(blueprint)
}

/// Parse a JSON value into a validated Blueprint.
pub fn parse_blueprint_value(value: serde_json::Value) -> EngineResult<Blueprint> {
    let blueprint: Blueprint = serde_json::from_value(value)?;
    validate_blueprint(&blueprint)?;
    Ok(blueprint)
}

/// Read and parse a blueprint file.
pub fn parse_blueprint_file(path: impl AsRef<Path>) -> EngineResult<Blueprint> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Parse(format!("{}: {}", path.display(), e)))?;
    parse_blueprint(&content)
}

/// Validate a blueprint.
pub fn validate_blueprint(blueprint: &Blueprint) -> EngineResult<()> {
    let mut seen_ids = HashSet::new();
    validate_steps(&blueprint.steps, &mut seen_ids)
}

fn validate_steps<'a>(steps: &'a [Step], seen_ids: &mut HashSet<&'a str>) -> EngineResult<()> {
    for step in steps {
        if step.id.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "Step '{}' has an empty id",
                step.display_name()
            )));
        }

        if !seen_ids.insert(step.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Duplicate step id: {}",
                step.id
            )));
        }

        validate_step_kind(step)?;

        for scope in step.nested_scopes() {
            validate_steps(scope, seen_ids)?;
        }
    }
    Ok(())
}

fn validate_step_kind(step: &Step) -> EngineResult<()> {
    let invalid = |message: &str| {
        Err(EngineError::Validation(format!(
            "Step '{}': {}",
            step.id, message
        )))
    };

    match &step.kind {
        StepKind::Action { action } => {
            if action.integration.trim().is_empty() {
                return invalid("action.integration must not be empty");
            }
            if action.method.trim().is_empty() {
                return invalid("action.method must not be empty");
            }
        }
        StepKind::Condition { condition } => {
            if condition.cases.is_empty() && condition.default_steps.is_none() {
                return invalid("condition needs at least one case or default_steps");
            }
            for case in &condition.cases {
                if case.expression.trim().is_empty() {
                    return invalid(&format!("case '{}' has an empty expression", case.label));
                }
            }
        }
        StepKind::Loop { spec } => {
            if spec.array_source.trim().is_empty() {
                return invalid("loop.array_source must not be empty");
            }
            if spec.item_variable.trim().is_empty() || spec.index_variable.trim().is_empty() {
                return invalid("loop variables must not be empty");
            }
        }
        StepKind::Delay { delay } => {
            if !delay.duration_seconds.is_finite() || delay.duration_seconds < 0.0 {
                return invalid(&format!(
                    "delay.duration_seconds must be a non-negative number (got {})",
                    delay.duration_seconds
                ));
            }
        }
        StepKind::AiAgentCall { ai_agent_call } => {
            if ai_agent_call.agent_id.trim().is_empty() {
                return invalid("ai_agent_call.agent_id must not be empty");
            }
            if ai_agent_call.output_variable.trim().is_empty() {
                return invalid("ai_agent_call.output_variable must not be empty");
            }
        }
        StepKind::Retry { retry } => {
            if retry.max_attempts < 1 {
                return invalid("retry.max_attempts must be at least 1");
            }
        }
        StepKind::Fallback { .. } => {}
    }
    Ok(())
}
