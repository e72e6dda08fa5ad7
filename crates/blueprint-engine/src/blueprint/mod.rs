//! Blueprint definitions and parsing.
//!
//! This module handles:
//! - Blueprint type definitions (step tree, trigger, variables)
//! - YAML/JSON parsing
//! - Structural validation before execution

pub mod parser;
pub mod types;

pub use parser::{parse_blueprint, parse_blueprint_file, parse_blueprint_value, validate_blueprint};
pub use types::{
    ActionSpec, AgentCallSpec, Blueprint, ConditionCase, ConditionSpec, DelaySpec, FallbackSpec,
    LoopSpec, OnError, RetrySpec, Step, StepKind, TriggerContext, TriggerSpec, TriggerType,
};
