//! Blueprint Execution Engine
//!
//! Interprets blueprint step trees at run time.
//!
//! This crate provides:
//! - Blueprint model, YAML/JSON parsing and validation
//! - Step interpreter for the seven step kinds (action, condition, loop, delay,
//!   ai_agent_call, retry, fallback) with per-step error policy
//! - Template engine with Jinja2-compatible expressions
//! - Collaborator traits: credentials, integrations, agents, persistence sinks
//! - Built-in `http` and `echo` integrations

pub mod agent;
pub mod blueprint;
pub mod config;
pub mod context;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod integrations;
pub mod result;
pub mod sink;
pub mod template;

#[cfg(test)]
mod test_support;

pub use agent::{AgentCaller, HttpAgentCaller, UnconfiguredAgentCaller};
pub use blueprint::{
    parse_blueprint, parse_blueprint_file, validate_blueprint, Blueprint, Step, StepKind,
    TriggerContext,
};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use credentials::{Credential, CredentialResolver, StaticCredentialResolver};
pub use engine::{BlueprintEngine, RunResult, StepResult, StepStatus};
pub use error::{EngineError, EngineResult, StepError};
pub use integrations::{create_default_registry, ActionInvoker, Integration, IntegrationRegistry};
pub use result::ActionResult;
pub use sink::{InMemoryRunStore, JsonFileSink, PersistenceSink};
