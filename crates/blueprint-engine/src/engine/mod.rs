//! Blueprint execution engine.
//!
//! Contains:
//! - Expression evaluator
//! - Error policy and retry backoff
//! - Run recorder
//! - Step interpreter
//! - Engine facade (`BlueprintEngine`)

pub mod evaluator;
pub mod interpreter;
pub mod orchestrator;
pub mod policy;
pub mod recorder;

pub use evaluator::ExpressionEvaluator;
pub use interpreter::{RunState, ScopeOutcome, StepInterpreter};
pub use orchestrator::BlueprintEngine;
pub use policy::{ErrorPolicy, PolicyDecision, RetryPolicy};
pub use recorder::{RunRecorder, RunResult, StepResult, StepStatus};
