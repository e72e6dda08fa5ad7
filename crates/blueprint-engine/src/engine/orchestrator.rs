//! Run orchestration.
//!
//! `BlueprintEngine` is the entry point for callers: it validates the
//! blueprint, builds a fresh context and recorder for the run, walks the
//! top-level scope and hands the finished `RunResult` to the persistence sink.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{AgentCaller, UnconfiguredAgentCaller};
use crate::blueprint::{validate_blueprint, Blueprint, TriggerContext};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::credentials::CredentialResolver;
use crate::engine::interpreter::{RunState, ScopeOutcome, StepInterpreter};
use crate::engine::policy::ErrorPolicy;
use crate::engine::recorder::RunResult;
use crate::error::{EngineError, EngineResult, StepError};
use crate::integrations::ActionInvoker;
use crate::sink::PersistenceSink;

/// Blueprint execution engine.
///
/// Holds only configuration and shared collaborators, so clones are cheap and
/// any number of runs may execute concurrently.
#[derive(Clone)]
pub struct BlueprintEngine {
    config: EngineConfig,
    credentials: Arc<dyn CredentialResolver>,
    invoker: Arc<dyn ActionInvoker>,
    agents: Arc<dyn AgentCaller>,
    sink: Option<Arc<dyn PersistenceSink>>,
    interpreter: Arc<StepInterpreter>,
}

impl BlueprintEngine {
    pub fn new(
        config: EngineConfig,
        credentials: Arc<dyn CredentialResolver>,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        let agents: Arc<dyn AgentCaller> = Arc::new(UnconfiguredAgentCaller);
        let interpreter = Self::build_interpreter(&config, &credentials, &invoker, &agents);
        Self {
            config,
            credentials,
            invoker,
            agents,
            sink: None,
            interpreter,
        }
    }

    pub fn with_agent_caller(mut self, agents: Arc<dyn AgentCaller>) -> Self {
        self.agents = agents;
        self.interpreter =
            Self::build_interpreter(&self.config, &self.credentials, &self.invoker, &self.agents);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn build_interpreter(
        config: &EngineConfig,
        credentials: &Arc<dyn CredentialResolver>,
        invoker: &Arc<dyn ActionInvoker>,
        agents: &Arc<dyn AgentCaller>,
    ) -> Arc<StepInterpreter> {
        Arc::new(StepInterpreter::new(
            credentials.clone(),
            invoker.clone(),
            agents.clone(),
            ErrorPolicy::new(config.retry_policy()),
            config.action_timeout(),
        ))
    }

    /// Execute a blueprint for one trigger event.
    ///
    /// Only invalid input is an `Err`. Every failure while steps run is
    /// reported inside the returned `RunResult`.
    pub async fn execute_automation(
        &self,
        automation_id: &str,
        blueprint: &Blueprint,
        trigger: TriggerContext,
    ) -> EngineResult<RunResult> {
        self.execute_with_cancellation(automation_id, blueprint, trigger, CancellationToken::new())
            .await
    }

    /// Execute a blueprint, stopping at the next step boundary once `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        automation_id: &str,
        blueprint: &Blueprint,
        trigger: TriggerContext,
        cancel: CancellationToken,
    ) -> EngineResult<RunResult> {
        validate_blueprint(blueprint)?;

        let run_id = Uuid::new_v4();
        let ctx = ExecutionContext::seeded(automation_id, run_id, &blueprint.variables, &trigger)
            .map_err(|e| EngineError::Internal(format!("failed to seed context: {}", e)))?;

        tracing::info!(
            automation_id,
            run_id = %run_id,
            trigger_type = %trigger.trigger_type,
            triggered_by = %trigger.triggered_by,
            steps = blueprint.step_count(),
            "Starting run"
        );

        let mut run = RunState::new(ctx, cancel);
        let outcome = self
            .interpreter
            .execute_scope(&blueprint.steps, &mut run, false)
            .await;

        let cancelled =
            outcome == ScopeOutcome::Halted && run.fault().is_none() && run.is_cancelled();
        let (ctx, mut recorder) = run.into_parts();
        if cancelled {
            recorder.record_error(StepError::Cancelled.to_string());
        }

        let result = recorder.finish(
            run_id,
            outcome == ScopeOutcome::Completed,
            ctx.started_at(),
        );
        if result.success {
            tracing::info!(
                automation_id,
                run_id = %run_id,
                duration_ms = result.duration_ms,
                "Run succeeded"
            );
        } else {
            tracing::warn!(
                automation_id,
                run_id = %run_id,
                duration_ms = result.duration_ms,
                errors = result.errors.len(),
                cancelled,
                "Run failed"
            );
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(automation_id, run_id, &result).await {
                tracing::warn!(run_id = %run_id, error = %e, "Failed to persist run result");
            }
        }

        Ok(result)
    }
}

impl std::fmt::Debug for BlueprintEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueprintEngine")
            .field("config", &self.config)
            .field("interpreter", &self.interpreter)
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
