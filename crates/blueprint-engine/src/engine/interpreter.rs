//! Step interpreter.
//!
//! Walks a step tree depth-first, one step at a time. Each step settles
//! (including every nested scope, retry and fallback branch) before its next
//! sibling starts, and its `StepResult` is appended when it settles.

use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentCaller;
use crate::blueprint::{
    ActionSpec, AgentCallSpec, ConditionSpec, DelaySpec, FallbackSpec, LoopSpec, OnError,
    RetrySpec, Step, StepKind,
};
use crate::context::ExecutionContext;
use crate::credentials::CredentialResolver;
use crate::engine::evaluator::ExpressionEvaluator;
use crate::engine::policy::{ErrorPolicy, PolicyDecision};
use crate::engine::recorder::{elapsed_ms, Mark, RunRecorder, StepResult};
use crate::error::{IntegrationError, StepError};
use crate::integrations::ActionInvoker;

/// How a scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// Every step ran; failures, if any, were tolerated by `continue`.
    Completed,
    /// A failure propagated out of the scope.
    Aborted,
    /// The run was cancelled or hit an internal fault. Nothing catches this.
    Halted,
}

/// Mutable state threaded through one run.
#[derive(Debug)]
pub struct RunState {
    pub ctx: ExecutionContext,
    pub recorder: RunRecorder,
    cancel: CancellationToken,
    fault: Option<String>,
    tolerated: usize,
}

impl RunState {
    pub fn new(ctx: ExecutionContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            recorder: RunRecorder::new(),
            cancel,
            fault: None,
            tolerated: 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Internal fault that halted the run, if any.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// No new step may start.
    pub fn halted(&self) -> bool {
        self.fault.is_some() || self.cancel.is_cancelled()
    }

    pub fn into_parts(self) -> (ExecutionContext, RunRecorder) {
        (self.ctx, self.recorder)
    }

    fn halt_error(&self) -> StepError {
        match &self.fault {
            Some(message) => StepError::Nested(message.clone()),
            None => StepError::Cancelled,
        }
    }

    fn nested_failure(&self, mark: Mark, fallback: &str) -> StepError {
        StepError::Nested(
            self.recorder
                .last_error_since(mark)
                .unwrap_or(fallback)
                .to_string(),
        )
    }

    fn skip_all(&mut self, steps: &[Step]) {
        for step in steps {
            self.recorder.record(StepResult::skipped(&step.id));
        }
    }
}

/// Successful settlement of a step.
enum Settled {
    Output(serde_json::Value),
    Skipped,
}

type StepOutcome = Result<Settled, StepError>;

/// Dispatches steps by kind and applies the error policy between siblings.
pub struct StepInterpreter {
    credentials: Arc<dyn CredentialResolver>,
    invoker: Arc<dyn ActionInvoker>,
    agents: Arc<dyn AgentCaller>,
    evaluator: ExpressionEvaluator,
    policy: ErrorPolicy,
    call_timeout: Duration,
}

impl StepInterpreter {
    pub fn new(
        credentials: Arc<dyn CredentialResolver>,
        invoker: Arc<dyn ActionInvoker>,
        agents: Arc<dyn AgentCaller>,
        policy: ErrorPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            invoker,
            agents,
            evaluator: ExpressionEvaluator::new(),
            policy,
            call_timeout,
        }
    }

    /// Execute a scope in order.
    ///
    /// With `fail_fast` set, a failing step aborts the scope even when its
    /// `on_error` is `continue`. Steps that never start are recorded as skipped.
    pub fn execute_scope<'a>(
        &'a self,
        steps: &'a [Step],
        run: &'a mut RunState,
        fail_fast: bool,
    ) -> BoxFuture<'a, ScopeOutcome> {
        async move {
            for (index, step) in steps.iter().enumerate() {
                if run.halted() {
                    run.skip_all(&steps[index..]);
                    return ScopeOutcome::Halted;
                }

                let mut retries = 0;
                loop {
                    let error = match self.execute_step(step, run, fail_fast).await {
                        Ok(()) => break,
                        Err(error) => error,
                    };

                    if run.halted() {
                        run.skip_all(&steps[index + 1..]);
                        return ScopeOutcome::Halted;
                    }

                    match self.policy.decide(step.on_error(), &error, retries, fail_fast) {
                        PolicyDecision::Continue => {
                            tracing::debug!(step_id = %step.id, "Continuing past failed step");
                            run.tolerated += 1;
                            break;
                        }
                        PolicyDecision::Stop => {
                            tracing::debug!(step_id = %step.id, "Failed step aborts scope");
                            run.skip_all(&steps[index + 1..]);
                            return ScopeOutcome::Aborted;
                        }
                        PolicyDecision::Retry { delay } => {
                            retries += 1;
                            tracing::warn!(
                                step_id = %step.id,
                                attempt = retries + 1,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Retrying failed step"
                            );
                            let cancel = run.cancel.clone();
                            if !sleep_or_cancel(delay, &cancel).await {
                                run.skip_all(&steps[index + 1..]);
                                return ScopeOutcome::Halted;
                            }
                        }
                    }
                }
            }
            ScopeOutcome::Completed
        }
        .boxed()
    }

    /// Execute one step and record its result.
    fn execute_step<'a>(
        &'a self,
        step: &'a Step,
        run: &'a mut RunState,
        fail_fast: bool,
    ) -> BoxFuture<'a, Result<(), StepError>> {
        async move {
            let start = Instant::now();
            tracing::debug!(
                step_id = %step.id,
                step_name = step.display_name(),
                kind = step.kind.as_str(),
                "Executing step"
            );

            let outcome = match &step.kind {
                StepKind::Action { action } => self.execute_action(action, run).await,
                StepKind::Condition { condition } => {
                    self.execute_condition(condition, run, fail_fast).await
                }
                StepKind::Loop { spec } => self.execute_loop(step, spec, run, fail_fast).await,
                StepKind::Delay { delay } => self.execute_delay(delay, run).await,
                StepKind::AiAgentCall { ai_agent_call } => {
                    self.execute_agent_call(ai_agent_call, run).await
                }
                StepKind::Retry { retry } => self.execute_retry(step, retry, run).await,
                StepKind::Fallback { fallback } => {
                    self.execute_fallback(step, fallback, run, fail_fast).await
                }
            };
            let duration_ms = elapsed_ms(start);

            match outcome {
                Ok(Settled::Output(value)) => {
                    tracing::debug!(step_id = %step.id, duration_ms, "Step succeeded");
                    run.ctx.record_output(&step.id, value.clone());
                    run.recorder
                        .record(StepResult::succeeded(&step.id, value, duration_ms));
                    Ok(())
                }
                Ok(Settled::Skipped) => {
                    tracing::debug!(step_id = %step.id, "Step skipped");
                    let mut result = StepResult::skipped(&step.id);
                    result.duration_ms = duration_ms;
                    run.recorder.record(result);
                    Ok(())
                }
                Err(error) => {
                    tracing::warn!(step_id = %step.id, duration_ms, error = %error, "Step failed");
                    if error.is_reported() {
                        run.recorder.record_error(error.to_string());
                    }
                    if let StepError::Internal(ref message) = error {
                        run.fault = Some(error.to_string());
                        tracing::error!(step_id = %step.id, error = %message, "Internal fault halts run");
                    }
                    run.recorder
                        .record(StepResult::failed(&step.id, error.to_string(), duration_ms));
                    Err(error)
                }
            }
        }
        .boxed()
    }

    async fn execute_action(&self, spec: &ActionSpec, run: &mut RunState) -> StepOutcome {
        let platform = spec.platform();
        let credential = self
            .credentials
            .resolve(&run.ctx.automation_id, platform)
            .await
            .map_err(|e| StepError::Credential(e.to_string()))?;

        let parameters = self.evaluator.render_parameters(&spec.parameters, &run.ctx)?;

        tracing::debug!(
            integration = %spec.integration,
            method = %spec.method,
            credential_id = %credential.id,
            "Invoking action"
        );
        let result = self
            .bounded(
                self.invoker
                    .invoke(&spec.integration, &spec.method, &parameters, &credential),
            )
            .await?
            .map_err(|e| StepError::ActionInvocation(e.to_string()))?;

        if result.success {
            Ok(Settled::Output(result.output_or_null()))
        } else {
            Err(StepError::ActionInvocation(
                result.error.unwrap_or_else(|| "action failed".to_string()),
            ))
        }
    }

    async fn execute_condition(
        &self,
        spec: &ConditionSpec,
        run: &mut RunState,
        fail_fast: bool,
    ) -> StepOutcome {
        let mut matched = None;
        for case in &spec.cases {
            if self.evaluator.evaluate_condition(&case.expression, &run.ctx)? {
                matched = Some(case);
                break;
            }
        }

        let (steps, output) = match (matched, &spec.default_steps) {
            (Some(case), _) => {
                tracing::debug!(case = %case.label, "Condition case matched");
                (&case.steps, json!({"matched_case": case.label}))
            }
            (None, Some(default_steps)) => {
                (default_steps, json!({"matched_case": null, "default": true}))
            }
            (None, None) => return Ok(Settled::Skipped),
        };

        let mark = run.recorder.mark();
        match self.execute_scope(steps, run, fail_fast).await {
            ScopeOutcome::Completed => Ok(Settled::Output(output)),
            ScopeOutcome::Aborted => Err(run.nested_failure(mark, "condition branch failed")),
            ScopeOutcome::Halted => Err(run.halt_error()),
        }
    }

    /// Run the body once per element, in order.
    ///
    /// The item and index variables are shadowed in the run's own context and
    /// restored after each iteration; there is no per-iteration copy, so any
    /// other variable or output written by the body stays visible afterwards.
    async fn execute_loop(
        &self,
        step: &Step,
        spec: &LoopSpec,
        run: &mut RunState,
        fail_fast: bool,
    ) -> StepOutcome {
        let items = self.evaluator.evaluate_sequence(&spec.array_source, &run.ctx)?;
        let total = items.len();
        let tolerate = step.on_error() == OnError::Continue && !fail_fast;
        let mark = run.recorder.mark();
        let mut failed_iterations = 0;

        tracing::debug!(step_id = %step.id, iterations = total, "Starting loop");
        for (index, item) in items.into_iter().enumerate() {
            let shadowed_item = run.ctx.bind(&spec.item_variable, item);
            let shadowed_index = run.ctx.bind(&spec.index_variable, json!(index));

            let outcome = self.execute_scope(&spec.steps, run, fail_fast).await;

            run.ctx.restore(&spec.index_variable, shadowed_index);
            run.ctx.restore(&spec.item_variable, shadowed_item);

            match outcome {
                ScopeOutcome::Completed => {}
                ScopeOutcome::Halted => return Err(run.halt_error()),
                ScopeOutcome::Aborted if tolerate => {
                    tracing::warn!(step_id = %step.id, index, "Loop iteration failed, continuing");
                    failed_iterations += 1;
                }
                ScopeOutcome::Aborted => {
                    return Err(run.nested_failure(mark, "loop iteration failed"));
                }
            }
        }

        if failed_iterations > 0 {
            return Err(run.nested_failure(mark, "loop iteration failed"));
        }
        Ok(Settled::Output(json!({"iterations": total})))
    }

    async fn execute_delay(&self, spec: &DelaySpec, run: &mut RunState) -> StepOutcome {
        let duration = Duration::try_from_secs_f64(spec.duration_seconds).map_err(|e| {
            StepError::Evaluation(format!(
                "invalid delay of {} seconds: {}",
                spec.duration_seconds, e
            ))
        })?;

        if sleep_or_cancel(duration, &run.cancel).await {
            Ok(Settled::Output(
                json!({"duration_seconds": spec.duration_seconds}),
            ))
        } else {
            Err(StepError::Cancelled)
        }
    }

    async fn execute_agent_call(&self, spec: &AgentCallSpec, run: &mut RunState) -> StepOutcome {
        let prompt = self.evaluator.render_prompt(&spec.input_prompt, &run.ctx)?;

        tracing::debug!(agent_id = %spec.agent_id, "Calling agent");
        let output = self
            .bounded(self.agents.call(&spec.agent_id, &prompt, &run.ctx))
            .await?
            .map_err(|e| StepError::AgentCall(e.to_string()))?;

        run.ctx.set_variable(&spec.output_variable, output.clone());
        Ok(Settled::Output(output))
    }

    async fn execute_retry(&self, step: &Step, spec: &RetrySpec, run: &mut RunState) -> StepOutcome {
        let baseline = run.tolerated;
        let mut last_error = None;

        for attempt in 1..=spec.max_attempts {
            tracing::info!(step_id = %step.id, attempt, max_attempts = spec.max_attempts, "Retry attempt");
            let mark = run.recorder.mark();

            match self.execute_scope(&spec.steps, run, false).await {
                ScopeOutcome::Halted => return Err(run.halt_error()),
                ScopeOutcome::Completed if run.tolerated == baseline => {
                    return Ok(Settled::Output(json!({"attempts": attempt})));
                }
                _ => {
                    run.tolerated = baseline;
                    last_error = run.recorder.last_error_since(mark).map(str::to_string);
                    tracing::warn!(
                        step_id = %step.id,
                        attempt,
                        error = last_error.as_deref().unwrap_or("step failed"),
                        "Retry attempt failed"
                    );
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| "step failed".to_string());
        let Some(on_fail) = &spec.on_retry_fail_steps else {
            return Err(StepError::Nested(format!(
                "Retry exhausted after {} attempts: {}",
                spec.max_attempts, last_error
            )));
        };

        tracing::info!(step_id = %step.id, "Running on_retry_fail_steps");
        let mark = run.recorder.mark();
        match self.execute_scope(on_fail, run, false).await {
            ScopeOutcome::Completed => Ok(Settled::Output(json!({
                "attempts": spec.max_attempts,
                "recovered": true,
            }))),
            ScopeOutcome::Aborted => Err(run.nested_failure(mark, &last_error)),
            ScopeOutcome::Halted => Err(run.halt_error()),
        }
    }

    async fn execute_fallback(
        &self,
        step: &Step,
        spec: &FallbackSpec,
        run: &mut RunState,
        fail_fast: bool,
    ) -> StepOutcome {
        match self.execute_scope(&spec.primary_steps, run, true).await {
            ScopeOutcome::Completed => return Ok(Settled::Output(json!({"path": "primary"}))),
            ScopeOutcome::Halted => return Err(run.halt_error()),
            ScopeOutcome::Aborted => {
                tracing::warn!(step_id = %step.id, "Primary path failed, running fallback");
            }
        }

        let mark = run.recorder.mark();
        match self.execute_scope(&spec.fallback_steps, run, fail_fast).await {
            ScopeOutcome::Completed => Ok(Settled::Output(json!({"path": "fallback"}))),
            ScopeOutcome::Aborted => Err(run.nested_failure(mark, "fallback path failed")),
            ScopeOutcome::Halted => Err(run.halt_error()),
        }
    }

    /// Bound an external call by the call timeout and contain panics.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, IntegrationError>>,
    ) -> Result<Result<T, IntegrationError>, StepError> {
        match tokio::time::timeout(self.call_timeout, AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(panic)) => Err(StepError::Internal(panic_message(panic.as_ref()))),
            Err(_) => Err(StepError::Timeout(self.call_timeout.as_millis() as u64)),
        }
    }
}

impl std::fmt::Debug for StepInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepInterpreter")
            .field("policy", &self.policy)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("integration panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("integration panicked: {}", message)
    } else {
        "integration panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::policy::RetryPolicy;
    use crate::engine::StepStatus;
    use crate::test_support::{step, AllowAllCredentials, Scripted, StubAgent, StubInvoker};
    use uuid::Uuid;

    fn interpreter(invoker: Arc<StubInvoker>) -> StepInterpreter {
        StepInterpreter::new(
            Arc::new(AllowAllCredentials),
            invoker,
            Arc::new(StubAgent::default()),
            ErrorPolicy::new(RetryPolicy::no_retry()),
            Duration::from_secs(30),
        )
    }

    fn run_state() -> RunState {
        RunState::new(
            ExecutionContext::new("auto-1", Uuid::new_v4()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_fail_fast_turns_continue_into_stop() {
        let invoker = Arc::new(StubInvoker::new());
        invoker.script("bad", vec![Scripted::Fail("boom".into())]);
        let interpreter = interpreter(invoker.clone());
        let steps = vec![
            step(json!({"id": "a", "type": "action", "on_error": "continue",
                "action": {"integration": "x", "method": "bad"}})),
            step(json!({"id": "b", "type": "action",
                "action": {"integration": "x", "method": "ok"}})),
        ];

        let mut run = run_state();
        let outcome = interpreter.execute_scope(&steps, &mut run, true).await;
        assert_eq!(outcome, ScopeOutcome::Aborted);
        assert_eq!(invoker.methods(), vec!["bad"]);

        let mut run = run_state();
        let outcome = interpreter.execute_scope(&steps, &mut run, false).await;
        assert_eq!(outcome, ScopeOutcome::Completed);
        assert_eq!(run.tolerated, 1);
        let results = run.recorder.results();
        assert_eq!(results[1].status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_outputs_flow_into_later_parameters() {
        let invoker = Arc::new(StubInvoker::new());
        invoker.script("fetch", vec![Scripted::Ok(json!({"user": "ada"}))]);
        let interpreter = interpreter(invoker.clone());
        let steps = vec![
            step(json!({"id": "fetch", "type": "action",
                "action": {"integration": "x", "method": "fetch"}})),
            step(json!({"id": "greet", "type": "action",
                "action": {"integration": "x", "method": "send",
                    "parameters": {"text": "hi {{ steps.fetch.user }}"}}})),
        ];

        let mut run = run_state();
        let outcome = interpreter.execute_scope(&steps, &mut run, false).await;
        assert_eq!(outcome, ScopeOutcome::Completed);
        assert_eq!(invoker.calls()[1].parameters, json!({"text": "hi ada"}));
        assert_eq!(run.ctx.output("fetch"), Some(&json!({"user": "ada"})));
    }

    #[tokio::test]
    async fn test_loop_bindings_are_restored() {
        let invoker = Arc::new(StubInvoker::new());
        let interpreter = interpreter(invoker.clone());
        let steps = vec![step(json!({"id": "each", "type": "loop", "loop": {
            "array_source": "['a', 'b']",
            "steps": [{"id": "send", "type": "action", "action": {
                "integration": "x", "method": "send",
                "parameters": {"value": "{{ item }}", "position": "{{ index }}"}}}]
        }}))];

        let mut run = run_state();
        run.ctx.set_variable("item", json!("outer"));
        let outcome = interpreter.execute_scope(&steps, &mut run, false).await;

        assert_eq!(outcome, ScopeOutcome::Completed);
        let params: Vec<_> = invoker.calls().into_iter().map(|c| c.parameters).collect();
        assert_eq!(
            params,
            vec![
                json!({"value": "a", "position": 0}),
                json!({"value": "b", "position": 1})
            ]
        );
        assert_eq!(run.ctx.get_variable("item"), Some(&json!("outer")));
        assert_eq!(run.ctx.get_variable("index"), None);
        assert_eq!(run.ctx.output("send"), Some(&json!({"method": "send"})));
    }

    #[tokio::test]
    async fn test_unsettled_siblings_are_skipped_after_halt() {
        let invoker = Arc::new(StubInvoker::new());
        invoker.script("explode", vec![Scripted::Panic]);
        let interpreter = interpreter(invoker.clone());
        let steps = vec![
            step(json!({"id": "a", "type": "action", "on_error": "continue",
                "action": {"integration": "x", "method": "explode"}})),
            step(json!({"id": "b", "type": "action",
                "action": {"integration": "x", "method": "ok"}})),
        ];

        let mut run = run_state();
        let outcome = interpreter.execute_scope(&steps, &mut run, false).await;
        assert_eq!(outcome, ScopeOutcome::Halted);
        assert!(run.fault().is_some());

        let statuses: Vec<_> = run.recorder.results().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![StepStatus::Failed, StepStatus::Skipped]);
        assert_eq!(invoker.methods(), vec!["explode"]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("kaboom");
        assert_eq!(panic_message(payload.as_ref()), "integration panicked: kaboom");
    }
}
