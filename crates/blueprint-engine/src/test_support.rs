//! Collaborator stubs shared by unit tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::agent::AgentCaller;
use crate::blueprint::{Blueprint, Step};
use crate::context::ExecutionContext;
use crate::credentials::{Credential, CredentialResolver};
use crate::error::{CredentialError, IntegrationError};
use crate::integrations::ActionInvoker;
use crate::result::ActionResult;

pub(crate) fn step(value: serde_json::Value) -> Step {
    serde_json::from_value(value).expect("valid step")
}

pub(crate) fn blueprint(steps: serde_json::Value) -> Blueprint {
    serde_json::from_value(json!({"trigger": {"type": "manual"}, "steps": steps}))
        .expect("valid blueprint")
}

/// Scripted response for one invocation.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Ok(serde_json::Value),
    /// Integration reports `success: false`.
    Fail(String),
    /// Integration returns an error.
    Raise(String),
    /// Succeeds after sleeping.
    Sleep(Duration, serde_json::Value),
    Panic,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub integration: String,
    pub method: String,
    pub parameters: serde_json::Value,
    pub credential_id: String,
}

/// Action invoker answering by method name.
///
/// Responses are consumed in order and the last one repeats. Unscripted
/// methods succeed with `{"method": <method>}`.
#[derive(Debug, Default)]
pub(crate) struct StubInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Call>>,
}

impl StubInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, method: &str, responses: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(method.to_string(), responses.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    fn next_response(&self, method: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(method)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ActionInvoker for StubInvoker {
    async fn invoke(
        &self,
        integration: &str,
        method: &str,
        parameters: &serde_json::Value,
        credential: &Credential,
    ) -> Result<ActionResult, IntegrationError> {
        self.calls.lock().unwrap().push(Call {
            integration: integration.to_string(),
            method: method.to_string(),
            parameters: parameters.clone(),
            credential_id: credential.id.clone(),
        });

        match self.next_response(method) {
            None => Ok(ActionResult::success(json!({"method": method}))),
            Some(Scripted::Ok(output)) => Ok(ActionResult::success(output)),
            Some(Scripted::Fail(message)) => Ok(ActionResult::error(message)),
            Some(Scripted::Raise(message)) => Err(IntegrationError::ExecutionFailed(message)),
            Some(Scripted::Sleep(duration, output)) => {
                tokio::time::sleep(duration).await;
                Ok(ActionResult::success(output))
            }
            Some(Scripted::Panic) => panic!("integration exploded"),
        }
    }
}

/// Resolves a credential for every platform.
#[derive(Debug, Default)]
pub(crate) struct AllowAllCredentials;

#[async_trait]
impl CredentialResolver for AllowAllCredentials {
    async fn resolve(
        &self,
        _automation_id: &str,
        platform: &str,
    ) -> Result<Credential, CredentialError> {
        Ok(Credential::new(format!("cred-{}", platform), platform, "token"))
    }
}

/// Agent caller with canned outputs per agent id.
///
/// Unknown agents answer `{"agent": <id>, "prompt": <prompt>}`.
#[derive(Debug, Default)]
pub(crate) struct StubAgent {
    outputs: HashMap<String, serde_json::Value>,
    prompts: Mutex<Vec<String>>,
}

impl StubAgent {
    pub fn with_output(mut self, agent_id: &str, output: serde_json::Value) -> Self {
        self.outputs.insert(agent_id.to_string(), output);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentCaller for StubAgent {
    async fn call(
        &self,
        agent_id: &str,
        prompt: &str,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, IntegrationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self
            .outputs
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| json!({"agent": agent_id, "prompt": prompt})))
    }
}
