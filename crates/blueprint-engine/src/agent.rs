//! AI agent callers.

use async_trait::async_trait;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::IntegrationError;

/// Runs an agent on a rendered prompt and returns its output.
#[async_trait]
pub trait AgentCaller: Send + Sync {
    async fn call(
        &self,
        agent_id: &str,
        prompt: &str,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, IntegrationError>;
}

/// Agent caller that rejects every call.
///
/// Default for engines built without an agent service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAgentCaller;

#[async_trait]
impl AgentCaller for UnconfiguredAgentCaller {
    async fn call(
        &self,
        agent_id: &str,
        _prompt: &str,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, IntegrationError> {
        Err(IntegrationError::Configuration(format!(
            "no agent service configured for agent '{}'",
            agent_id
        )))
    }
}

/// Agent caller backed by an HTTP agent service.
///
/// Sends `POST {base_url}/agents/{agent_id}/invoke`. The response's `output`
/// field is the agent output, or the whole body when there is no such field.
pub struct HttpAgentCaller {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentCaller {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, agent_id: &str) -> String {
        format!("{}/agents/{}/invoke", self.base_url, agent_id)
    }
}

impl std::fmt::Debug for HttpAgentCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAgentCaller")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl AgentCaller for HttpAgentCaller {
    async fn call(
        &self,
        agent_id: &str,
        prompt: &str,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, IntegrationError> {
        let url = self.endpoint(agent_id);
        tracing::debug!(agent_id, url = %url, "Calling agent");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "prompt": prompt,
                "automation_id": ctx.automation_id,
                "run_id": ctx.run_id,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IntegrationError::ExecutionFailed(format!(
                "agent '{}' returned HTTP {}: {}",
                agent_id,
                status.as_u16(),
                text
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(extract_output(body))
    }
}

fn extract_output(body: serde_json::Value) -> serde_json::Value {
    match body {
        serde_json::Value::Object(mut map) if map.contains_key("output") => {
            map.remove("output").unwrap_or(serde_json::Value::Null)
        }
        other => other,
    }
}
