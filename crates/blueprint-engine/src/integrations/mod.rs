//! Integration registry and dispatch.
//!
//! The interpreter only sees [`ActionInvoker`]. [`IntegrationRegistry`] is the
//! default invoker and routes each call to a named [`Integration`].

mod echo;
mod http;

pub use echo::EchoIntegration;
pub use http::{HttpIntegration, HttpRequestParams};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::credentials::Credential;
use crate::error::IntegrationError;
use crate::result::ActionResult;

/// Performs the external call behind an action step.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(
        &self,
        integration: &str,
        method: &str,
        parameters: &serde_json::Value,
        credential: &Credential,
    ) -> Result<ActionResult, IntegrationError>;
}

/// One named integration (e.g. "http", "slack").
#[async_trait]
pub trait Integration: Send + Sync {
    /// Returns the integration's unique name.
    fn name(&self) -> &'static str;

    async fn invoke(
        &self,
        method: &str,
        parameters: &serde_json::Value,
        credential: &Credential,
    ) -> Result<ActionResult, IntegrationError>;
}

/// Registry of available integrations.
pub struct IntegrationRegistry {
    integrations: HashMap<String, Arc<dyn Integration>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self {
            integrations: HashMap::new(),
        }
    }

    /// Register an integration, replacing any with the same name.
    pub fn register<I: Integration + 'static>(&mut self, integration: I) {
        let name = integration.name().to_string();
        self.integrations.insert(name, Arc::new(integration));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.integrations.contains_key(name)
    }

    /// Registered integration names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.integrations.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationRegistry")
            .field("integrations", &self.list())
            .finish()
    }
}

#[async_trait]
impl ActionInvoker for IntegrationRegistry {
    async fn invoke(
        &self,
        integration: &str,
        method: &str,
        parameters: &serde_json::Value,
        credential: &Credential,
    ) -> Result<ActionResult, IntegrationError> {
        let target = self
            .get(integration)
            .ok_or_else(|| IntegrationError::NotFound(integration.to_string()))?;

        tracing::debug!(integration, method, "Invoking integration");
        target.invoke(method, parameters, credential).await
    }
}

/// Registry with the built-in `http` and `echo` integrations.
pub fn create_default_registry() -> IntegrationRegistry {
    let mut registry = IntegrationRegistry::new();
    registry.register(HttpIntegration::new());
    registry.register(EchoIntegration);
    registry
}
