//! Credential resolution.
//!
//! Every action resolves the credential for its platform before the
//! integration is called. Resolution failure fails the step without any call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::CredentialError;

/// Credential handed to an integration.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub id: String,

    /// Platform the credential authenticates against (e.g. "slack").
    pub platform: String,

    /// Restricts the credential to one automation. `None` means shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,

    /// Token or key. Never serialized.
    #[serde(default, skip_serializing)]
    pub secret: String,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_active() -> bool {
    true
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        platform: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            automation_id: None,
            secret: secret.into(),
            active: true,
            metadata: HashMap::new(),
        }
    }

    pub fn for_automation(mut self, automation_id: impl Into<String>) -> Self {
        self.automation_id = Some(automation_id.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("automation_id", &self.automation_id)
            .field("secret", &"[REDACTED]")
            .field("active", &self.active)
            .finish()
    }
}

/// Looks up the active credential for a platform.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        automation_id: &str,
        platform: &str,
    ) -> Result<Credential, CredentialError>;
}

/// In-memory credential store.
///
/// A credential scoped to the requesting automation wins over a shared one.
/// Inactive credentials are never returned.
#[derive(Debug, Default)]
pub struct StaticCredentialResolver {
    credentials: RwLock<Vec<Credential>>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    pub async fn insert(&self, credential: Credential) {
        self.credentials.write().await.push(credential);
    }

    /// Deactivate every credential with the given id.
    pub async fn revoke(&self, id: &str) {
        let mut credentials = self.credentials.write().await;
        for credential in credentials.iter_mut().filter(|c| c.id == id) {
            credential.active = false;
        }
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        automation_id: &str,
        platform: &str,
    ) -> Result<Credential, CredentialError> {
        let credentials = self.credentials.read().await;
        let candidates = credentials
            .iter()
            .filter(|c| c.active && c.platform == platform);

        let mut shared = None;
        for credential in candidates {
            match credential.automation_id.as_deref() {
                Some(owner) if owner == automation_id => return Ok(credential.clone()),
                Some(_) => {}
                None if shared.is_none() => shared = Some(credential),
                None => {}
            }
        }

        shared.cloned().ok_or_else(|| CredentialError::NotFound {
            platform: platform.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_shared_credential() {
        let resolver =
            StaticCredentialResolver::with_credentials(vec![Credential::new("c1", "slack", "xoxb")]);

        let credential = resolver.resolve("auto-1", "slack").await.unwrap();
        assert_eq!(credential.id, "c1");
        assert_eq!(credential.secret, "xoxb");
    }

    #[tokio::test]
    async fn test_automation_scoped_credential_wins() {
        let resolver = StaticCredentialResolver::with_credentials(vec![
            Credential::new("shared", "slack", "a"),
            Credential::new("scoped", "slack", "b").for_automation("auto-1"),
            Credential::new("other", "slack", "c").for_automation("auto-2"),
        ]);

        assert_eq!(resolver.resolve("auto-1", "slack").await.unwrap().id, "scoped");
        assert_eq!(resolver.resolve("auto-3", "slack").await.unwrap().id, "shared");
    }

    #[tokio::test]
    async fn test_inactive_and_missing() {
        let resolver = StaticCredentialResolver::new();
        resolver
            .insert(Credential::new("c1", "github", "t").inactive())
            .await;

        let err = resolver.resolve("auto-1", "github").await.unwrap_err();
        assert_eq!(
            err,
            CredentialError::NotFound {
                platform: "github".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_revoke() {
        let resolver =
            StaticCredentialResolver::with_credentials(vec![Credential::new("c1", "slack", "x")]);
        resolver.revoke("c1").await;
        assert!(resolver.resolve("auto-1", "slack").await.is_err());
        assert_eq!(resolver.len().await, 1);
    }

    #[test]
    fn test_secret_is_redacted() {
        let credential = Credential::new("c1", "slack", "super-secret");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));

        let json = serde_json::to_value(&credential).unwrap();
        assert!(json.get("secret").is_none());
    }
}
