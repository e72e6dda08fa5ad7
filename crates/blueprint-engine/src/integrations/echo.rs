//! Echo integration.
//!
//! Returns its input. Method `fail` reports failure with `parameters.message`.

use async_trait::async_trait;
use serde_json::json;

use super::Integration;
use crate::credentials::Credential;
use crate::error::IntegrationError;
use crate::result::ActionResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoIntegration;

#[async_trait]
impl Integration for EchoIntegration {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn invoke(
        &self,
        method: &str,
        parameters: &serde_json::Value,
        _credential: &Credential,
    ) -> Result<ActionResult, IntegrationError> {
        if method == "fail" {
            let message = parameters
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("echo failure");
            return Ok(ActionResult::error(message));
        }

        Ok(ActionResult::success(json!({
            "method": method,
            "parameters": parameters,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_parameters() {
        let credential = Credential::new("c1", "echo", "");
        let result = EchoIntegration
            .invoke("send", &json!({"text": "hi"}), &credential)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            result.output,
            Some(json!({"method": "send", "parameters": {"text": "hi"}}))
        );
    }

    #[tokio::test]
    async fn test_echo_fail() {
        let credential = Credential::new("c1", "echo", "");
        let result = EchoIntegration
            .invoke("fail", &json!({"message": "boom"}), &credential)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
