//! HTTP integration.
//!
//! The action method is the HTTP verb. Parameters:
//! - `url` (required)
//! - `headers`, `query`: string maps
//! - `body`: JSON value, or a string sent verbatim
//!
//! A non-empty credential secret is sent as a bearer token.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::Integration;
use crate::credentials::Credential;
use crate::error::IntegrationError;
use crate::result::ActionResult;

/// Parameters accepted by the HTTP integration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpRequestParams {
    pub url: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub query: HashMap<String, String>,

    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// HTTP request integration.
pub struct HttpIntegration {
    client: reqwest::Client,
}

impl HttpIntegration {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn parse_method(method: &str) -> Result<Method, IntegrationError> {
        match method.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::GET),
            "post" => Ok(Method::POST),
            "put" => Ok(Method::PUT),
            "patch" => Ok(Method::PATCH),
            "delete" => Ok(Method::DELETE),
            "head" => Ok(Method::HEAD),
            _ => Err(IntegrationError::UnsupportedMethod {
                integration: "http".to_string(),
                method: method.to_string(),
            }),
        }
    }

    async fn request(
        &self,
        method: Method,
        params: HttpRequestParams,
        credential: &Credential,
    ) -> Result<ActionResult, IntegrationError> {
        let start = std::time::Instant::now();
        let mut request = self.client.request(method, &params.url);

        if !params.query.is_empty() {
            request = request.query(&params.query);
        }
        for (key, value) in &params.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        match params.body {
            Some(serde_json::Value::String(text)) => request = request.body(text),
            Some(body) => request = request.json(&body),
            None => {}
        }
        if !credential.secret.is_empty() {
            request = request.bearer_auth(&credential.secret);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body: serde_json::Value =
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        let duration_ms = start.elapsed().as_millis() as u64;

        if !(200..300).contains(&status) {
            return Ok(ActionResult::error(format!("HTTP {} response", status))
                .with_duration(duration_ms));
        }

        Ok(ActionResult::success(serde_json::json!({
            "status": status,
            "body": body,
        }))
        .with_duration(duration_ms))
    }
}

impl Default for HttpIntegration {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Integration for HttpIntegration {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn invoke(
        &self,
        method: &str,
        parameters: &serde_json::Value,
        credential: &Credential,
    ) -> Result<ActionResult, IntegrationError> {
        let method = Self::parse_method(method)?;
        let params: HttpRequestParams = serde_json::from_value(parameters.clone())
            .map_err(|e| IntegrationError::Configuration(format!("invalid http parameters: {}", e)))?;

        tracing::debug!(method = %method, url = %params.url, "Sending HTTP request");
        self.request(method, params, credential).await
    }
}
