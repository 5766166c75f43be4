//! HTTP model backend.
//!
//! Speaks a minimal JSON completion contract: POST `{model?, prompt}`
//! to a configured endpoint, expect `{text}` back. Bearer auth when an
//! API key is configured. Deadlines are enforced by the caller, not
//! here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BackendError, ModelBackend};

/// Model backend over a JSON HTTP endpoint.
pub struct HttpModelBackend {
    client: reqwest::Client,
    url: String,
    model: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

impl HttpModelBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: None,
            api_key: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    fn name(&self) -> &str {
        "http-model"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let body = CompletionRequest {
            model: self.model.as_deref(),
            prompt,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "model endpoint returned {}",
                status
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        Ok(completion.text)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let response = self.client.get(&self.url).send().await?;
        if response.status().is_server_error() {
            return Err(BackendError::Unavailable(format!(
                "model endpoint health probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
