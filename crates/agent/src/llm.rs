use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Body posted to the extraction endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_input: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the raw response body.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build extraction http client")?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for HttpLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLlmClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.context("extraction request failed")?;
        let status = response.status();
        let body = response.text().await.context("failed to read extraction response")?;
        if !status.is_success() {
            bail!("extraction endpoint returned {status}");
        }
        Ok(body)
    }
}
