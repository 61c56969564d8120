//! Generative text API client.
//!
//! The pipeline talks to the model through the [`AskAsync`] trait so the
//! summarizer can be exercised without a network. [`OpenAiClient`] is the
//! production implementation for any OpenAI-compatible `/chat/completions`
//! endpoint.
//!
//! Clients are built per session: [`ProviderFactory::connect`] takes the API key
//! held by the credential store, so no key is baked into process-wide state.
//!
//! Each call is a single attempt. Transport, authentication and rate-limit
//! failures come back as [`ApiError`] for the caller to report.

use crate::error::ApiError;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// One chat-style completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Async access to a chat-completion model.
#[async_trait]
pub trait AskAsync: Send + Sync {
    /// Send one request and return the assistant's text.
    async fn ask(&self, request: &ChatRequest) -> Result<String, ApiError>;

    /// Cheap authenticated call used to validate the API key up front.
    async fn check_key(&self) -> Result<(), ApiError>;
}

/// Builds an [`AskAsync`] client bound to one API key.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, api_key: &str) -> Arc<dyn AskAsync>;
}

/// OpenAI-compatible chat client.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Bind `client` to an endpoint and key.
    ///
    /// # Arguments
    ///
    /// * `client` - a configured HTTP client; see [`OpenAiFactory::new`]
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`
    /// * `api_key` - sent as a bearer token
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(ApiError::RateLimited { retry_after_secs })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::Http {
                    status: status.as_u16(),
                    body: truncate_for_log(&body, 500),
                })
            }
        }
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AskAsync for OpenAiClient {
    #[instrument(level = "info", skip_all, fields(model = %request.model, max_tokens = request.max_tokens))]
    async fn ask(&self, request: &ChatRequest) -> Result<String, ApiError> {
        let t0 = Instant::now();
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
        });

        let result: Result<String, ApiError> = async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            let payload: Value = response.json().await?;
            payload["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    ApiError::Malformed(format!(
                        "no choices[0].message.content in {}",
                        truncate_for_log(&payload.to_string(), 300)
                    ))
                })
        }
        .await;

        let dt = t0.elapsed();
        match &result {
            Ok(text) => info!(elapsed_ms = dt.as_millis() as u64, chars = text.len(), "Completion received"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "Completion failed"),
        }
        result
    }

    #[instrument(level = "info", skip_all)]
    async fn check_key(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::check_status(response).await?;
        info!("API key accepted by provider");
        Ok(())
    }
}

/// Factory for [`OpenAiClient`]s sharing one endpoint and HTTP client.
#[derive(Debug, Clone)]
pub struct OpenAiFactory {
    client: Client,
    base_url: String,
}

impl OpenAiFactory {
    /// Build the shared HTTP client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root every connected client talks to
    /// * `timeout` - whole-request timeout applied to every call
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("inbox_digest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl ProviderFactory for OpenAiFactory {
    fn connect(&self, api_key: &str) -> Arc<dyn AskAsync> {
        Arc::new(OpenAiClient::new(self.client.clone(), &self.base_url, api_key))
    }
}
