//! OpenAI-compatible chat completions provider
//!
//! Works against api.openai.com and any server exposing the same
//! `/v1/chat/completions` surface. Quota refusals arrive as HTTP 429 (both
//! the per-minute limiter and `insufficient_quota`), which is what the
//! extraction client's progressive backoff is built around.

use crate::ollama::classify_transport_error;
use crate::{CompletionError, CompletionService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default timeout for completion requests (120 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Chat completions provider
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    label: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

const SYSTEM_MESSAGE: &str =
    "You extract question and answer pairs from support conversations and reply with JSON only.";

impl OpenAiProvider {
    /// Create a provider with an explicit key
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| CompletionError::NonRetryable(format!("HTTP client setup failed: {}", e)))?;

        let model = model.into();
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            label: format!("openai:{}", model),
            model,
            temperature: 0.1,
            client,
        })
    }

    /// Create a provider reading the key from `OPENAI_API_KEY`
    pub fn from_env(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, CompletionError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            CompletionError::NonRetryable(format!("{} is not set", API_KEY_ENV))
        })?;
        Self::new(base_url, api_key, model)
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl CompletionService for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_MESSAGE },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::from_status(status.as_u16(), error_text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Transient(format!("Failed to parse response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Transient("Response had no choices".to_string()))?;

        debug!("{} returned {} chars", self.label, content.len());
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.label
    }
}
