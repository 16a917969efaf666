//! Ollama Provider Implementation
//!
//! Provides integration with Ollama's local LLM API, which lets support
//! transcripts stay on the machine that holds them.
//!
//! # Examples
//!
//! ```no_run
//! use sieve_llm::{CompletionService, OllamaProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OllamaProvider::new("http://localhost:11434", "llama3")?;
//! let text = provider.complete("Extract Q&A pairs from ...").await?;
//! # Ok(())
//! # }
//! ```

use crate::{CompletionError, CompletionService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default timeout for LLM requests (120 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Ollama API provider for local LLM inference
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    label: String,
    client: reqwest::Client,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "llama3", "mistral")
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, CompletionError> {
        Self::with_timeout(endpoint, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new Ollama provider with an explicit HTTP timeout
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::NonRetryable(format!("HTTP client setup failed: {}", e)))?;

        let model = model.into();
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            label: format!("ollama:{}", model),
            model,
            client,
        })
    }

    /// Create a new Ollama provider on `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, CompletionError> {
        Self::new(DEFAULT_ENDPOINT, model)
    }
}

#[async_trait]
impl CompletionService for OllamaProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/api/generate", self.endpoint);

        let request_body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CompletionError::NonRetryable(format!(
                "Model not available: {}",
                self.model
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::from_status(status.as_u16(), error_text));
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Transient(format!("Failed to parse response: {}", e)))?;

        debug!("{} returned {} chars", self.label, body.response.len());
        Ok(body.response)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Map a transport-level reqwest failure onto the retry taxonomy
pub(crate) fn classify_transport_error(e: reqwest::Error) -> CompletionError {
    if e.is_builder() {
        CompletionError::NonRetryable(format!("Invalid request: {}", e))
    } else {
        CompletionError::Transient(format!("Request failed: {}", e))
    }
}
