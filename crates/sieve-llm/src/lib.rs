//! Sieve LLM Provider Layer
//!
//! Pluggable completion-service implementations behind one async trait.
//!
//! # Architecture
//!
//! The extraction pipeline only ever sees [`CompletionService`]. Every
//! failure a provider reports is folded into one of three classes so the
//! caller can pick a retry policy without knowing the backend:
//!
//! - [`CompletionError::QuotaExceeded`]: the service refused on budget grounds
//! - [`CompletionError::Transient`]: network trouble, timeouts, 5xx
//! - [`CompletionError::NonRetryable`]: the request itself is bad
//!
//! Providers make exactly one attempt per call. Retries, backoff and rate
//! limiting belong to the caller.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted mock for testing
//! - `OllamaProvider`: Local Ollama API integration
//! - `OpenAiProvider`: OpenAI-compatible chat completions API
//!
//! # Examples
//!
//! ```
//! use sieve_llm::{CompletionService, MockProvider};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let provider = MockProvider::new("Hello from LLM!");
//! let result = provider.complete("test prompt").await.unwrap();
//! assert_eq!(result, "Hello from LLM!");
//! # }
//! ```

#![warn(missing_docs)]

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Errors a completion service can report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Explicit quota or rate-limit refusal from the service
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Network, timeout or server-side failure worth retrying
    #[error("Transient service error: {0}")]
    Transient(String),

    /// Malformed request, bad credentials or unknown model
    #[error("Non-retryable error: {0}")]
    NonRetryable(String),
}

impl CompletionError {
    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CompletionError::NonRetryable(_))
    }

    /// Classify an HTTP error status
    ///
    /// 429 is a quota refusal; 408 and every 5xx are transient; any other
    /// status is a problem with the request.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, body.into());
        match status {
            429 => CompletionError::QuotaExceeded(message),
            408 | 500..=599 => CompletionError::Transient(message),
            _ => CompletionError::NonRetryable(message),
        }
    }
}

/// An external text-completion service
///
/// Cancellation is by dropping the returned future; implementations must
/// not leave detached work behind.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a prompt, making a single attempt
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Short provider/model label used in logs and result metadata
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        (**self).complete(prompt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

type Scripted = Result<String, CompletionError>;

/// Mock completion provider for deterministic testing
///
/// Resolution order for each call:
/// 1. the first keyed entry whose key occurs in the prompt
/// 2. the next entry of the scripted queue
/// 3. the default outcome
///
/// Clones share state, so a clone handed to the pipeline still reports its
/// call count to the test.
///
/// # Examples
///
/// ```
/// use sieve_llm::{CompletionError, CompletionService, MockProvider};
///
/// # #[tokio::main]
/// # async fn main() {
/// let provider = MockProvider::new("[]");
/// provider.push_error(CompletionError::Transient("flaky".into()));
/// provider.add_response("chunk two", "{}");
///
/// assert!(provider.complete("chunk one").await.is_err());
/// assert_eq!(provider.complete("chunk one").await.unwrap(), "[]");
/// assert_eq!(provider.complete("... chunk two ...").await.unwrap(), "{}");
/// assert_eq!(provider.call_count(), 3);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_outcome: Scripted,
    keyed: Arc<Mutex<Vec<(String, Scripted)>>>,
    script: Arc<Mutex<VecDeque<Scripted>>>,
    call_count: Arc<Mutex<usize>>,
    latency: Option<Duration>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self::with_default(Ok(response.into()))
    }

    /// Create a MockProvider that fails every unscripted call
    pub fn failing(error: CompletionError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default_outcome: Scripted) -> Self {
        Self {
            default_outcome,
            keyed: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            call_count: Arc::new(Mutex::new(0)),
            latency: None,
        }
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Respond with `response` whenever the prompt contains `key`
    pub fn add_response(&self, key: impl Into<String>, response: impl Into<String>) {
        lock(&self.keyed).push((key.into(), Ok(response.into())));
    }

    /// Fail with `error` whenever the prompt contains `key`
    pub fn add_error(&self, key: impl Into<String>, error: CompletionError) {
        lock(&self.keyed).push((key.into(), Err(error)));
    }

    /// Queue a one-shot response
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.script).push_back(Ok(response.into()));
    }

    /// Queue a one-shot error
    pub fn push_error(&self, error: CompletionError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        *lock(&self.call_count) = 0;
    }

    fn resolve(&self, prompt: &str) -> Scripted {
        if let Some((_, outcome)) = lock(&self.keyed)
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
        {
            return outcome.clone();
        }
        if let Some(outcome) = lock(&self.script).pop_front() {
            return outcome;
        }
        self.default_outcome.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("[]")
    }
}

#[async_trait]
impl CompletionService for MockProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        *lock(&self.call_count) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.resolve(prompt)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Lock a mock's shared state; a panicking test thread must not wedge the others
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.complete("any prompt").await;
        assert_eq!(result.unwrap(), "Test response");
    }

    #[tokio::test]
    async fn test_mock_provider_keyed_responses() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.complete("say hello").await.unwrap(), "world");
        assert_eq!(provider.complete("foo!").await.unwrap(), "bar");
        assert_eq!(provider.complete("unknown").await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_mock_provider_script_runs_in_order() {
        let provider = MockProvider::new("done");
        provider.push_error(CompletionError::QuotaExceeded("slow down".into()));
        provider.push_response("first");

        assert!(matches!(
            provider.complete("p").await,
            Err(CompletionError::QuotaExceeded(_))
        ));
        assert_eq!(provider.complete("p").await.unwrap(), "first");
        assert_eq!(provider.complete("p").await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_mock_provider_failing() {
        let provider = MockProvider::failing(CompletionError::NonRetryable("bad".into()));
        let err = provider.complete("p").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_provider_clone_shares_count() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.complete("test").await.unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);

        provider2.reset_call_count();
        assert_eq!(provider1.call_count(), 0);
    }

    #[tokio::test]
    async fn test_arc_provider_delegates() {
        let provider: Arc<dyn CompletionService> = Arc::new(MockProvider::new("shared"));
        assert_eq!(provider.complete("x").await.unwrap(), "shared");
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            CompletionError::from_status(429, "too many"),
            CompletionError::QuotaExceeded(_)
        ));
        assert!(matches!(
            CompletionError::from_status(503, "unavailable"),
            CompletionError::Transient(_)
        ));
        assert!(matches!(
            CompletionError::from_status(408, "timeout"),
            CompletionError::Transient(_)
        ));
        assert!(matches!(
            CompletionError::from_status(400, "bad json"),
            CompletionError::NonRetryable(_)
        ));
    }
}
