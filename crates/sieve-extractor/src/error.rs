//! Error types for the Extractor

use sieve_llm::CompletionError;
use thiserror::Error;

/// Errors that can occur during extraction
///
/// Malformed service output and per-record validation failures are not
/// errors: the parser drops them and reports counts instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// Quota or rate-limit refusal from the completion service
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Retryable service failure (network, timeout, 5xx)
    #[error("Transient service error: {0}")]
    Transient(String),

    /// Request the service will never accept
    #[error("Non-retryable error: {0}")]
    NonRetryable(String),

    /// Retries ran out on a retryable failure
    #[error("Exhausted {attempts} attempts: {last}")]
    ExhaustedRetries {
        /// Calls made before giving up
        attempts: u32,
        /// The final failure
        last: String,
    },

    /// The rate limiter kept refusing admission
    #[error("Rate limiter refused admission after {0} waits")]
    AdmissionWaitExhausted(u32),

    /// The caller cancelled the run
    #[error("Extraction cancelled")]
    Cancelled,

    /// The run deadline passed
    #[error("Extraction deadline exceeded")]
    DeadlineExceeded,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A chunk worker task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),
}

impl From<CompletionError> for ExtractorError {
    fn from(e: CompletionError) -> Self {
        match e {
            CompletionError::QuotaExceeded(msg) => ExtractorError::QuotaExceeded(msg),
            CompletionError::Transient(msg) => ExtractorError::Transient(msg),
            CompletionError::NonRetryable(msg) => ExtractorError::NonRetryable(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ExtractorError {
    fn from(e: tokio::task::JoinError) -> Self {
        ExtractorError::Task(e.to_string())
    }
}
