//! Rate-limited, retrying calls to the completion service

use crate::config::ExtractorConfig;
use crate::context::RunContext;
use crate::error::ExtractorError;
use crate::parser::ResponseValidator;
use crate::prompt::PromptBuilder;
use crate::rate_limit::RateLimitTracker;
use crate::tokens;
use sieve_domain::{Chunk, ExtractedPair};
use sieve_llm::{CompletionError, CompletionService};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule for failed calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First delay after a quota refusal
    pub quota_base_delay: Duration,
    /// Ceiling on quota delays
    pub quota_max_delay: Duration,
    /// Growth factor between quota delays
    pub quota_backoff_factor: f64,
    /// Unit delay after a transient failure
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExtractorConfig::default())
    }
}

impl RetryPolicy {
    /// Build the policy from extractor configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            quota_base_delay: Duration::from_secs(config.rate_limit_base_delay_secs),
            quota_max_delay: Duration::from_secs(config.rate_limit_max_delay_secs),
            quota_backoff_factor: config.rate_limit_backoff_factor,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` if the error is final
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_extractor::RetryPolicy;
    /// use sieve_llm::CompletionError;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// let quota = CompletionError::QuotaExceeded("429".into());
    /// assert_eq!(policy.delay_for(&quota, 0), Some(Duration::from_secs(30)));
    /// assert_eq!(policy.delay_for(&quota, 1), Some(Duration::from_secs(45)));
    /// assert_eq!(policy.delay_for(&quota, 10), Some(Duration::from_secs(300)));
    /// ```
    pub fn delay_for(&self, error: &CompletionError, attempt: u32) -> Option<Duration> {
        match error {
            CompletionError::QuotaExceeded(_) => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = self.quota_base_delay.as_secs_f64() * self.quota_backoff_factor.powi(exponent);
                let capped = secs.min(self.quota_max_delay.as_secs_f64());
                Some(Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.quota_max_delay))
            }
            CompletionError::Transient(_) => Some(self.retry_delay.saturating_mul(attempt.saturating_add(1))),
            CompletionError::NonRetryable(_) => None,
        }
    }
}

/// What one chunk produced
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkExtraction {
    /// Validated pairs that passed the confidence filter
    pub pairs: Vec<ExtractedPair>,
    /// The service answered with something that was not JSON
    pub malformed: bool,
    /// Records dropped by validation
    pub rejected: usize,
    /// Tokens charged against the rate limit for this call
    pub estimated_tokens: u64,
}

/// Sends chunks to the completion service under the shared token budget
pub struct CompletionClient<S: ?Sized> {
    service: Arc<S>,
    tracker: Arc<RateLimitTracker>,
    validator: ResponseValidator,
    retry: RetryPolicy,
    max_admission_waits: u32,
    call_timeout: Duration,
}

impl<S> CompletionClient<S>
where
    S: CompletionService + ?Sized,
{
    /// Create a client over a shared service and tracker
    pub fn new(service: Arc<S>, tracker: Arc<RateLimitTracker>, config: &ExtractorConfig) -> Self {
        Self {
            service,
            tracker,
            validator: ResponseValidator::from_config(config),
            retry: RetryPolicy::from_config(config),
            max_admission_waits: config.max_admission_waits,
            call_timeout: config.call_timeout(),
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Label of the underlying service
    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// The shared token tracker
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// Extract pairs from one chunk
    pub async fn extract(
        &self,
        chunk: &Chunk,
        metadata: &BTreeMap<String, String>,
        ctx: &RunContext,
    ) -> Result<ChunkExtraction, ExtractorError> {
        let prompt = PromptBuilder::new(&chunk.text).with_metadata(metadata).build();
        let estimated = tokens::estimate(&prompt);
        debug!(
            "Chunk {}: {} bytes, prompt ~{} tokens",
            chunk.index,
            chunk.text.len(),
            estimated
        );

        self.admit(chunk.index, estimated, ctx).await?;
        let raw = self.call_with_retry(chunk.index, &prompt, ctx).await?;
        self.tracker.record_usage(estimated);

        let parsed = self.validator.parse_response(&raw);
        debug!(
            "Chunk {}: {} pairs kept, {} rejected, {} below threshold",
            chunk.index,
            parsed.pairs.len(),
            parsed.rejected,
            parsed.below_threshold
        );

        Ok(ChunkExtraction {
            pairs: parsed.pairs,
            malformed: parsed.malformed,
            rejected: parsed.rejected,
            estimated_tokens: estimated,
        })
    }

    /// Wait until the tracker admits `estimated` tokens
    async fn admit(&self, index: usize, estimated: u64, ctx: &RunContext) -> Result<(), ExtractorError> {
        let mut waits = 0u32;
        loop {
            let (allowed, wait) = self.tracker.can_proceed(estimated);
            if allowed {
                return Ok(());
            }
            if wait.is_zero() {
                warn!(
                    "Chunk {}: request of ~{} tokens exceeds the whole window ({}); sending anyway",
                    index,
                    estimated,
                    self.tracker.max_tokens_per_window()
                );
                return Ok(());
            }
            if waits >= self.max_admission_waits {
                return Err(ExtractorError::AdmissionWaitExhausted(waits));
            }
            waits += 1;
            debug!("Chunk {}: rate limited, waiting {:?} ({}/{})", index, wait, waits, self.max_admission_waits);
            ctx.sleep(wait).await?;
        }
    }

    async fn call_with_retry(&self, index: usize, prompt: &str, ctx: &RunContext) -> Result<String, ExtractorError> {
        let mut attempt = 0u32;
        loop {
            let call = tokio::time::timeout(self.call_timeout, self.service.complete(prompt));
            let outcome = match ctx.run(call).await? {
                Ok(outcome) => outcome,
                Err(_) => Err(CompletionError::Transient(format!(
                    "no response within {:?}",
                    self.call_timeout
                ))),
            };

            let error = match outcome {
                Ok(raw) => return Ok(raw),
                Err(error) => error,
            };

            let Some(delay) = self.retry.delay_for(&error, attempt) else {
                warn!("Chunk {}: {}", index, error);
                return Err(error.into());
            };
            if attempt >= self.retry.max_retries {
                warn!("Chunk {}: giving up after {} attempts: {}", index, attempt + 1, error);
                return Err(ExtractorError::ExhaustedRetries {
                    attempts: attempt + 1,
                    last: error.to_string(),
                });
            }

            warn!(
                "Chunk {}: attempt {} failed ({}), retrying in {:?}",
                index,
                attempt + 1,
                error,
                delay
            );
            ctx.sleep(delay).await?;
            attempt += 1;
        }
    }
}
