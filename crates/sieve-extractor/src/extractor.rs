//! Core Extractor implementation

use crate::config::ExtractorConfig;
use crate::context::RunContext;
use crate::error::ExtractorError;
use crate::fallback::FallbackExtractor;
use crate::rate_limit::RateLimitTracker;
use crate::strategy::{AiStrategy, ExtractionStrategy, Plan, StrategyOutput};
use sieve_domain::{DegradedReason, ExtractionRequest, PipelineResult};
use sieve_llm::CompletionService;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// The Extractor turns support conversations into Q&A pairs
///
/// Runs go `Planning → SingleShot | Chunked → Merging → Done`, or, when
/// the AI path is off or produced nothing usable, through the degraded
/// branch `Degraded → FallbackExtraction → Done`.
pub struct Extractor<S: ?Sized> {
    ai: AiStrategy<S>,
    fallback: FallbackExtractor,
    tracker: Arc<RateLimitTracker>,
    config: ExtractorConfig,
}

impl<S> Extractor<S>
where
    S: CompletionService + 'static,
{
    /// Create an Extractor with its own rate-limit tracker
    pub fn new(service: S, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        let tracker = Arc::new(RateLimitTracker::from_config(&config));
        Self::with_tracker(Arc::new(service), tracker, config)
    }
}

impl<S> Extractor<S>
where
    S: CompletionService + ?Sized + 'static,
{
    /// Create an Extractor sharing a service and tracker with other runs
    pub fn with_tracker(
        service: Arc<S>,
        tracker: Arc<RateLimitTracker>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        Ok(Self {
            ai: AiStrategy::new(service, Arc::clone(&tracker), &config),
            fallback: FallbackExtractor::new(),
            tracker,
            config,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// The shared rate-limit tracker
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// How the AI path would process `text`
    pub fn plan(&self, text: &str) -> Plan {
        self.ai.plan(text)
    }

    /// Extract pairs with only the configured run timeout
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<PipelineResult, ExtractorError> {
        self.extract_with(request, RunContext::background()).await
    }

    /// Extract pairs under the caller's deadline and cancel signal
    ///
    /// The effective deadline is the earlier of the caller's and
    /// `run_timeout_secs`. Passing it degrades the run to pattern
    /// extraction; cancellation always returns [`ExtractorError::Cancelled`].
    pub async fn extract_with(
        &self,
        request: &ExtractionRequest,
        ctx: RunContext,
    ) -> Result<PipelineResult, ExtractorError> {
        let started = Instant::now();
        let ctx = ctx.with_timeout(self.config.run_timeout());

        if request.source_text.trim().is_empty() {
            info!("Empty request, nothing to extract");
            return Ok(PipelineResult::default());
        }
        ctx.check()?;

        if !self.config.ai_enabled {
            return self
                .degrade(request, DegradedReason::AiDisabled, StrategyOutput::default(), &ctx, started)
                .await;
        }

        info!(
            "Starting extraction: {} bytes, platform {}",
            request.source_text.len(),
            request.platform().unwrap_or("unknown")
        );

        let output = self.ai.extract(request, &ctx).await?;

        if output.deadline_exceeded {
            return self
                .degrade(request, DegradedReason::DeadlineExceeded, output, &ctx, started)
                .await;
        }
        if output.all_chunks_failed() {
            return self
                .degrade(request, DegradedReason::AllChunksFailed, output, &ctx, started)
                .await;
        }

        let result = finish(output, false, None, started);
        info!(
            "Extraction complete: {} pairs from {}/{} chunks, ~{} tokens, {}ms",
            result.pairs.len(),
            result.successful_chunks(),
            result.chunk_count,
            result.total_estimated_tokens,
            result.processing_time_ms
        );
        Ok(result)
    }

    async fn degrade(
        &self,
        request: &ExtractionRequest,
        reason: DegradedReason,
        ai_output: StrategyOutput,
        ctx: &RunContext,
        started: Instant,
    ) -> Result<PipelineResult, ExtractorError> {
        if ctx.is_cancelled() {
            return Err(ExtractorError::Cancelled);
        }
        warn!("Extraction degraded ({}), falling back to pattern extraction", reason);

        let pairs = if self.config.fallback_enabled {
            self.fallback.extract(request, ctx).await?.pairs
        } else {
            warn!("Pattern fallback disabled; returning no pairs");
            Vec::new()
        };

        if reason == DegradedReason::DeadlineExceeded && pairs.is_empty() {
            return Err(ExtractorError::DeadlineExceeded);
        }

        // Chunk accounting survives; the pairs are the pattern pass's
        let output = StrategyOutput { pairs, ..ai_output };
        let result = finish(output, true, Some(reason), started);
        info!(
            "Degraded extraction complete: {} pattern pairs, {}ms",
            result.pairs.len(),
            result.processing_time_ms
        );
        Ok(result)
    }
}

fn finish(
    output: StrategyOutput,
    degraded: bool,
    degraded_reason: Option<DegradedReason>,
    started: Instant,
) -> PipelineResult {
    PipelineResult {
        pairs: output.pairs,
        degraded,
        degraded_reason,
        chunk_count: output.chunk_count,
        total_estimated_tokens: output.total_estimated_tokens,
        chunk_reports: output.chunk_reports,
        processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}
