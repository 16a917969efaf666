//! Extraction strategies: the AI path and the pattern path

use crate::chunking::ChunkPlanner;
use crate::client::{ChunkExtraction, CompletionClient};
use crate::config::ExtractorConfig;
use crate::context::RunContext;
use crate::error::ExtractorError;
use crate::fallback::FallbackExtractor;
use crate::merge::ResultMerger;
use crate::rate_limit::RateLimitTracker;
use crate::tokens;
use async_trait::async_trait;
use sieve_domain::{Chunk, ChunkReport, ChunkStatus, ExtractedPair, ExtractionMethod, ExtractionRequest};
use sieve_llm::CompletionService;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a strategy produced for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyOutput {
    /// Extracted pairs, deduplicated where the strategy merges
    pub pairs: Vec<ExtractedPair>,
    /// Per-chunk outcomes ordered by index (empty for the pattern path)
    pub chunk_reports: Vec<ChunkReport>,
    /// Chunks the text was planned into
    pub chunk_count: usize,
    /// Tokens charged against the rate limit
    pub total_estimated_tokens: u64,
    /// The run deadline passed before every chunk finished
    pub deadline_exceeded: bool,
}

impl StrategyOutput {
    /// Whether chunks were attempted and none of them produced a usable response
    pub fn all_chunks_failed(&self) -> bool {
        !self.chunk_reports.is_empty() && self.chunk_reports.iter().all(|r| !r.status.is_success())
    }
}

/// A way of turning a request into Q&A pairs
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Method recorded on the pairs this strategy produces
    fn method(&self) -> ExtractionMethod;

    /// Extract pairs from the request
    ///
    /// Only [`ExtractorError::Cancelled`] is returned as an error. Chunk
    /// failures are reported in the output, and a passed deadline sets
    /// [`StrategyOutput::deadline_exceeded`] with the unfinished chunks
    /// reported as failed.
    async fn extract(
        &self,
        request: &ExtractionRequest,
        ctx: &RunContext,
    ) -> Result<StrategyOutput, ExtractorError>;
}

#[async_trait]
impl ExtractionStrategy for FallbackExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Pattern
    }

    /// Runs to completion regardless of `ctx`; it is how expired runs recover
    async fn extract(
        &self,
        request: &ExtractionRequest,
        _ctx: &RunContext,
    ) -> Result<StrategyOutput, ExtractorError> {
        Ok(StrategyOutput {
            pairs: self.extract_patterns(&request.source_text),
            ..Default::default()
        })
    }
}

/// How the AI path will process a text
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// One call over the whole text
    SingleShot(Chunk),
    /// One call per chunk, then a merge
    Chunked(Vec<Chunk>),
}

impl Plan {
    /// Number of calls the plan makes
    pub fn chunk_count(&self) -> usize {
        match self {
            Plan::SingleShot(_) => 1,
            Plan::Chunked(chunks) => chunks.len(),
        }
    }
}

type ChunkOutcome = (Chunk, Result<ChunkExtraction, ExtractorError>);

/// Extraction through the completion service
pub struct AiStrategy<S: ?Sized> {
    client: Arc<CompletionClient<S>>,
    planner: ChunkPlanner,
    merger: ResultMerger,
    max_chunk_chars: usize,
    max_tokens_per_window: u64,
    chunk_concurrency: usize,
}

impl<S> AiStrategy<S>
where
    S: CompletionService + ?Sized + 'static,
{
    /// Create the AI strategy over a shared service and tracker
    pub fn new(service: Arc<S>, tracker: Arc<RateLimitTracker>, config: &ExtractorConfig) -> Self {
        Self {
            client: Arc::new(CompletionClient::new(service, tracker, config)),
            planner: ChunkPlanner::from_config(config),
            merger: ResultMerger::from_config(config),
            max_chunk_chars: config.max_chunk_chars,
            max_tokens_per_window: config.max_tokens_per_window,
            chunk_concurrency: config.chunk_concurrency.max(1),
        }
    }

    /// The client used for every call
    pub fn client(&self) -> &CompletionClient<S> {
        &self.client
    }

    /// Decide between a single call and a chunked run
    pub fn plan(&self, text: &str) -> Plan {
        let estimated = tokens::estimate(text);
        if text.len() <= self.max_chunk_chars && estimated <= self.max_tokens_per_window {
            Plan::SingleShot(Chunk {
                index: 0,
                text: text.to_string(),
                estimated_tokens: estimated,
                start: 0,
                overlap: 0,
            })
        } else {
            Plan::Chunked(self.plan_chunks(text))
        }
    }

    /// Chunk `text`, shrinking chunks until each one fits the token window
    fn plan_chunks(&self, text: &str) -> Vec<Chunk> {
        let mut planner = self.planner.clone();
        loop {
            let chunks = planner.plan(text);
            let Some(largest) = chunks
                .iter()
                .filter(|c| c.estimated_tokens > self.max_tokens_per_window)
                .max_by_key(|c| c.estimated_tokens)
            else {
                return chunks;
            };

            let current = planner.max_chunk_chars();
            if current <= 1 {
                warn!(
                    "Chunk {} still estimated at {} tokens at minimum size",
                    largest.index, largest.estimated_tokens
                );
                return chunks;
            }

            // Aim a tenth under the window; the shape of a smaller slice can differ
            let fitted = largest.text.len() as u128 * u128::from(self.max_tokens_per_window) * 9
                / (u128::from(largest.estimated_tokens) * 10);
            let next = usize::try_from(fitted)
                .unwrap_or(usize::MAX)
                .min(current * 3 / 4)
                .max(1);
            debug!(
                "Chunk {} estimated at {} tokens exceeds window of {}; re-planning at {} bytes",
                largest.index, largest.estimated_tokens, self.max_tokens_per_window, next
            );
            planner = planner.resized(next);
        }
    }

    async fn run_chunks(
        &self,
        chunks: Vec<Chunk>,
        metadata: &BTreeMap<String, String>,
        ctx: &RunContext,
    ) -> Result<(Vec<ChunkOutcome>, bool), ExtractorError> {
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.chunk_concurrency));
        let metadata = Arc::new(metadata.clone());
        let mut tasks = JoinSet::new();

        for chunk in chunks.iter().cloned() {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let metadata = Arc::clone(&metadata);
            let ctx = ctx.clone();

            tasks.spawn(async move {
                let index = chunk.index;
                let outcome = match ctx.run(semaphore.acquire_owned()).await {
                    Ok(Ok(_permit)) => client.extract(&chunk, &metadata, &ctx).await,
                    Ok(Err(closed)) => Err(ExtractorError::Task(closed.to_string())),
                    Err(interrupted) => Err(interrupted),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<ChunkExtraction, ExtractorError>>> = vec![None; total];
        let mut join_failure = None;
        let mut deadline_exceeded = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Err(ExtractorError::Cancelled))) => {
                    // Dropping the set aborts the chunks still running
                    debug!("Chunked run cancelled");
                    return Err(ExtractorError::Cancelled);
                }
                Ok((index, outcome)) => {
                    if matches!(outcome, Err(ExtractorError::DeadlineExceeded)) && !deadline_exceeded {
                        debug!("Deadline passed, abandoning unfinished chunks");
                        deadline_exceeded = true;
                        tasks.abort_all();
                    }
                    if let Some(slot) = outcomes.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) if e.is_cancelled() && deadline_exceeded => {}
                Err(e) => {
                    warn!("Chunk task failed: {}", e);
                    join_failure = Some(ExtractorError::from(e));
                }
            }
        }

        let missing = if deadline_exceeded {
            ExtractorError::DeadlineExceeded
        } else {
            join_failure.unwrap_or_else(|| ExtractorError::Task("chunk produced no outcome".to_string()))
        };
        let outcomes = chunks
            .into_iter()
            .zip(outcomes)
            .map(|(chunk, outcome)| (chunk, outcome.unwrap_or_else(|| Err(missing.clone()))))
            .collect();
        Ok((outcomes, deadline_exceeded))
    }
}

#[async_trait]
impl<S> ExtractionStrategy for AiStrategy<S>
where
    S: CompletionService + ?Sized + 'static,
{
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ai
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        ctx: &RunContext,
    ) -> Result<StrategyOutput, ExtractorError> {
        let plan = self.plan(&request.source_text);
        let chunk_count = plan.chunk_count();

        let ((outcomes, deadline_exceeded), merge) = match plan {
            Plan::SingleShot(chunk) => {
                debug!("Single-shot extraction via {}", self.client.service_name());
                let outcome = self.client.extract(&chunk, &request.metadata, ctx).await;
                let deadline_exceeded = match &outcome {
                    Err(ExtractorError::Cancelled) => return Err(ExtractorError::Cancelled),
                    Err(ExtractorError::DeadlineExceeded) => true,
                    _ => false,
                };
                ((vec![(chunk, outcome)], deadline_exceeded), false)
            }
            Plan::Chunked(chunks) => {
                info!(
                    "Processing {} chunks via {} ({} at a time)",
                    chunks.len(),
                    self.client.service_name(),
                    self.chunk_concurrency
                );
                (self.run_chunks(chunks, &request.metadata, ctx).await?, true)
            }
        };

        let mut output = StrategyOutput {
            chunk_count,
            deadline_exceeded,
            ..Default::default()
        };
        for (chunk, outcome) in outcomes {
            let report = match outcome {
                Ok(extraction) => {
                    output.total_estimated_tokens += extraction.estimated_tokens;
                    let status = if extraction.malformed {
                        ChunkStatus::Malformed
                    } else {
                        ChunkStatus::Extracted {
                            pairs: extraction.pairs.len(),
                        }
                    };
                    output.pairs.extend(extraction.pairs);
                    ChunkReport {
                        index: chunk.index,
                        status,
                        estimated_tokens: extraction.estimated_tokens,
                    }
                }
                Err(e) => {
                    warn!("Chunk {} failed: {}", chunk.index, e);
                    ChunkReport {
                        index: chunk.index,
                        status: ChunkStatus::Failed { reason: e.to_string() },
                        estimated_tokens: 0,
                    }
                }
            };
            output.chunk_reports.push(report);
        }

        if merge {
            output.pairs = self.merger.merge(output.pairs);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_llm::MockProvider;

    fn strategy(provider: MockProvider, config: &ExtractorConfig) -> AiStrategy<MockProvider> {
        let tracker = Arc::new(RateLimitTracker::from_config(config));
        AiStrategy::new(Arc::new(provider), tracker, config)
    }

    #[test]
    fn test_plan_single_shot_for_small_text() {
        let ai = strategy(MockProvider::default(), &ExtractorConfig::default());
        let plan = ai.plan("Customer: hi\nAgent: hello");
        assert!(matches!(plan, Plan::SingleShot(_)));
        assert_eq!(plan.chunk_count(), 1);
    }

    #[test]
    fn test_plan_chunked_when_over_char_budget() {
        let config = ExtractorConfig {
            max_chunk_chars: 2_000,
            min_chunk_chars: 200,
            chunk_overlap_tokens: 50,
            ..ExtractorConfig::default()
        };
        let ai = strategy(MockProvider::default(), &config);
        let plan = ai.plan(&"word ".repeat(1_000));
        assert!(matches!(plan, Plan::Chunked(ref chunks) if chunks.len() >= 3));
    }

    #[test]
    fn test_chunks_fit_token_window() {
        let inputs = [
            ("word ".repeat(200), 100),
            ("fn main() { let x = vec![1, 2]; }\n".repeat(60), 150),
            ("ünïcödé tëxt ".repeat(120), 80),
        ];
        for (text, window) in inputs {
            let config = ExtractorConfig {
                max_tokens_per_window: window,
                ..ExtractorConfig::default()
            };
            let ai = strategy(MockProvider::default(), &config);
            let Plan::Chunked(chunks) = ai.plan(&text) else {
                panic!("expected a chunked plan for a {}-token window", window);
            };

            assert!(chunks.len() > 1);
            for chunk in &chunks {
                assert!(
                    chunk.estimated_tokens <= window,
                    "chunk {} estimated at {} tokens, window {}",
                    chunk.index,
                    chunk.estimated_tokens,
                    window
                );
            }
            let rebuilt: String = chunks.iter().map(|c| c.fresh_text()).collect();
            assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn test_all_chunks_failed() {
        let failed = ChunkReport {
            index: 0,
            status: ChunkStatus::Failed { reason: "x".into() },
            estimated_tokens: 0,
        };
        let malformed = ChunkReport {
            index: 1,
            status: ChunkStatus::Malformed,
            estimated_tokens: 10,
        };
        let ok = ChunkReport {
            index: 2,
            status: ChunkStatus::Extracted { pairs: 0 },
            estimated_tokens: 10,
        };

        let output = StrategyOutput {
            chunk_reports: vec![failed.clone(), malformed.clone()],
            ..Default::default()
        };
        assert!(output.all_chunks_failed());

        let output = StrategyOutput {
            chunk_reports: vec![failed, malformed, ok],
            ..Default::default()
        };
        assert!(!output.all_chunks_failed());

        assert!(!StrategyOutput::default().all_chunks_failed());
    }

    #[tokio::test]
    async fn test_fallback_strategy_ignores_context() {
        let (ctx, handle) = RunContext::cancellable();
        handle.cancel();

        let request = ExtractionRequest::new(
            "Customer: How do I update my billing address?\n\nAgent: Open Billing > Address and click Edit.",
        );
        let output = FallbackExtractor::new().extract(&request, &ctx).await.unwrap();
        assert_eq!(output.pairs.len(), 1);
        assert_eq!(FallbackExtractor::new().method(), ExtractionMethod::Pattern);
    }
}
