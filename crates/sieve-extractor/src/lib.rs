//! Sieve Extractor
//!
//! Pulls question/answer pairs out of customer-support conversations with a
//! text-completion service, inside a shared token budget.
//!
//! # Architecture
//!
//! ```text
//! Request → plan → chunks → CompletionClient ─┬→ validate → merge → PipelineResult
//!                     (rate limit, retries)   │
//!                                             └→ (degraded) FallbackExtractor
//! ```
//!
//! # Key Features
//!
//! - **Token budget**: a sliding-window [`RateLimitTracker`] shared by every run
//! - **Chunking**: turn-aware splitting with overlap for long conversations
//! - **Retries**: quota and transient failures back off; others fail fast
//! - **Deduplication**: near-duplicate questions from overlapping chunks collapse
//! - **Graceful degradation**: pattern extraction when the AI path yields nothing
//! - **Cancellation**: deadlines and cancel signals reach every wait
//!
//! # Example Usage
//!
//! ```no_run
//! use sieve_domain::ExtractionRequest;
//! use sieve_extractor::{Extractor, ExtractorConfig};
//! use sieve_llm::MockProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MockProvider::new("[]");
//! let extractor = Extractor::new(service, ExtractorConfig::default())?;
//!
//! let request = ExtractionRequest::new("Customer: How do I reset my password?\n\nAgent: ...")
//!     .with_metadata("platform", "zendesk");
//!
//! let result = extractor.extract(&request).await?;
//!
//! println!("Pairs: {}", result.pairs.len());
//! println!("Degraded: {}", result.degraded);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;
mod config;
mod tokens;
mod rate_limit;
mod context;
mod chunking;
mod prompt;
mod parser;
mod client;
mod merge;
mod fallback;
mod strategy;
mod extractor;

#[cfg(test)]
mod tests;

pub use error::ExtractorError;
pub use config::{ExtractorConfig, ENV_PREFIX, MAX_DURATION_SECS};
pub use tokens::{classify as classify_text, estimate as estimate_tokens, TextShape};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker, TokenUsageEntry};
pub use context::{CancelHandle, RunContext};
pub use chunking::{plan as plan_chunks, ChunkPlanner};
pub use prompt::PromptBuilder;
pub use parser::{ParsedResponse, ResponseValidator};
pub use client::{ChunkExtraction, CompletionClient, RetryPolicy};
pub use merge::{normalize_question, sequence_ratio, ResultMerger, MIN_QUESTION_CHARS};
pub use fallback::{classify_issue, FallbackExtractor, PATTERN_CONFIDENCE};
pub use strategy::{AiStrategy, ExtractionStrategy, Plan, StrategyOutput};
pub use extractor::Extractor;
