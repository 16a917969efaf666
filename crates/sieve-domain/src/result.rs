//! Pipeline output

use crate::pair::ExtractedPair;
use std::fmt;

/// Why a run fell back to pattern extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// The AI path is switched off in configuration
    AiDisabled,

    /// No chunk produced a usable response
    AllChunksFailed,

    /// The run deadline passed before the AI path finished
    DeadlineExceeded,
}

impl DegradedReason {
    /// Get the reason as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedReason::AiDisabled => "ai_disabled",
            DegradedReason::AllChunksFailed => "all_chunks_failed",
            DegradedReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single chunk on the AI path
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    /// The response parsed; `pairs` survived validation and filtering
    Extracted {
        /// Number of pairs kept from this chunk
        pairs: usize,
    },

    /// The response was not valid JSON
    Malformed,

    /// The call failed after retries, or was not retryable
    Failed {
        /// Human-readable failure cause
        reason: String,
    },
}

impl ChunkStatus {
    /// Whether the chunk produced a parseable response
    pub fn is_success(&self) -> bool {
        matches!(self, ChunkStatus::Extracted { .. })
    }
}

/// Per-chunk bookkeeping reported with a run
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    /// Chunk index
    pub index: usize,

    /// What happened to the chunk
    pub status: ChunkStatus,

    /// Tokens charged against the rate limit for this chunk (0 if the call never succeeded)
    pub estimated_tokens: u64,
}

/// Output of one extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    /// Deduplicated pairs in first-seen order
    pub pairs: Vec<ExtractedPair>,

    /// Whether the run fell back to pattern extraction
    pub degraded: bool,

    /// Why the run degraded, when it did
    pub degraded_reason: Option<DegradedReason>,

    /// Number of chunks the input was planned into
    pub chunk_count: usize,

    /// Tokens charged against the rate limit by successful calls
    pub total_estimated_tokens: u64,

    /// Per-chunk outcomes, ordered by chunk index
    pub chunk_reports: Vec<ChunkReport>,

    /// Wall-clock duration of the run
    pub processing_time_ms: u64,
}

impl PipelineResult {
    /// Number of chunks whose response parsed
    pub fn successful_chunks(&self) -> usize {
        self.chunk_reports
            .iter()
            .filter(|r| r.status.is_success())
            .count()
    }
}
