//! Sieve Domain Layer
//!
//! Plain data types shared by every Sieve crate. Like the rest of the
//! domain layer this crate has no external dependencies: serialization,
//! logging and I/O live in the crates that consume these types.
//!
//! ## Key Concepts
//!
//! - **ExtractionRequest**: raw conversation text plus routing metadata
//! - **Chunk**: a bounded, possibly overlapping slice of the request text
//! - **ExtractedPair**: one question/answer record with confidence and provenance
//! - **PipelineResult**: the deduplicated output of one run, plus run metadata

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod pair;
pub mod request;
pub mod result;

// Re-exports for convenience
pub use chunk::Chunk;
pub use pair::{ExtractedPair, ExtractionMethod, MIN_FIELD_CHARS};
pub use request::{ExtractionRequest, LANGUAGE_KEY, PLATFORM_KEY};
pub use result::{ChunkReport, ChunkStatus, DegradedReason, PipelineResult};
