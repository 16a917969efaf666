//! Extracted question/answer pairs

use std::collections::BTreeMap;
use std::fmt;

/// Minimum length (characters, after trimming) of a question or an answer
pub const MIN_FIELD_CHARS: usize = 10;

/// How a pair was produced
///
/// A closed set: the orchestrator relies on exhaustive matches when it
/// reports degraded runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionMethod {
    /// Extracted by the completion service
    Ai,

    /// Extracted by the regex/heuristic fallback
    Pattern,
}

impl ExtractionMethod {
    /// Get the method name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Ai => "ai",
            ExtractionMethod::Pattern => "pattern",
        }
    }

    /// Parse a method from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ai" => Some(ExtractionMethod::Ai),
            "pattern" => Some(ExtractionMethod::Pattern),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question/answer record pulled out of a support conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPair {
    /// The customer's question or problem statement
    pub question: String,

    /// The answer or resolution that was given
    pub answer: String,

    /// Conversation text immediately preceding the question
    pub context_before: String,

    /// Conversation text immediately following the answer
    pub context_after: String,

    /// Extraction confidence in [0.0, 1.0]
    pub confidence: f64,

    /// Quality of the answer in [0.0, 1.0]
    pub quality: f64,

    /// Kind of issue (e.g. "error", "how_to")
    pub issue_type: Option<String>,

    /// Kind of resolution (e.g. "instructions", "workaround")
    pub resolution_type: Option<String>,

    /// Free-form tags
    pub tags: Vec<String>,

    /// Provenance and extra attributes
    pub metadata: BTreeMap<String, String>,

    /// Which path produced this pair
    pub extraction_method: ExtractionMethod,
}

impl ExtractedPair {
    /// Create a pair with empty context and no optional attributes
    ///
    /// Quality defaults to the confidence value.
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_domain::{ExtractedPair, ExtractionMethod};
    ///
    /// let pair = ExtractedPair::new(
    ///     "How do I reset my password?",
    ///     "Open Settings and choose Reset Password.",
    ///     0.9,
    ///     ExtractionMethod::Ai,
    /// );
    /// assert!(pair.validate().is_ok());
    /// assert_eq!(pair.quality, 0.9);
    /// ```
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        confidence: f64,
        extraction_method: ExtractionMethod,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            context_before: String::new(),
            context_after: String::new(),
            confidence,
            quality: confidence,
            issue_type: None,
            resolution_type: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            extraction_method,
        }
    }

    /// Set the quality score
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    /// Set the surrounding context
    pub fn with_context(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.context_before = before.into();
        self.context_after = after.into();
        self
    }

    /// Set the issue type
    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_type = Some(issue_type.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check the record invariants
    ///
    /// Question and answer must each hold at least [`MIN_FIELD_CHARS`]
    /// characters; confidence and quality must lie in [0.0, 1.0].
    pub fn validate(&self) -> Result<(), String> {
        check_field("question", &self.question)?;
        check_field("answer", &self.answer)?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} out of range [0.0, 1.0]", self.confidence));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(format!("quality {} out of range [0.0, 1.0]", self.quality));
        }
        Ok(())
    }
}

fn check_field(name: &str, value: &str) -> Result<(), String> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(format!("{} is empty", name));
    }
    if len < MIN_FIELD_CHARS {
        return Err(format!(
            "{} too short: {} chars (min: {})",
            name, len, MIN_FIELD_CHARS
        ));
    }
    Ok(())
}
