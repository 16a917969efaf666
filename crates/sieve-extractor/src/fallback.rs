//! Pattern-based extraction used when the AI path is unavailable
//!
//! Works paragraph by paragraph: a question-like paragraph becomes pending,
//! and the next answer-like paragraph completes the pair. A newer question
//! replaces a pending one that never got an answer.

use regex::Regex;
use sieve_domain::{ExtractedPair, ExtractionMethod};
use std::sync::LazyLock;
use tracing::debug;

/// Confidence assigned to every pattern-extracted pair
pub const PATTERN_CONFIDENCE: f64 = 0.6;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("Invalid paragraph regex"));

static SPEAKER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:customer|client|user|agent|support|rep|representative|staff|admin|moderator|bot|assistant)\s*:\s*",
    )
    .expect("Invalid speaker regex")
});

static INTERROGATIVE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:how|what|why|when|where|who|which|can|could|is|are|does|do|did|should|will|would|has|have)\b",
    )
    .expect("Invalid interrogative regex")
});

static PROBLEM_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:error|issue|problem|not working|doesn't work|does not work|can't|cannot|unable|fails?|failed|failing|broken|crash(?:es|ed)?|bug|stuck)\b",
    )
    .expect("Invalid problem regex")
});

static INSTRUCTION_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:try|please|you can|you should|you need to|go to|click|tap|open|navigate|select|make sure|ensure|check|restart|reinstall|update|clear|to fix|to resolve|the (?:fix|solution) is|first|simply|just|use|enable|disable|set|run|contact|sure|yes)\b|no[,.]|\d+[.)])",
    )
    .expect("Invalid instruction regex")
});

static NUMBERED_STEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\d+[.)]|[-*])\s+").expect("Invalid step regex"));

static ISSUE_TYPES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        issue(
            "error",
            r"(?i)\b(?:error|exception|crash\w*|fail\w*|broken|bug|not working|500|404)\b",
        ),
        issue(
            "access",
            r"(?i)\b(?:log ?in|sign ?in|password|locked out|permission|access|2fa|two-factor|account locked)\b",
        ),
        issue(
            "billing",
            r"(?i)\b(?:bill\w*|invoice|charged?|refund|payment|subscription|price|pricing|plan)\b",
        ),
        issue("how_to", r"(?i)\bhow (?:do|can|to|should|would)\b"),
    ]
});

fn issue(name: &'static str, pattern: &str) -> (&'static str, Regex) {
    (name, Regex::new(pattern).expect("Invalid issue regex"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Question,
    Answer,
    Other,
}

/// A paragraph with its speaker label removed
struct Paragraph<'a> {
    body: &'a str,
}

impl<'a> Paragraph<'a> {
    fn new(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        let body = match SPEAKER_LABEL.find(trimmed) {
            Some(label) => trimmed[label.end()..].trim(),
            None => trimmed,
        };
        Self { body }
    }

    fn role(&self) -> Role {
        if self.body.trim_end().ends_with('?') || INTERROGATIVE_OPENER.is_match(self.body) {
            Role::Question
        } else if INSTRUCTION_OPENER.is_match(self.body) {
            Role::Answer
        } else if PROBLEM_KEYWORDS.is_match(self.body) {
            Role::Question
        } else {
            Role::Other
        }
    }
}

/// Heuristic Q&A extraction without the completion service
#[derive(Debug, Clone, Default)]
pub struct FallbackExtractor;

impl FallbackExtractor {
    /// Create a new fallback extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract pairs from `text` using paragraph patterns
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_extractor::FallbackExtractor;
    ///
    /// let text = "Customer: How do I change my email address?\n\n\
    ///             Agent: Go to Profile > Account and click Edit next to Email.";
    /// let pairs = FallbackExtractor::new().extract_patterns(text);
    /// assert_eq!(pairs.len(), 1);
    /// assert_eq!(pairs[0].question, "How do I change my email address?");
    /// assert_eq!(pairs[0].confidence, 0.6);
    /// ```
    pub fn extract_patterns(&self, text: &str) -> Vec<ExtractedPair> {
        let paragraphs: Vec<Paragraph<'_>> = PARAGRAPH_BREAK
            .split(text)
            .map(Paragraph::new)
            .filter(|p| !p.body.is_empty())
            .collect();

        let mut pairs = Vec::new();
        let mut pending: Option<usize> = None;

        for (idx, paragraph) in paragraphs.iter().enumerate() {
            match paragraph.role() {
                Role::Question => pending = Some(idx),
                Role::Answer => {
                    let Some(q_idx) = pending.take() else {
                        continue;
                    };
                    let before = q_idx.checked_sub(1).map(|i| paragraphs[i].body).unwrap_or("");
                    let after = paragraphs.get(idx + 1).map(|p| p.body).unwrap_or("");
                    if let Some(pair) = build_pair(paragraphs[q_idx].body, paragraph.body, before, after) {
                        pairs.push(pair);
                    }
                }
                Role::Other => {}
            }
        }

        debug!(
            "Pattern extraction found {} pairs in {} paragraphs",
            pairs.len(),
            paragraphs.len()
        );
        pairs
    }
}

fn build_pair(question: &str, answer: &str, before: &str, after: &str) -> Option<ExtractedPair> {
    let mut pair = ExtractedPair::new(question, answer, PATTERN_CONFIDENCE, ExtractionMethod::Pattern)
        .with_quality(estimate_quality(question, answer))
        .with_context(before, after);
    pair.issue_type = classify_issue(question).map(String::from);

    match pair.validate() {
        Ok(()) => Some(pair),
        Err(e) => {
            debug!("Skipping pattern pair: {}", e);
            None
        }
    }
}

/// Quality from answer length and shape
fn estimate_quality(question: &str, answer: &str) -> f64 {
    let mut quality: f64 = 0.4;

    let len = answer.chars().count();
    if (40..=800).contains(&len) {
        quality += 0.2;
    } else if len > 800 {
        quality += 0.1;
    }
    if NUMBERED_STEP.is_match(answer) || answer.matches(". ").count() >= 2 {
        quality += 0.1;
    }
    if question.trim_end().ends_with('?') {
        quality += 0.1;
    }

    quality.clamp(0.0, 1.0)
}

/// First matching issue category for a question
pub fn classify_issue(question: &str) -> Option<&'static str> {
    ISSUE_TYPES
        .iter()
        .find(|(_, regex)| regex.is_match(question))
        .map(|(name, _)| *name)
}
