//! Near-duplicate removal across chunk outputs
//!
//! Overlapping chunks see the same exchange twice, and the model rarely
//! phrases the question identically both times. Two questions are treated
//! as duplicates when a blend of word overlap, character-sequence
//! similarity and length ratio exceeds a threshold; the first one seen wins.

use crate::config::ExtractorConfig;
use sieve_domain::ExtractedPair;
use std::collections::HashSet;
use tracing::debug;

/// Questions shorter than this (in characters, trimmed) are dropped
pub const MIN_QUESTION_CHARS: usize = 5;

/// Normalized length above which the stricter threshold applies
const LONG_QUESTION_CHARS: usize = 50;

const JACCARD_WEIGHT: f64 = 0.5;
const SEQUENCE_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.2;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "i", "me", "my", "we", "our", "you", "your", "it", "its", "this", "that",
    "to", "of", "in", "on", "at", "for", "with", "from", "and", "or", "but", "so", "can",
    "could", "would", "should", "will", "be", "do", "have", "there", "any", "some", "please",
];

/// A question prepared for comparison
#[derive(Debug, Clone)]
struct Normalized {
    chars: Vec<char>,
    words: HashSet<String>,
}

impl Normalized {
    fn new(question: &str) -> Self {
        let text = normalize_question(question);
        let words = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c| c == '?' || c == '\''))
            .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
            .map(String::from)
            .collect();
        Self {
            chars: text.chars().collect(),
            words,
        }
    }
}

/// Lowercase, strip punctuation (except `?` and `'`), collapse whitespace
/// and fold common auxiliary verbs
///
/// # Examples
///
/// ```
/// use sieve_extractor::normalize_question;
///
/// assert_eq!(
///     normalize_question("  Why WAS my card   declined?!"),
///     "why be my card declined?"
/// );
/// ```
pub fn normalize_question(question: &str) -> String {
    let cleaned: String = question
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '?' || *c == '\'')
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| match word {
            "is" | "are" | "was" | "were" | "am" | "been" | "being" => "be",
            "does" | "did" | "done" | "doing" => "do",
            "has" | "had" | "having" => "have",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deduplicates pairs by question similarity
#[derive(Debug, Clone)]
pub struct ResultMerger {
    threshold_short: f64,
    threshold_long: f64,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self::from_config(&ExtractorConfig::default())
    }
}

impl ResultMerger {
    /// Create a merger with thresholds for short and long questions
    pub fn new(threshold_short: f64, threshold_long: f64) -> Self {
        Self {
            threshold_short,
            threshold_long,
        }
    }

    /// Create a merger from extractor configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.merge_threshold_short, config.merge_threshold_long)
    }

    /// Drop near-duplicate questions, keeping first-seen order
    pub fn merge(&self, pairs: Vec<ExtractedPair>) -> Vec<ExtractedPair> {
        let total = pairs.len();
        let mut kept: Vec<(Normalized, ExtractedPair)> = Vec::with_capacity(total);
        let mut too_short = 0usize;

        for pair in pairs {
            if pair.question.trim().chars().count() < MIN_QUESTION_CHARS {
                too_short += 1;
                continue;
            }
            let candidate = Normalized::new(&pair.question);
            if kept.iter().any(|(existing, _)| self.duplicates(existing, &candidate)) {
                continue;
            }
            kept.push((candidate, pair));
        }

        debug!(
            "Merged {} pairs into {} ({} too short)",
            total,
            kept.len(),
            too_short
        );
        kept.into_iter().map(|(_, pair)| pair).collect()
    }

    /// Similarity score in [0.0, 1.0] between two questions
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        score(&Normalized::new(a), &Normalized::new(b))
    }

    /// Whether `candidate` duplicates `existing`
    pub fn is_duplicate(&self, existing: &str, candidate: &str) -> bool {
        self.duplicates(&Normalized::new(existing), &Normalized::new(candidate))
    }

    fn duplicates(&self, existing: &Normalized, candidate: &Normalized) -> bool {
        let longer = existing.chars.len().max(candidate.chars.len());
        let threshold = if longer > LONG_QUESTION_CHARS {
            self.threshold_long
        } else {
            self.threshold_short
        };
        score(existing, candidate) > threshold
    }
}

fn score(a: &Normalized, b: &Normalized) -> f64 {
    JACCARD_WEIGHT * jaccard(a, b)
        + SEQUENCE_WEIGHT * sequence_ratio(&a.chars, &b.chars)
        + LENGTH_WEIGHT * length_ratio(a.chars.len(), b.chars.len())
}

fn jaccard(a: &Normalized, b: &Normalized) -> f64 {
    if a.words.is_empty() && b.words.is_empty() {
        return if a.chars == b.chars { 1.0 } else { 0.0 };
    }
    let intersection = a.words.intersection(&b.words).count();
    let union = a.words.union(&b.words).count();
    intersection as f64 / union as f64
}

fn length_ratio(a: usize, b: usize) -> f64 {
    match a.max(b) {
        0 => 1.0,
        longer => a.min(b) as f64 / longer as f64,
    }
}

/// Ratcliff/Obershelp similarity: `2 * matches / (len(a) + len(b))`
///
/// # Examples
///
/// ```
/// use sieve_extractor::sequence_ratio;
///
/// let a: Vec<char> = "abcd".chars().collect();
/// let b: Vec<char> = "bcde".chars().collect();
/// assert_eq!(sequence_ratio(&a, &b), 0.75);
/// ```
pub fn sequence_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(a, b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_run(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common contiguous run as `(start_a, start_b, len)`, earliest on ties
fn longest_common_run(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    if a.is_empty() || b.is_empty() {
        return best;
    }

    // curr[j + 1] is the run length ending at a[i], b[j]
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let len = curr[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_domain::ExtractionMethod;

    fn pair(question: &str) -> ExtractedPair {
        ExtractedPair::new(
            question,
            "An answer that is long enough to be valid.",
            0.9,
            ExtractionMethod::Ai,
        )
    }

    fn questions(pairs: &[ExtractedPair]) -> Vec<&str> {
        pairs.iter().map(|p| p.question.as_str()).collect()
    }

    #[test]
    fn test_normalize_folds_verbs_and_punctuation() {
        assert_eq!(normalize_question("Is the app down?"), "be the app down?");
        assert_eq!(normalize_question("Has it DONE this before..."), "have it do this before");
        assert_eq!(normalize_question("Can't log in!!"), "can't log in");
        assert_eq!(normalize_question("  a\t\tb  "), "a b");
    }

    #[test]
    fn test_sequence_ratio_matches_difflib() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(sequence_ratio(&chars("abcd"), &chars("bcde")), 0.75);
        assert_eq!(sequence_ratio(&chars("same"), &chars("same")), 1.0);
        assert_eq!(sequence_ratio(&chars("abc"), &chars("xyz")), 0.0);
        assert_eq!(sequence_ratio(&chars(""), &chars("")), 1.0);
        // "ab" + "d" match around the unmatched middle
        assert!((sequence_ratio(&chars("abxd"), &chars("abyd")) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_exact_and_cosmetic_duplicates_merge() {
        let merger = ResultMerger::default();
        let merged = merger.merge(vec![
            pair("How do I reset my password?"),
            pair("how do i reset my password"),
            pair("How do I reset my password?"),
        ]);
        assert_eq!(questions(&merged), vec!["How do I reset my password?"]);
    }

    #[test]
    fn test_verb_folding_merges_tense_variants() {
        let merger = ResultMerger::default();
        assert!(merger.is_duplicate("Why is the export failing?", "Why was the export failing?"));
    }

    #[test]
    fn test_distinct_questions_survive() {
        let merger = ResultMerger::default();
        let merged = merger.merge(vec![
            pair("How do I reset my password?"),
            pair("How do I delete my account?"),
            pair("Why was I charged twice this month?"),
        ]);
        assert_eq!(merged.len(), 3);
        assert!(merger.similarity("How do I reset my password?", "How do I delete my account?") < 0.75);
    }

    #[test]
    fn test_short_questions_dropped() {
        let merger = ResultMerger::default();
        let merged = merger.merge(vec![pair("Why?"), pair("  ok  "), pair("Where is the invoice?")]);
        assert_eq!(questions(&merged), vec!["Where is the invoice?"]);
    }

    #[test]
    fn test_first_seen_order_preserved() {
        let merger = ResultMerger::default();
        let merged = merger.merge(vec![
            pair("Where can I download the desktop app?"),
            pair("How do I change the billing address?"),
            pair("Where can I download the desktop app"),
            pair("Does the API support pagination?"),
        ]);
        assert_eq!(
            questions(&merged),
            vec![
                "Where can I download the desktop app?",
                "How do I change the billing address?",
                "Does the API support pagination?",
            ]
        );
    }

    #[test]
    fn test_long_questions_use_stricter_threshold() {
        let strict_long = ResultMerger::new(0.0, 1.0);
        let a = "Why does the nightly export to the data warehouse fail with a timeout?";
        let b = "Why does the nightly export to the data warehouse fail with timeouts?";
        assert!(!strict_long.is_duplicate(a, b));

        let strict_short = ResultMerger::new(1.0, 0.0);
        assert!(strict_short.is_duplicate(a, b));
        assert!(!strict_short.is_duplicate("Is it down?", "Is it up?"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merger = ResultMerger::default();
        let once = merger.merge(vec![
            pair("How do I export data to CSV?"),
            pair("How can I export my data to CSV?"),
            pair("What is the refund policy?"),
            pair("What's the refund policy?"),
        ]);
        let twice = merger.merge(once.clone());
        assert_eq!(once, twice);
    }
}
