//! Validate completion output into Q&A pairs
//!
//! Nothing in here returns an error. Output that is not JSON is reported as
//! malformed, records that break the pair invariants are dropped and
//! counted, and everything else becomes an [`ExtractedPair`].

use crate::config::ExtractorConfig;
use serde_json::{Map, Value};
use sieve_domain::{ExtractedPair, ExtractionMethod};
use tracing::{debug, warn};

/// Keys under which a wrapper object may carry the record array
const WRAPPER_KEYS: [&str; 3] = ["pairs", "qa_pairs", "results"];

/// Outcome of validating one raw response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// Pairs that passed validation and the confidence filter
    pub pairs: Vec<ExtractedPair>,
    /// The response was not parseable JSON
    pub malformed: bool,
    /// Records dropped for missing or invalid fields
    pub rejected: usize,
    /// Valid records dropped by the confidence filter
    pub below_threshold: usize,
}

/// Turns raw completion text into validated pairs
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    confidence_threshold: f64,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(ExtractorConfig::default().confidence_threshold)
    }
}

impl ResponseValidator {
    /// Create a validator keeping pairs with confidence at or above `confidence_threshold`
    pub fn new(confidence_threshold: f64) -> Self {
        Self { confidence_threshold }
    }

    /// Create a validator from extractor configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.confidence_threshold)
    }

    /// Validated pairs from `raw`; empty when the response is malformed
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_extractor::ResponseValidator;
    ///
    /// let validator = ResponseValidator::new(0.7);
    /// let pairs = validator.parse(r#"[{
    ///     "question": "How do I export my data?",
    ///     "answer": "Use Settings > Export and pick CSV.",
    ///     "confidence": 0.92
    /// }]"#);
    /// assert_eq!(pairs.len(), 1);
    /// assert!(validator.parse("not json at all").is_empty());
    /// ```
    pub fn parse(&self, raw: &str) -> Vec<ExtractedPair> {
        self.parse_response(raw).pairs
    }

    /// Validate `raw` and report what was dropped
    pub fn parse_response(&self, raw: &str) -> ParsedResponse {
        let Some(json) = parse_json(raw) else {
            warn!("Malformed completion response ({} bytes)", raw.len());
            return ParsedResponse {
                malformed: true,
                ..Default::default()
            };
        };

        let records = match json {
            Value::Array(items) => items,
            Value::Object(mut obj) => match take_wrapped_array(&mut obj) {
                Some(items) => items,
                None => vec![Value::Object(obj)],
            },
            other => {
                warn!("Completion response is neither object nor array: {}", type_name(&other));
                return ParsedResponse {
                    malformed: true,
                    ..Default::default()
                };
            }
        };

        let mut parsed = ParsedResponse::default();
        for (idx, record) in records.iter().enumerate() {
            let pair = match parse_record(record) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Dropping record {}: {}", idx, e);
                    parsed.rejected += 1;
                    continue;
                }
            };
            if pair.confidence < self.confidence_threshold {
                debug!(
                    "Record {} below confidence threshold ({:.2} < {:.2})",
                    idx, pair.confidence, self.confidence_threshold
                );
                parsed.below_threshold += 1;
                continue;
            }
            parsed.pairs.push(pair);
        }

        parsed
    }
}

/// Parse the response body, tolerating code fences and surrounding prose
fn parse_json(response: &str) -> Option<Value> {
    let body = strip_code_fence(response);
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }

    // Prose around the payload: try the outermost bracketed span
    let start = body.find(['[', '{'])?;
    let end = body.rfind([']', '}'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

/// Remove a surrounding markdown code block, if any
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the info string (```json) on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => return "",
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn take_wrapped_array(obj: &mut Map<String, Value>) -> Option<Vec<Value>> {
    let key = WRAPPER_KEYS
        .iter()
        .find(|key| matches!(obj.get(**key), Some(Value::Array(_))))?;
    match obj.remove(*key) {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Parse a single record into a pair
fn parse_record(json: &Value) -> Result<ExtractedPair, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| format!("record is a {}, not an object", type_name(json)))?;

    let question = required_text(obj, "question")?;
    let answer = required_text(obj, "answer")?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| "missing or non-numeric 'confidence'".to_string())?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(format!("confidence {} out of range [0.0, 1.0]", confidence));
    }

    let quality = ["quality_score", "quality"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_f64))
        .map(|q| q.clamp(0.0, 1.0))
        .unwrap_or(confidence);

    let mut pair = ExtractedPair::new(question, answer, confidence, ExtractionMethod::Ai)
        .with_quality(quality)
        .with_context(
            optional_text(obj, "context_before").unwrap_or_default(),
            optional_text(obj, "context_after").unwrap_or_default(),
        );
    pair.issue_type = optional_text(obj, "issue_type");
    pair.resolution_type = optional_text(obj, "resolution_type");

    if let Some(Value::Array(tags)) = obj.get("tags") {
        pair.tags = tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(Value::Object(metadata)) = obj.get("metadata") {
        for (key, value) in metadata {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            pair.metadata.insert(key.clone(), value);
        }
    }

    pair.validate()?;
    Ok(pair)
}

fn required_text(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| format!("missing or invalid '{}'", key))
}

fn optional_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
