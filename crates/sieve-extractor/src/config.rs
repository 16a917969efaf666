//! Configuration for the Extractor

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Prefix of the environment variables read by [`ExtractorConfig::apply_env_overrides`]
pub const ENV_PREFIX: &str = "SIEVE_";

/// Longest accepted timeout or backoff delay: one week
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted rate-limit window: one day
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Configuration for the extraction pipeline
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Token ceiling per rolling window
    pub max_tokens_per_window: u64,

    /// Length of the rolling window (seconds)
    pub window_duration_secs: u64,

    /// Largest chunk sent in one call (bytes of UTF-8 text)
    pub max_chunk_chars: usize,

    /// Smallest chunk worth a call
    pub min_chunk_chars: usize,

    /// Overlap between fixed-size chunks, in tokens (4 characters each)
    pub chunk_overlap_tokens: usize,

    /// Turn markers tried, in order, before fixed-size splitting
    pub chunk_separators: Vec<String>,

    /// Pairs below this confidence are dropped from AI output
    pub confidence_threshold: f64,

    /// Retries after the first attempt of a call
    pub max_retries: u32,

    /// First backoff after a quota refusal (seconds)
    pub rate_limit_base_delay_secs: u64,

    /// Cap on quota backoff (seconds)
    pub rate_limit_max_delay_secs: u64,

    /// Growth factor of quota backoff
    pub rate_limit_backoff_factor: f64,

    /// Unit of linear backoff after transient failures (seconds)
    pub retry_delay_secs: u64,

    /// Times a call may wait on the rate limiter before failing
    pub max_admission_waits: u32,

    /// Chunks processed at once
    pub chunk_concurrency: usize,

    /// Timeout for a single completion call (seconds)
    pub call_timeout_secs: u64,

    /// Upper bound on a whole run (seconds)
    pub run_timeout_secs: u64,

    /// Use the completion service at all
    pub ai_enabled: bool,

    /// Fall back to pattern extraction when the AI path fails
    pub fallback_enabled: bool,

    /// Duplicate threshold for questions up to 50 characters
    pub merge_threshold_short: f64,

    /// Duplicate threshold for questions over 50 characters
    pub merge_threshold_long: f64,
}

impl Default for ExtractorConfig {
    /// Default configuration tuned for a 12k tokens/minute service tier
    fn default() -> Self {
        Self {
            max_tokens_per_window: 12_000,
            window_duration_secs: 60,
            max_chunk_chars: 40_000,
            min_chunk_chars: 1_000,
            chunk_overlap_tokens: 500,
            chunk_separators: default_separators(),
            confidence_threshold: 0.7,
            max_retries: 3,
            rate_limit_base_delay_secs: 30,
            rate_limit_max_delay_secs: 300,
            rate_limit_backoff_factor: 1.5,
            retry_delay_secs: 2,
            max_admission_waits: 5,
            chunk_concurrency: 3,
            call_timeout_secs: 120,
            run_timeout_secs: 900,
            ai_enabled: true,
            fallback_enabled: true,
            merge_threshold_short: 0.75,
            merge_threshold_long: 0.85,
        }
    }
}

fn default_separators() -> Vec<String> {
    ["\n---\n", "\n\n\n", "\nCustomer:", "\nAgent:", "\nUser:", "\nSupport:"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl ExtractorConfig {
    /// Character overlap between consecutive fixed-size chunks
    pub fn overlap_chars(&self) -> usize {
        self.chunk_overlap_tokens * 4
    }

    /// Rolling window as a Duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_duration_secs)
    }

    /// Per-call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Whole-run timeout as a Duration
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tokens_per_window == 0 {
            return Err("max_tokens_per_window must be greater than 0".to_string());
        }
        if self.window_duration_secs == 0 {
            return Err("window_duration_secs must be greater than 0".to_string());
        }
        if self.window_duration_secs > MAX_WINDOW_SECS {
            return Err(format!("window_duration_secs cannot exceed {}", MAX_WINDOW_SECS));
        }
        if self.max_chunk_chars == 0 {
            return Err("max_chunk_chars must be greater than 0".to_string());
        }
        if self.min_chunk_chars > self.max_chunk_chars {
            return Err("min_chunk_chars cannot exceed max_chunk_chars".to_string());
        }
        if self.overlap_chars() >= self.max_chunk_chars {
            return Err("chunk overlap must be smaller than max_chunk_chars".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("confidence_threshold must be within [0.0, 1.0]".to_string());
        }
        if !self.rate_limit_backoff_factor.is_finite() || self.rate_limit_backoff_factor < 1.0 {
            return Err("rate_limit_backoff_factor must be a finite number of at least 1.0".to_string());
        }
        if self.rate_limit_max_delay_secs < self.rate_limit_base_delay_secs {
            return Err("rate_limit_max_delay_secs cannot be below rate_limit_base_delay_secs".to_string());
        }
        if self.chunk_concurrency == 0 {
            return Err("chunk_concurrency must be greater than 0".to_string());
        }
        if self.call_timeout_secs == 0 || self.run_timeout_secs == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }
        for (name, secs) in [
            ("call_timeout_secs", self.call_timeout_secs),
            ("run_timeout_secs", self.run_timeout_secs),
            ("rate_limit_max_delay_secs", self.rate_limit_max_delay_secs),
            ("retry_delay_secs", self.retry_delay_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(format!("{} cannot exceed {}", name, MAX_DURATION_SECS));
            }
        }
        for threshold in [self.merge_threshold_short, self.merge_threshold_long] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("merge thresholds must be within [0.0, 1.0]".to_string());
            }
        }
        Ok(())
    }

    /// Aggressive preset: small chunks and short waits for low-latency use
    pub fn aggressive() -> Self {
        Self {
            max_chunk_chars: 12_000,
            min_chunk_chars: 500,
            chunk_overlap_tokens: 200,
            max_retries: 2,
            rate_limit_base_delay_secs: 10,
            rate_limit_max_delay_secs: 60,
            call_timeout_secs: 60,
            run_timeout_secs: 300,
            chunk_concurrency: 4,
            ..Self::default()
        }
    }

    /// Lenient preset: patient retries for large batch jobs
    pub fn lenient() -> Self {
        Self {
            max_retries: 5,
            max_admission_waits: 10,
            rate_limit_max_delay_secs: 600,
            call_timeout_secs: 300,
            run_timeout_secs: 3_600,
            chunk_concurrency: 2,
            confidence_threshold: 0.6,
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str)
            .map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }

    /// Override fields from `SIEVE_*` environment variables
    ///
    /// Recognized: `SIEVE_MAX_TOKENS_PER_WINDOW`, `SIEVE_WINDOW_DURATION_SECONDS`,
    /// `SIEVE_MAX_CHUNK_CHARS`, `SIEVE_MIN_CHUNK_CHARS`, `SIEVE_CHUNK_OVERLAP_TOKENS`,
    /// `SIEVE_CONFIDENCE_THRESHOLD`, `SIEVE_MAX_RETRIES`,
    /// `SIEVE_RATE_LIMIT_BASE_DELAY_SECONDS`, `SIEVE_RATE_LIMIT_MAX_DELAY_SECONDS`,
    /// `SIEVE_RATE_LIMIT_BACKOFF_FACTOR`, `SIEVE_CHUNK_CONCURRENCY`,
    /// `SIEVE_FALLBACK_ENABLED`, `SIEVE_AI_ENABLED`. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    /// Apply overrides from an arbitrary key lookup (keys without prefix)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_field(&lookup, "MAX_TOKENS_PER_WINDOW", &mut self.max_tokens_per_window);
        override_field(&lookup, "WINDOW_DURATION_SECONDS", &mut self.window_duration_secs);
        override_field(&lookup, "MAX_CHUNK_CHARS", &mut self.max_chunk_chars);
        override_field(&lookup, "MIN_CHUNK_CHARS", &mut self.min_chunk_chars);
        override_field(&lookup, "CHUNK_OVERLAP_TOKENS", &mut self.chunk_overlap_tokens);
        override_field(&lookup, "CONFIDENCE_THRESHOLD", &mut self.confidence_threshold);
        override_field(&lookup, "MAX_RETRIES", &mut self.max_retries);
        override_field(&lookup, "RATE_LIMIT_BASE_DELAY_SECONDS", &mut self.rate_limit_base_delay_secs);
        override_field(&lookup, "RATE_LIMIT_MAX_DELAY_SECONDS", &mut self.rate_limit_max_delay_secs);
        override_field(&lookup, "RATE_LIMIT_BACKOFF_FACTOR", &mut self.rate_limit_backoff_factor);
        override_field(&lookup, "CHUNK_CONCURRENCY", &mut self.chunk_concurrency);
        override_field(&lookup, "FALLBACK_ENABLED", &mut self.fallback_enabled);
        override_field(&lookup, "AI_ENABLED", &mut self.ai_enabled);
    }
}

fn override_field<F, T>(lookup: &F, key: &str, field: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *field = value,
            Err(_) => warn!("Ignoring unparseable {}{}={:?}", ENV_PREFIX, key, raw),
        }
    }
}
