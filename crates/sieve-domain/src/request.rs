//! Extraction requests

use std::collections::BTreeMap;

/// Metadata key naming the source platform (e.g. "zendesk", "discord")
pub const PLATFORM_KEY: &str = "platform";

/// Metadata key naming the conversation language (e.g. "en", "de")
pub const LANGUAGE_KEY: &str = "language";

/// Immutable input to one extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionRequest {
    /// Raw conversation text produced by an upstream parser
    pub source_text: String,

    /// Routing hints; `platform` and `language` are used by the prompt
    pub metadata: BTreeMap<String, String>,
}

impl ExtractionRequest {
    /// Create a request with no metadata
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_domain::ExtractionRequest;
    ///
    /// let request = ExtractionRequest::new("Customer: hi")
    ///     .with_metadata("platform", "zendesk");
    /// assert_eq!(request.platform(), Some("zendesk"));
    /// assert_eq!(request.language(), None);
    /// ```
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Source platform hint, if any
    pub fn platform(&self) -> Option<&str> {
        self.metadata.get(PLATFORM_KEY).map(String::as_str)
    }

    /// Language hint, if any
    pub fn language(&self) -> Option<&str> {
        self.metadata.get(LANGUAGE_KEY).map(String::as_str)
    }
}
