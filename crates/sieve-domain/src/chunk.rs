//! Chunks of request text

/// A bounded slice of the request text sized for one completion call
///
/// Consecutive chunks may share `overlap` bytes so that an answer cut in
/// half by a boundary is still seen whole by one of the two calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in submission order, starting at 0
    pub index: usize,

    /// Chunk text, including any overlap with the previous chunk
    pub text: String,

    /// Heuristic token estimate for `text`
    pub estimated_tokens: u64,

    /// Byte offset of `text` within the source text
    pub start: usize,

    /// Number of leading bytes shared with the previous chunk
    pub overlap: usize,
}

impl Chunk {
    /// Byte offset one past the end of this chunk in the source text
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// The part of the chunk not already covered by the previous chunk
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_domain::Chunk;
    ///
    /// let chunk = Chunk {
    ///     index: 1,
    ///     text: "lo world".to_string(),
    ///     estimated_tokens: 2,
    ///     start: 3,
    ///     overlap: 2,
    /// };
    /// assert_eq!(chunk.fresh_text(), " world");
    /// assert_eq!(chunk.end(), 11);
    /// ```
    pub fn fresh_text(&self) -> &str {
        self.text.get(self.overlap..).unwrap_or("")
    }
}
