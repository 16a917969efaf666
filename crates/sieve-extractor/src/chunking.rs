//! Splitting oversized conversations into chunks
//!
//! Two strategies, tried in order:
//!
//! 1. **Turn boundaries**: cut before a conversational separator (a turn
//!    marker such as `"\nAgent:"`) and pack whole turns into chunks. Used
//!    only when every resulting chunk is big enough to be worth a call.
//! 2. **Fixed windows**: windows of `max_chunk_chars`, pulled back to the
//!    nearest whitespace when the cut would split a word, each window
//!    starting `overlap_chars` before the previous one ended.
//!
//! Either way, concatenating the non-overlap part of every chunk gives back
//! the input exactly. Budgets are measured in UTF-8 bytes and cuts always
//! land on character boundaries.

use crate::config::ExtractorConfig;
use crate::tokens;
use sieve_domain::Chunk;
use tracing::debug;

/// Furthest a fixed-size cut moves back looking for whitespace
const WORD_BACKOFF: usize = 100;

/// A planned slice: `[start, end)` sharing `overlap` bytes with its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    overlap: usize,
}

/// Plans chunks for one input text
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    overlap_chars: usize,
    separators: Vec<String>,
}

impl ChunkPlanner {
    /// Create a planner with no turn separators (fixed windows only)
    pub fn new(max_chunk_chars: usize, min_chunk_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chunk_chars: max_chunk_chars.max(1),
            min_chunk_chars,
            overlap_chars,
            separators: Vec::new(),
        }
    }

    /// Create a planner from extractor configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(
            config.max_chunk_chars,
            config.min_chunk_chars,
            config.overlap_chars(),
        )
        .with_separators(config.chunk_separators.clone())
    }

    /// Set the turn separators, tried in order
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators.into_iter().filter(|s| !s.is_empty()).collect();
        self
    }

    /// Largest chunk this planner produces, tail folding aside
    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    /// The same planner with a smaller chunk size
    ///
    /// Minimum size and overlap shrink to at most a quarter of the new size
    /// so the tail fold and overlap cannot undo the reduction.
    pub fn resized(&self, max_chunk_chars: usize) -> Self {
        let max_chunk_chars = max_chunk_chars.max(1);
        Self {
            max_chunk_chars,
            min_chunk_chars: self.min_chunk_chars.min(max_chunk_chars / 4),
            overlap_chars: self.overlap_chars.min(max_chunk_chars / 4),
            separators: self.separators.clone(),
        }
    }

    /// Split `text` into chunks
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_extractor::ChunkPlanner;
    ///
    /// let planner = ChunkPlanner::new(20, 5, 4);
    /// let chunks = planner.plan("the quick brown fox jumps over the lazy dog");
    /// assert!(chunks.len() > 1);
    ///
    /// let rebuilt: String = chunks.iter().map(|c| c.fresh_text()).collect();
    /// assert_eq!(rebuilt, "the quick brown fox jumps over the lazy dog");
    /// ```
    pub fn plan(&self, text: &str) -> Vec<Chunk> {
        let spans = if text.len() <= self.max_chunk_chars {
            vec![Span { start: 0, end: text.len(), overlap: 0 }]
        } else if let Some((separator, spans)) = self.split_at_turns(text) {
            debug!("Split {} bytes at {:?} into {} chunks", text.len(), separator, spans.len());
            spans
        } else {
            let spans = self.split_fixed(text);
            debug!("Split {} bytes into {} fixed windows", text.len(), spans.len());
            spans
        };

        spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let slice = &text[span.start..span.end];
                Chunk {
                    index,
                    text: slice.to_string(),
                    estimated_tokens: tokens::estimate(slice),
                    start: span.start,
                    overlap: span.overlap,
                }
            })
            .collect()
    }

    fn split_at_turns<'a>(&'a self, text: &str) -> Option<(&'a str, Vec<Span>)> {
        self.separators
            .iter()
            .find_map(|sep| self.split_by_separator(text, sep).map(|spans| (sep.as_str(), spans)))
    }

    /// Pack separator-delimited pieces into chunks; `None` if the result is unusable
    fn split_by_separator(&self, text: &str, separator: &str) -> Option<Vec<Span>> {
        let mut cuts: Vec<usize> = std::iter::once(0)
            .chain(text.match_indices(separator).map(|(idx, _)| idx).filter(|&idx| idx > 0))
            .collect();
        if cuts.len() < 2 {
            return None;
        }
        cuts.push(text.len());

        let mut spans = Vec::new();
        let mut current = Span { start: 0, end: 0, overlap: 0 };
        for piece in cuts.windows(2) {
            let (start, end) = (piece[0], piece[1]);
            if end - start > self.max_chunk_chars {
                return None;
            }
            if end - current.start > self.max_chunk_chars {
                spans.push(current);
                current = Span { start, end, overlap: 0 };
            } else {
                current.end = end;
            }
        }
        spans.push(current);

        let usable = spans.len() >= 2
            && spans.iter().all(|s| s.end - s.start >= self.min_chunk_chars);
        usable.then_some(spans)
    }

    fn split_fixed(&self, text: &str) -> Vec<Span> {
        let len = text.len();
        let mut spans = Vec::new();
        let mut start = 0;
        let mut prev_end: usize = 0;

        loop {
            let overlap = prev_end.saturating_sub(start);
            if len - start <= self.max_chunk_chars {
                spans.push(Span { start, end: len, overlap });
                break;
            }

            let mut end = floor_char_boundary(text, start + self.max_chunk_chars);
            if end <= start {
                end = ceil_char_boundary(text, start + 1);
            }
            end = back_off_to_whitespace(text, start, end);

            // A short tail rides along with this chunk instead of standing alone
            if len - end < self.min_chunk_chars {
                spans.push(Span { start, end: len, overlap });
                break;
            }
            spans.push(Span { start, end, overlap });

            let mut next = floor_char_boundary(text, end.saturating_sub(self.overlap_chars));
            if next <= start {
                next = end;
            }
            prev_end = end;
            start = next;
        }

        spans
    }
}

/// Free-function form of [`ChunkPlanner::plan`] without turn separators
pub fn plan(text: &str, max_chunk_chars: usize, min_chunk_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    ChunkPlanner::new(max_chunk_chars, min_chunk_chars, overlap_chars).plan(text)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Move `end` back to just after the nearest whitespace if it splits a word
fn back_off_to_whitespace(text: &str, start: usize, end: usize) -> usize {
    let splits_word = matches!(
        (text[..end].chars().next_back(), text[end..].chars().next()),
        (Some(before), Some(after)) if !before.is_whitespace() && !after.is_whitespace()
    );
    if !splits_word {
        return end;
    }

    let lower = ceil_char_boundary(text, end.saturating_sub(WORD_BACKOFF).max(start + 1));
    if lower >= end {
        return end;
    }
    text[lower..end]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(idx, c)| lower + idx + c.len_utf8())
        .unwrap_or(end)
}
