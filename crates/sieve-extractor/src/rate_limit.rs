//! Sliding-window token accounting
//!
//! One tracker is shared by every run in the process. Admission is
//! advisory: two callers can both pass [`RateLimitTracker::can_proceed`]
//! before either records usage, overshooting the ceiling by at most one
//! call each. That overshoot is detected in [`RateLimitTracker::record_usage`],
//! logged and counted rather than prevented.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One successful call's token charge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsageEntry {
    /// When the usage was recorded
    pub timestamp: Instant,
    /// Tokens charged
    pub tokens: u64,
}

/// Point-in-time view of a tracker, for logs and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Tokens inside the current window
    pub usage: u64,
    /// Entries inside the current window
    pub entries: usize,
    /// Times a recorded call pushed the window over its ceiling
    pub overruns: u64,
    /// Configured ceiling
    pub max_tokens_per_window: u64,
}

#[derive(Debug, Default)]
struct Window {
    entries: VecDeque<TokenUsageEntry>,
    overruns: u64,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.timestamp) >= window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.tokens).sum()
    }
}

/// Rolling-window token budget
///
/// # Examples
///
/// ```
/// use sieve_extractor::RateLimitTracker;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let tracker = RateLimitTracker::new(1_000, Duration::from_secs(60));
/// tracker.record_usage(600);
///
/// let (allowed, wait) = tracker.can_proceed(600);
/// assert!(!allowed);
/// assert!(wait > Duration::ZERO);
/// assert!(tracker.can_proceed(400).0);
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimitTracker {
    max_tokens_per_window: u64,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimitTracker {
    /// Create a tracker with a token ceiling per rolling window
    pub fn new(max_tokens_per_window: u64, window: Duration) -> Self {
        Self {
            max_tokens_per_window,
            window,
            state: Mutex::new(Window::default()),
        }
    }

    /// Create a tracker from extractor configuration
    pub fn from_config(config: &crate::ExtractorConfig) -> Self {
        Self::new(config.max_tokens_per_window, config.window_duration())
    }

    /// Configured ceiling
    pub fn max_tokens_per_window(&self) -> u64 {
        self.max_tokens_per_window
    }

    /// Configured window length
    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        // The window holds plain numbers; a panic mid-update cannot break it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tokens charged inside the trailing window
    pub fn current_usage(&self) -> u64 {
        let mut state = self.lock();
        state.prune(Instant::now(), self.window);
        state.total()
    }

    /// Decide whether a call estimated at `estimated_tokens` may run now
    ///
    /// When refused, the returned duration is the time until the oldest
    /// entry leaves the window. It is zero when the window is already empty,
    /// which only happens for a call larger than the whole ceiling.
    pub fn can_proceed(&self, estimated_tokens: u64) -> (bool, Duration) {
        let now = Instant::now();
        let mut state = self.lock();
        state.prune(now, self.window);

        let usage = state.total();
        if usage.saturating_add(estimated_tokens) <= self.max_tokens_per_window {
            return (true, Duration::ZERO);
        }

        let wait = state
            .entries
            .front()
            .map(|oldest| match oldest.timestamp.checked_add(self.window) {
                Some(expiry) => expiry.saturating_duration_since(now),
                None => self.window,
            })
            .unwrap_or(Duration::ZERO);

        debug!(
            "Rate limit: {} used + {} requested > {}; wait {:?}",
            usage, estimated_tokens, self.max_tokens_per_window, wait
        );
        (false, wait)
    }

    /// Charge a completed call against the window
    pub fn record_usage(&self, tokens: u64) {
        let now = Instant::now();
        let mut state = self.lock();
        state.prune(now, self.window);
        state.entries.push_back(TokenUsageEntry { timestamp: now, tokens });

        let usage = state.total();
        if usage > self.max_tokens_per_window {
            state.overruns += 1;
            warn!(
                "Token window over budget: {} > {} (concurrent admissions overlapped)",
                usage, self.max_tokens_per_window
            );
        }
    }

    /// Times the window went over budget
    pub fn overruns(&self) -> u64 {
        self.lock().overruns
    }

    /// Current state of the window
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let mut state = self.lock();
        state.prune(Instant::now(), self.window);
        RateLimitSnapshot {
            usage: state.total(),
            entries: state.entries.len(),
            overruns: state.overruns,
            max_tokens_per_window: self.max_tokens_per_window,
        }
    }
}
