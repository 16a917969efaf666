//! Deadline and cancellation for a run
//!
//! Every suspension point of the pipeline (rate-limit waits, backoff
//! sleeps, the service call itself) goes through [`RunContext::run`], which
//! races the work against the deadline and the cancel signal. The losing
//! future is dropped, so interrupted work leaves nothing behind.

use crate::error::ExtractorError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Handle that cancels every context cloned from its pair
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated run
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Deadline plus cancel signal, cloned into every chunk worker
#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RunContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: None,
        }
    }

    /// A cancellable context and the handle that cancels it
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve_extractor::{ExtractorError, RunContext};
    /// use std::time::Duration;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let (ctx, handle) = RunContext::cancellable();
    /// handle.cancel();
    /// let slept = ctx.sleep(Duration::from_secs(3600)).await;
    /// assert_eq!(slept, Err(ExtractorError::Cancelled));
    /// # }
    /// ```
    pub fn cancellable() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let ctx = Self {
            deadline: None,
            cancel: Some(receiver),
        };
        (ctx, CancelHandle { sender })
    }

    /// Tighten the deadline to `deadline` (an earlier deadline wins)
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Tighten the deadline to `timeout` from now
    ///
    /// A timeout too large to express as an instant adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// The effective deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether cancel has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Error describing why this context is no longer live, if it isn't
    pub fn check(&self) -> Result<(), ExtractorError> {
        if self.is_cancelled() {
            Err(ExtractorError::Cancelled)
        } else if self.is_expired() {
            Err(ExtractorError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    async fn cancelled(&self) {
        match &self.cancel {
            Some(rx) => {
                let mut rx = rx.clone();
                let sender_gone = rx.wait_for(|cancelled| *cancelled).await.is_err();
                // Sender dropped without cancelling: never fires
                if sender_gone {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Run `future` unless the context is cancelled or expires first
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ExtractorError>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ExtractorError::Cancelled),
            _ = self.expired() => Err(ExtractorError::DeadlineExceeded),
            output = future => Ok(output),
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline
    pub async fn sleep(&self, duration: Duration) -> Result<(), ExtractorError> {
        self.run(tokio::time::sleep(duration)).await
    }
}
