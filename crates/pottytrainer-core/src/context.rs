//! # Operation Context
//!
//! Deadline and cancellation boundary passed to every store call.
//!
//! The core is synchronous, so a context cannot interrupt a redb call that
//! is already running. Instead every schema-store and repository operation
//! checks the context before opening a transaction and again before
//! committing, and the graph resolver checks it on every step. A caller that
//! also wants to stop *waiting* (the HTTP layer) wraps the blocking work in
//! its own timeout and drops a [`CancelGuard`] when it gives up.

use crate::types::PottyError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Deadline + cancellation flag shared between a caller and the work it
/// started. Cloning shares the flag.
#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl OpContext {
    /// A context with no deadline. Used by startup and CLI paths.
    #[must_use]
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Time left before the deadline. `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Mark this context (and every clone) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with `Cancelled` or `Timeout` if the work should stop.
    pub fn check(&self) -> Result<(), PottyError> {
        if self.is_cancelled() {
            return Err(PottyError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(PottyError::Timeout);
        }
        Ok(())
    }

    /// A guard that cancels this context when dropped.
    ///
    /// Hold it for as long as the caller is interested in the result; if the
    /// caller's future is dropped mid-flight, the work sees `Cancelled` at
    /// its next check.
    #[must_use]
    pub fn cancel_guard(&self) -> CancelGuard {
        CancelGuard {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Cancels its [`OpContext`] on drop.
#[derive(Debug)]
pub struct CancelGuard {
    cancelled: Arc<AtomicBool>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
