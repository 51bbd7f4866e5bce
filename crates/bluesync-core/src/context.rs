//! Cancellation and progress plumbing for long-running operations.
//!
//! Every long operation (index build, renumbering run, delete) receives an
//! [`OperationContext`] explicitly. It bundles a shared cancellation flag
//! and a progress sink so that independent roots or concurrent test runs
//! never observe each other's state.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::context::OperationContext;
//!
//! let ctx = OperationContext::new().with_progress(|p| {
//!     eprintln!("[{:>6.1}] {}", p.percent_or_negative(), p.message);
//! });
//! let token = ctx.token();
//! // hand `token` to a Ctrl-C handler, run the operation with `ctx`
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Message sent when an operation returns to rest.
pub const IDLE_MESSAGE: &str = "Idle";

/// Cooperative cancellation flag shared between a caller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A single progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Percentage in `0.0..=100.0`, or `None` when the phase is indeterminate.
    pub percent: Option<f64>,
    /// Human-readable description of the current step.
    pub message: String,
}

impl Progress {
    /// Progress with a known percentage.
    pub fn percent(percent: f64, message: impl Into<String>) -> Self {
        Self {
            percent: Some(percent.clamp(0.0, 100.0)),
            message: message.into(),
        }
    }

    /// Progress of `done` out of `total` items.
    pub fn fraction(done: usize, total: usize, message: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            done as f64 / total as f64 * 100.0
        };
        Self::percent(percent, message)
    }

    /// Progress for a phase whose length is unknown.
    pub fn indeterminate(message: impl Into<String>) -> Self {
        Self {
            percent: None,
            message: message.into(),
        }
    }

    /// The resting state reported when an operation finishes.
    #[must_use]
    pub fn idle() -> Self {
        Self::percent(0.0, IDLE_MESSAGE)
    }

    /// Wire form used by presentation layers: a negative value marks an
    /// indeterminate phase.
    #[must_use]
    pub fn percent_or_negative(&self) -> f64 {
        self.percent.unwrap_or(-1.0)
    }

    /// Whether the phase is indeterminate.
    #[must_use]
    pub const fn is_indeterminate(&self) -> bool {
        self.percent.is_none()
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(p) => write!(f, "[{p:5.1}%] {}", self.message),
            None => write!(f, "[  ...  ] {}", self.message),
        }
    }
}

/// Receiver for progress and user-facing error messages.
pub trait ProgressSink: Send + Sync {
    /// Called whenever an operation advances.
    fn progress(&self, progress: &Progress);

    /// Called for errors and aggregated warnings the user should see.
    fn error(&self, message: &str) {
        let _ = message;
    }
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn progress(&self, _progress: &Progress) {}
}

/// Adapter turning a closure into a progress sink.
struct FnProgress<F> {
    on_progress: F,
}

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(&Progress) + Send + Sync,
{
    fn progress(&self, progress: &Progress) {
        (self.on_progress)(progress);
    }
}

/// Explicit context handed to every long-running operation.
#[derive(Clone)]
pub struct OperationContext {
    token: CancellationToken,
    sink: Arc<dyn ProgressSink>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl OperationContext {
    /// Context with a fresh token and no progress output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sink: Arc::new(NoopProgress),
        }
    }

    /// Use the given cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Use the given progress sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Report progress through a closure.
    #[must_use]
    pub fn with_progress<F>(self, on_progress: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.with_sink(Arc::new(FnProgress { on_progress }))
    }

    /// The cancellation token of this context.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Forward a progress report.
    pub fn report(&self, progress: Progress) {
        self.sink.progress(&progress);
    }

    /// Forward a user-facing error or warning.
    pub fn report_error(&self, message: &str) {
        self.sink.error(message);
    }

    /// Report the resting state.
    pub fn idle(&self) {
        self.report(Progress::idle());
    }
}
