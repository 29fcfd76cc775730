//! Structured error types for the kernel.
//!
//! All fallible public APIs return `Result<T, KernelError>`. Blocking
//! primitives surface reset-driven cancellation as
//! [`KernelError::Cancelled`] so payloads can propagate it with `?` up to
//! the worker boundary, where it is turned into lock release and worker
//! termination.

use thiserror::Error;

use crate::runtime::RuntimeState;
use crate::worker::WorkerId;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    // ── Worker-side errors ────────────────────────────────

    /// The calling worker was interrupted by `reset()`.
    #[error("worker cancelled by runtime reset")]
    Cancelled,

    /// A task payload failed (returned an error or panicked).
    #[error("task fault: {message}")]
    Fault { message: String },

    /// A blocking primitive was used where it is not allowed.
    #[error("misuse: {0}")]
    Misuse(String),

    // ── Scheduling errors ─────────────────────────────────

    /// Attempted to schedule a task before the current clock.
    #[error("cannot schedule task at T={requested} when current time is T={now}")]
    NonCausal { requested: f64, now: f64 },

    /// A time or delay was NaN, infinite, or (for delays) negative.
    #[error("invalid simulation time {0}")]
    InvalidTime(f64),

    // ── Lifecycle errors ──────────────────────────────────

    /// Workers did not quiesce within the configured retry budget.
    #[error("{operation}: workers did not quiesce in time (stuck: {stuck:?})")]
    QuiescenceTimeout {
        operation: &'static str,
        stuck: Vec<WorkerId>,
    },

    /// A lifecycle operation is not valid in the current state.
    #[error("cannot {operation} while runtime is {state}")]
    InvalidState {
        operation: &'static str,
        state: RuntimeState,
    },

    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl KernelError {
    /// Creates a task fault from any displayable message.
    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault {
            message: msg.into(),
        }
    }

    /// Creates a misuse error.
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse(msg.into())
    }

    /// Returns `true` for the reset-driven cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KernelError::Cancelled)
    }
}

/// Convenience alias for `Result<T, KernelError>`.
pub type KernelResult<T> = Result<T, KernelError>;
