//! Runtime configuration.
//!
//! Plain data with defaults and chained `with_*` setters. Nothing here is
//! read from files or the environment; callers build a value in code.

use std::time::Duration;

use crate::queue::QueueBackend;

/// Which per-event `trace!` records the runtime emits.
///
/// These gate only the high-volume records; state transitions, faults and
/// timeouts are always logged at their own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceConfig {
    /// Task submission, dispatch and cancellation.
    pub tasks: bool,
    /// Worker claim, park and resume.
    pub workers: bool,
    /// Lock hand-offs, waits and notifications.
    pub locks: bool,
}

impl TraceConfig {
    /// Everything on.
    pub fn all() -> Self {
        TraceConfig {
            tasks: true,
            workers: true,
            locks: true,
        }
    }
}

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeConfig {
    /// Prefix for worker thread names (`{name}-worker-{id}`).
    pub name: String,
    /// Backend for the waiting queue of future tasks.
    pub waiting_queue: QueueBackend,
    /// How many times `stop(true)`, `reset` and `wait_quiescent` re-check
    /// before giving up.
    pub quiesce_retries: u32,
    /// How long each re-check waits.
    pub quiesce_interval: Duration,
    /// Start in `Suspended` so tasks can be staged before anything runs.
    pub start_suspended: bool,
    /// Stack size for worker threads; `None` uses the platform default.
    pub worker_stack_size: Option<usize>,
    /// How many recent task faults `Runtime::faults` keeps. The fault
    /// counter in the stats is not capped.
    pub fault_log_limit: usize,
    pub trace: TraceConfig,
}

impl RuntimeConfig {
    /// Set the thread name prefix.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Select the waiting-queue backend.
    pub fn with_waiting_queue(mut self, backend: QueueBackend) -> Self {
        self.waiting_queue = backend;
        self
    }

    /// Set the quiescence retry budget.
    pub fn with_quiescence(mut self, retries: u32, interval: Duration) -> Self {
        self.quiesce_retries = retries;
        self.quiesce_interval = interval;
        self
    }

    /// Start suspended (or not).
    pub fn with_start_suspended(mut self, suspended: bool) -> Self {
        self.start_suspended = suspended;
        self
    }

    /// Set the worker thread stack size.
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Keep at most `limit` faults in the fault log.
    pub fn with_fault_log_limit(mut self, limit: usize) -> Self {
        self.fault_log_limit = limit;
        self
    }

    /// Set the trace switches.
    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }

    /// Total time a bounded wait may take.
    pub fn quiescence_budget(&self) -> Duration {
        self.quiesce_interval * self.quiesce_retries.max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            name: "desk".to_string(),
            waiting_queue: QueueBackend::Tree,
            quiesce_retries: 20,
            quiesce_interval: Duration::from_millis(50),
            start_suspended: false,
            worker_stack_size: None,
            fault_log_limit: 256,
            trace: TraceConfig::default(),
        }
    }
}
