/// Task records for the discrete-event kernel.
///
/// Every unit of scheduled work is a `Task`. Tasks sit on the scheduler's
/// ready or waiting queue and are dispatched in `(time, submission order)`
/// order. A task either runs a payload on a worker or resumes a worker
/// parked in a blocking primitive.

use crate::error::KernelResult;
use crate::time::SimTime;
use crate::worker::{TaskContext, WorkerId};

// ── Task ID ───────────────────────────────────────────────────────────

/// A strictly-increasing task identifier.
///
/// Used as the identity half of a [`TaskHandle`] so that a task can be
/// found and removed from the waiting queue by `(time, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(u64);

impl TaskId {
    /// Wrap a raw u64 into a `TaskId`.
    #[inline]
    pub fn new(raw: u64) -> Self {
        TaskId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

// ── Task ID Generator ─────────────────────────────────────────────────

/// Strictly-increasing task-ID generator, owned by the runtime core.
#[derive(Debug, Clone, Default)]
pub struct TaskIdGen {
    next: u64,
}

impl TaskIdGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        TaskIdGen { next: 0 }
    }

    /// Mint the next task ID.
    pub fn next_id(&mut self) -> TaskId {
        let id = TaskId(self.next);
        self.next += 1;
        id
    }
}

// ── Payload / Kind ────────────────────────────────────────────────────

/// The unit of protocol work carried by an `Execute` task.
///
/// Receives the [`TaskContext`] of the worker running it. Returning
/// `Err(KernelError::Cancelled)` (usually via `?` on a blocking call)
/// tells the worker it has been cancelled; any other error is recorded as
/// a fault.
pub type Payload = Box<dyn FnOnce(&TaskContext) -> KernelResult<()> + Send + 'static>;

/// The worker a `Notify` task resumes.
///
/// `generation` is the worker's block-episode counter at the time the
/// wake-up was registered; a wake-up whose generation no longer matches
/// is stale and is discarded at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTarget {
    pub worker: WorkerId,
    pub generation: u64,
}

/// What a task does when dispatched.
pub enum TaskKind {
    /// Run a payload on a worker.
    Execute(Payload),
    /// Resume a worker parked in a blocking primitive.
    Notify(WakeTarget),
}

impl std::fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Execute(_) => write!(f, "Execute(..)"),
            TaskKind::Notify(target) => write!(f, "Notify({:?})", target),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Execute(_) => write!(f, "Execute"),
            TaskKind::Notify(target) => {
                write!(f, "Notify({}, gen {})", target.worker, target.generation)
            }
        }
    }
}

// ── Task ──────────────────────────────────────────────────────────────

/// A single time-stamped unit of work.
#[derive(Debug)]
pub struct Task {
    /// Unique identifier (monotonically increasing).
    pub id: TaskId,

    /// The logical time at which this task becomes due.
    pub time: SimTime,

    /// What happens on dispatch.
    pub kind: TaskKind,
}

impl Task {
    /// Convenience constructor.
    pub fn new(id: TaskId, time: SimTime, kind: TaskKind) -> Self {
        Task { id, time, kind }
    }

    /// The handle identifying this task.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            time: self.time,
        }
    }

    /// Returns `true` for `Notify` tasks.
    pub fn is_notify(&self) -> bool {
        matches!(self.kind, TaskKind::Notify(_))
    }
}

// ── Task Handle ───────────────────────────────────────────────────────

/// Identifies a submitted task for later cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskHandle {
    pub id: TaskId,
    pub time: SimTime,
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.time)
    }
}
