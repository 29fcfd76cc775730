//! Worker life-cycle states and the diagnostic snapshot.

use crate::sync::ResourceId;
use crate::task::TaskHandle;
use crate::time::SimTime;

use super::id::WorkerId;

/// What a worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkerState {
    /// In the idle pool, parked awaiting a task.
    Inactive,
    /// Holds the dispatch baton and is running payload code.
    Active,
    /// Parked in `sleep_until` until its wake-up time.
    Sleeping,
    /// Parked waiting for a contended lock.
    Locking,
    /// Parked in `wait` until notified.
    Waiting,
    /// Declared it will not block again; running its final stretch.
    Finishing,
}

impl WorkerState {
    /// Parked inside a blocking primitive.
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            WorkerState::Sleeping | WorkerState::Locking | WorkerState::Waiting
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Inactive => "inactive",
            WorkerState::Active => "active",
            WorkerState::Sleeping => "sleeping",
            WorkerState::Locking => "locking",
            WorkerState::Waiting => "waiting",
            WorkerState::Finishing => "finishing",
        };
        f.write_str(s)
    }
}

/// Diagnostic snapshot of one worker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub state: WorkerState,
    /// Task whose payload the worker is running (or blocked inside).
    pub current: Option<TaskHandle>,
    /// Due time of a pending `sleep_until`.
    pub wakeup_time: Option<SimTime>,
    /// Resource a `Locking`/`Waiting` worker is parked on.
    pub sleep_target: Option<ResourceId>,
}

impl std::fmt::Display for WorkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.state)?;
        if let Some(task) = &self.current {
            write!(f, " running {}", task)?;
        }
        if let Some(t) = &self.wakeup_time {
            write!(f, " until {}", t)?;
        }
        if let Some(r) = &self.sleep_target {
            write!(f, " on {}", r)?;
        }
        Ok(())
    }
}
