//! Counters, the public statistics snapshot and the fault log entry.

use std::time::{Duration, Instant};

use crate::task::TaskHandle;
use crate::time::SimTime;
use crate::worker::WorkerId;

use super::state::RuntimeState;

// ── Internal counters ─────────────────────────────────────────────────

/// Counters owned by the core. Wall time only accumulates while the
/// runtime is `Running`.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) tasks_executed: u64,
    pub(crate) wakeups: u64,
    pub(crate) time_jumps: u64,
    pub(crate) faults: u64,
    pub(crate) workers_spawned: u64,
    running_since: Option<Instant>,
    wall_accum: Duration,
}

impl Stats {
    pub(crate) fn start_wall(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub(crate) fn stop_wall(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.wall_accum += since.elapsed();
        }
    }

    /// Wall time spent `Running`, including the current stretch.
    pub(crate) fn wall(&self) -> Duration {
        match self.running_since {
            Some(since) => self.wall_accum + since.elapsed(),
            None => self.wall_accum,
        }
    }
}

// ── Public snapshot ───────────────────────────────────────────────────

/// Point-in-time view of the runtime, as returned by
/// [`Runtime::stats`](crate::Runtime::stats).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeStats {
    pub state: RuntimeState,
    pub now: SimTime,
    /// Tasks due at or before `now`.
    pub ready: usize,
    /// Tasks scheduled after `now`.
    pub waiting: usize,
    /// Workers running or blocked inside a task.
    pub busy_workers: usize,
    /// Workers parked in the idle pool.
    pub idle_workers: usize,
    pub workers_spawned: u64,
    pub tasks_executed: u64,
    /// `Notify` tasks that resumed a worker (stale ones excluded).
    pub wakeups: u64,
    /// Times the clock advanced by draining the waiting queue.
    pub time_jumps: u64,
    pub faults: u64,
    /// Lock records created so far.
    pub locks: usize,
    /// Wall time spent `Running`.
    pub wall: Duration,
}

impl RuntimeStats {
    /// Executed tasks per wall-clock second.
    pub fn task_rate(&self) -> f64 {
        let secs = self.wall.as_secs_f64();
        if secs > 0.0 {
            self.tasks_executed as f64 / secs
        } else {
            0.0
        }
    }

    /// Simulated time units per wall-clock second.
    pub fn sim_per_wall(&self) -> f64 {
        let secs = self.wall.as_secs_f64();
        if secs > 0.0 {
            self.now.value() / secs
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} | ready={} waiting={} | workers busy={} idle={} spawned={} | \
             tasks={} ({:.1}/s) wakeups={} jumps={} faults={} locks={} | sim/wall={:.3}",
            self.state,
            self.now,
            self.ready,
            self.waiting,
            self.busy_workers,
            self.idle_workers,
            self.workers_spawned,
            self.tasks_executed,
            self.task_rate(),
            self.wakeups,
            self.time_jumps,
            self.faults,
            self.locks,
            self.sim_per_wall(),
        )
    }
}

// ── Fault log ─────────────────────────────────────────────────────────

/// A task payload that returned an error or panicked.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskFault {
    pub worker: WorkerId,
    pub task: Option<TaskHandle>,
    /// Clock value when the fault was recorded.
    pub time: SimTime,
    pub message: String,
}

impl std::fmt::Display for TaskFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.time, self.worker)?;
        if let Some(task) = &self.task {
            write!(f, " ({})", task)?;
        }
        write!(f, ": {}", self.message)
    }
}
