//! The state behind the runtime's single coarse lock.
//!
//! `Core` owns the clock, the ready FIFO, the waiting queue, the worker
//! pools, the lock table and the counters. Everything that reorders work
//! happens with the core locked; dispatch itself lives in `dispatch.rs`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{RuntimeConfig, TraceConfig};
use crate::error::{KernelError, KernelResult};
use crate::queue::EventQueue;
use crate::sync::{LockInfo, LockTable, ResourceId};
use crate::task::{Task, TaskHandle, TaskIdGen, TaskKind, WakeTarget};
use crate::time::SimTime;
use crate::worker::handle::Worker;
use crate::worker::{WorkerId, WorkerInfo, WorkerState};

use super::state::RuntimeState;
use super::stats::{RuntimeStats, Stats, TaskFault};
use super::Shared;

// ── Worker record ─────────────────────────────────────────────────────

/// Scheduler-side bookkeeping for one worker.
pub(crate) struct WorkerRecord {
    pub(crate) handle: Arc<Worker>,
    pub(crate) state: WorkerState,
    pub(crate) current: Option<TaskHandle>,
    /// Task submitted by this worker at the current time while the ready
    /// queue was empty. Returns to the front of the ready queue if the
    /// worker blocks before finishing.
    pub(crate) next_task: Option<Task>,
    pub(crate) wakeup_time: Option<SimTime>,
    pub(crate) sleep_target: Option<ResourceId>,
    pub(crate) cancelled: bool,
}

impl WorkerRecord {
    pub(crate) fn new(handle: Arc<Worker>) -> Self {
        WorkerRecord {
            handle,
            state: WorkerState::Inactive,
            current: None,
            next_task: None,
            wakeup_time: None,
            sleep_target: None,
            cancelled: false,
        }
    }

    pub(crate) fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.handle.id(),
            state: self.state,
            current: self.current,
            wakeup_time: self.wakeup_time,
            sleep_target: self.sleep_target,
        }
    }

    /// Back to a clean idle record.
    pub(crate) fn park_idle(&mut self) {
        self.state = WorkerState::Inactive;
        self.current = None;
        self.wakeup_time = None;
        self.sleep_target = None;
    }
}

// ── Core ──────────────────────────────────────────────────────────────

pub(crate) struct Core {
    pub(crate) state: RuntimeState,
    pub(crate) clock: SimTime,
    /// Tasks with `time <= clock`, FIFO.
    pub(crate) ready: VecDeque<Task>,
    /// Tasks with `time > clock`.
    pub(crate) waiting: Box<dyn EventQueue<Task>>,
    pub(crate) ids: TaskIdGen,
    pub(crate) locks: LockTable,
    /// Workers running or blocked inside a task.
    pub(crate) working: BTreeMap<WorkerId, WorkerRecord>,
    /// Workers parked awaiting reassignment.
    pub(crate) idle: BTreeMap<WorkerId, WorkerRecord>,
    /// Holder of the dispatch baton.
    pub(crate) active: Option<WorkerId>,
    pub(crate) next_worker: u64,
    /// Worker threads that have not yet retired.
    pub(crate) live_workers: usize,
    pub(crate) stats: Stats,
    /// The most recent faults, oldest first; at most `fault_log_limit`.
    pub(crate) faults: VecDeque<TaskFault>,
    pub(crate) fault_log_limit: usize,
    pub(crate) trace: TraceConfig,
}

impl Core {
    pub(crate) fn new(config: &RuntimeConfig) -> Self {
        let mut core = Core {
            state: RuntimeState::Inactive,
            clock: SimTime::ZERO,
            ready: VecDeque::new(),
            waiting: config.waiting_queue.build(),
            ids: TaskIdGen::new(),
            locks: LockTable::new(),
            working: BTreeMap::new(),
            idle: BTreeMap::new(),
            active: None,
            next_worker: 0,
            live_workers: 0,
            stats: Stats::default(),
            faults: VecDeque::new(),
            fault_log_limit: config.fault_log_limit,
            trace: config.trace,
        };
        if config.start_suspended {
            core.state = RuntimeState::Suspended;
        }
        core
    }

    // ── State ─────────────────────────────────────────────────────────

    /// Change state, keeping the wall-clock accounting in step.
    pub(crate) fn set_state(&mut self, next: RuntimeState) {
        let prev = self.state;
        if prev == next {
            return;
        }
        if next == RuntimeState::Running {
            self.stats.start_wall();
        } else if prev == RuntimeState::Running {
            self.stats.stop_wall();
        }
        self.state = next;
        debug!(from = %prev, to = %next, time = %self.clock, "runtime state");
    }

    /// Ask the baton holder to let go at its next dispatch point.
    ///
    /// Returns `true` if the runtime is now `Suspended` outright.
    pub(crate) fn request_stop(&mut self) -> bool {
        match self.state {
            RuntimeState::Inactive => {
                self.set_state(RuntimeState::Suspended);
                true
            }
            RuntimeState::Running if self.active.is_none() => {
                self.set_state(RuntimeState::Suspended);
                true
            }
            RuntimeState::Running => {
                self.set_state(RuntimeState::Suspending);
                false
            }
            RuntimeState::Suspended => true,
            RuntimeState::Suspending | RuntimeState::Resetting => false,
        }
    }

    /// Quiet and nobody holds the baton.
    pub(crate) fn is_quiescent(&self) -> bool {
        self.state.is_quiet() && self.active.is_none()
    }

    // ── Submission ────────────────────────────────────────────────────

    /// Route a new task to the waiting queue, the ready queue or the
    /// caller's `next_task` slot, and start dispatch if idle.
    pub(crate) fn submit(
        &mut self,
        shared: &Arc<Shared>,
        time: SimTime,
        kind: TaskKind,
        caller: Option<WorkerId>,
    ) -> KernelResult<TaskHandle> {
        if time.is_before(self.clock) {
            return Err(KernelError::NonCausal {
                requested: time.value(),
                now: self.clock.value(),
            });
        }
        let task = Task::new(self.ids.next_id(), time, kind);
        let handle = task.handle();
        if self.state == RuntimeState::Resetting {
            trace!(task = %handle, "dropped submission during reset");
            return Ok(handle);
        }
        if self.trace.tasks {
            trace!(task = %handle, kind = %task.kind, caller = ?caller, "submit");
        }

        if self.clock.is_before(time) {
            self.waiting.enqueue(time.value(), task);
        } else {
            let slot = match caller {
                Some(w) if self.ready.is_empty() => self
                    .working
                    .get_mut(&w)
                    .filter(|rec| rec.next_task.is_none()),
                _ => None,
            };
            match slot {
                Some(rec) => {
                    rec.next_task = Some(task);
                    return Ok(handle);
                }
                None => self.ready.push_back(task),
            }
        }
        self.kick(shared)?;
        Ok(handle)
    }

    /// Queue a `Notify` for `target` at `time`, bypassing the fast path.
    ///
    /// Used for wake-ups registered on behalf of some other worker (lock
    /// hand-offs, notifications) and for a worker's own sleep.
    pub(crate) fn schedule_wake(&mut self, time: SimTime, target: WakeTarget) {
        if self.state == RuntimeState::Resetting {
            return;
        }
        let time = time.max(self.clock);
        let task = Task::new(self.ids.next_id(), time, TaskKind::Notify(target));
        if self.trace.workers {
            trace!(worker = %target.worker, generation = target.generation, time = %time, "wake scheduled");
        }
        if self.clock.is_before(time) {
            self.waiting.enqueue(time.value(), task);
        } else {
            self.ready.push_back(task);
        }
    }

    /// Leave `Inactive` and hand out the baton.
    pub(crate) fn kick(&mut self, shared: &Arc<Shared>) -> KernelResult<()> {
        if self.state != RuntimeState::Inactive {
            return Ok(());
        }
        self.set_state(RuntimeState::Running);
        if self.active.is_none() {
            self.advance(shared, None)?;
        }
        Ok(())
    }

    /// Remove a task that has not run yet.
    pub(crate) fn cancel(&mut self, handle: TaskHandle) -> bool {
        let removed = if self.clock.is_before(handle.time) {
            self.waiting
                .remove(handle.time.value(), &mut |t: &Task| t.id == handle.id)
                .is_some()
        } else if let Some(pos) = self.ready.iter().position(|t| t.id == handle.id) {
            self.ready.remove(pos).is_some()
        } else {
            self.working
                .values_mut()
                .find(|rec| rec.next_task.as_ref().is_some_and(|t| t.id == handle.id))
                .and_then(|rec| rec.next_task.take())
                .is_some()
        };
        if removed && self.trace.tasks {
            trace!(task = %handle, "cancelled");
        }
        removed
    }

    /// Pop the next due task, jumping the clock forward if nothing is
    /// ready.
    pub(crate) fn dequeue_next(&mut self) -> Option<Task> {
        if self.ready.is_empty() {
            let batch = self.waiting.drain_min();
            if let Some((key, _)) = batch.first() {
                self.clock = self.clock.max(SimTime::from_key(*key));
                self.stats.time_jumps += 1;
                if self.trace.tasks {
                    trace!(time = %self.clock, due = batch.len(), "time jump");
                }
            }
            self.ready.extend(batch.into_iter().map(|(_, task)| task));
        }
        self.ready.pop_front()
    }

    // ── Locks ─────────────────────────────────────────────────────────

    /// Drop everything `worker` holds or waits for, waking whoever
    /// inherits a lock.
    pub(crate) fn release_all_locks(&mut self, worker: WorkerId) {
        let held = self.locks.held_by(worker);
        let inheritors = self.locks.release_all(worker);
        if !held.is_empty() {
            debug!(worker = %worker, resources = ?held, "released locks of ended task");
        }
        let now = self.clock;
        for p in inheritors {
            self.schedule_wake(
                now,
                WakeTarget {
                    worker: p.worker,
                    generation: p.generation,
                },
            );
        }
    }

    /// Append to the fault log, dropping the oldest entries past the limit.
    pub(crate) fn record_fault(&mut self, fault: TaskFault) {
        self.stats.faults += 1;
        self.faults.push_back(fault);
        while self.faults.len() > self.fault_log_limit {
            self.faults.pop_front();
        }
    }

    // ── Diagnostics ───────────────────────────────────────────────────

    pub(crate) fn snapshot(&self) -> RuntimeStats {
        let next_task_depth = self
            .working
            .values()
            .filter(|rec| rec.next_task.is_some())
            .count();
        RuntimeStats {
            state: self.state,
            now: self.clock,
            ready: self.ready.len() + next_task_depth,
            waiting: self.waiting.len(),
            busy_workers: self.working.len(),
            idle_workers: self.idle.len(),
            workers_spawned: self.stats.workers_spawned,
            tasks_executed: self.stats.tasks_executed,
            wakeups: self.stats.wakeups,
            time_jumps: self.stats.time_jumps,
            faults: self.stats.faults,
            locks: self.locks.len(),
            wall: self.stats.wall(),
        }
    }

    /// All workers, in id order.
    pub(crate) fn worker_infos(&self) -> Vec<WorkerInfo> {
        let mut infos: Vec<WorkerInfo> = self
            .working
            .values()
            .chain(self.idle.values())
            .map(WorkerRecord::info)
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    pub(crate) fn lock_info(&self, resource: ResourceId) -> Option<LockInfo> {
        self.locks.info(resource)
    }

    /// Workers that would keep a bounded wait from succeeding.
    pub(crate) fn stuck_workers(&self) -> Vec<WorkerId> {
        match self.state {
            RuntimeState::Resetting => self.working.keys().copied().collect(),
            _ => self.active.into_iter().collect(),
        }
    }

    /// Forget everything; only valid once every worker has retired.
    ///
    /// Task ids keep counting, so a handle from before the reset never
    /// matches a task submitted after it.
    pub(crate) fn clear(&mut self) {
        self.ready.clear();
        self.waiting.clear();
        self.locks.clear();
        self.working.clear();
        self.idle.clear();
        self.active = None;
        self.next_worker = 0;
        self.clock = SimTime::ZERO;
        self.stats = Stats::default();
        self.faults.clear();
    }
}
