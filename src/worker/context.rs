//! `TaskContext` — what a running payload can do.
//!
//! Every blocking primitive follows the same shape: with the core locked,
//! register a wake-up (a `Notify` task or a place in a lock FIFO) stamped
//! with the worker's current generation, then hand the guard to
//! `suspend_worker`, which passes the baton on and parks.

use std::sync::Arc;

use parking_lot::MutexGuard;
use tracing::{error, trace};

use crate::error::{KernelError, KernelResult};
use crate::runtime::core::Core;
use crate::runtime::dispatch::suspend_worker;
use crate::runtime::Shared;
use crate::sync::{Acquire, Pending, Release, ResourceId};
use crate::task::{TaskHandle, TaskKind, WakeTarget};
use crate::time::SimTime;

use super::handle::Worker;
use super::id::WorkerId;
use super::state::WorkerState;

/// Handle given to a payload for the duration of one task.
///
/// Blocking calls return [`KernelError::Cancelled`] once the runtime is
/// being reset; payloads should propagate it with `?`.
pub struct TaskContext {
    shared: Arc<Shared>,
    worker: Arc<Worker>,
    task: TaskHandle,
}

impl TaskContext {
    pub(crate) fn new(shared: Arc<Shared>, worker: Arc<Worker>, task: TaskHandle) -> Self {
        TaskContext {
            shared,
            worker,
            task,
        }
    }

    // ── Introspection ─────────────────────────────────────────────────

    /// Current logical time.
    pub fn now(&self) -> f64 {
        self.shared.core.lock().clock.value()
    }

    /// The task whose payload is running.
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker.id()
    }

    /// `true` once a reset has cancelled this worker.
    pub fn is_cancelled(&self) -> bool {
        let core = self.shared.core.lock();
        core.working
            .get(&self.worker.id())
            .map_or(true, |rec| rec.cancelled)
    }

    // ── Submission ────────────────────────────────────────────────────

    /// Schedule a follow-up task at absolute time `time`.
    pub fn submit_at<F>(&self, time: f64, payload: F) -> KernelResult<TaskHandle>
    where
        F: FnOnce(&TaskContext) -> KernelResult<()> + Send + 'static,
    {
        let time = SimTime::new(time).ok_or(KernelError::InvalidTime(time))?;
        let mut core = self.shared.core.lock();
        core.submit(
            &self.shared,
            time,
            TaskKind::Execute(Box::new(payload)),
            Some(self.worker.id()),
        )
    }

    /// Schedule a follow-up task `delay` after now.
    pub fn submit_after<F>(&self, delay: f64, payload: F) -> KernelResult<TaskHandle>
    where
        F: FnOnce(&TaskContext) -> KernelResult<()> + Send + 'static,
    {
        let mut core = self.shared.core.lock();
        let time = core.clock.plus(delay).ok_or(KernelError::InvalidTime(delay))?;
        core.submit(
            &self.shared,
            time,
            TaskKind::Execute(Box::new(payload)),
            Some(self.worker.id()),
        )
    }

    /// Withdraw a task that has not run yet.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        self.shared.core.lock().cancel(handle)
    }

    // ── Sleeping ──────────────────────────────────────────────────────

    /// Block until the clock reaches `time`. A time in the past wakes at
    /// the current time, after the tasks already due.
    pub fn sleep_until(&self, time: f64) -> KernelResult<()> {
        let time = SimTime::new(time).ok_or(KernelError::InvalidTime(time))?;
        let mut core = self.shared.core.lock();
        self.ensure_blockable(&core)?;
        let due = time.max(core.clock);
        let me = self.worker.id();
        core.schedule_wake(
            due,
            WakeTarget {
                worker: me,
                generation: self.worker.generation(),
            },
        );
        if let Some(rec) = core.working.get_mut(&me) {
            rec.wakeup_time = Some(due);
        }
        suspend_worker(&self.shared, &self.worker, core, WorkerState::Sleeping)
    }

    /// Block for `delay` time units.
    pub fn sleep_for(&self, delay: f64) -> KernelResult<()> {
        let due = {
            let core = self.shared.core.lock();
            core.clock.plus(delay).ok_or(KernelError::InvalidTime(delay))?
        };
        self.sleep_until(due.value())
    }

    // ── Locks ─────────────────────────────────────────────────────────

    /// Acquire `resource`, blocking behind earlier requesters if another
    /// worker holds it. Reentrant.
    pub fn lock(&self, resource: ResourceId) -> KernelResult<()> {
        let core = self.shared.core.lock();
        self.ensure_blockable(&core)?;
        self.acquire(core, resource, 1)
    }

    /// Drop one hold count. At zero, ownership passes to the oldest
    /// requester. Unlocking a resource the caller does not hold does
    /// nothing.
    pub fn unlock(&self, resource: ResourceId) {
        let mut core = self.shared.core.lock();
        let me = self.worker.id();
        match core.locks.release(resource, me) {
            Release::NotHolder => {
                trace!(worker = %me, resource = %resource, "unlock by non-holder ignored");
            }
            Release::StillHeld(count) => {
                if core.trace.locks {
                    trace!(worker = %me, resource = %resource, count, "unlock (still held)");
                }
            }
            Release::Released => {
                if core.trace.locks {
                    trace!(worker = %me, resource = %resource, "unlock");
                }
            }
            Release::HandedOff(next) => {
                if core.trace.locks {
                    trace!(worker = %me, resource = %resource, to = %next.worker, "lock handed off");
                }
                let now = core.clock;
                core.schedule_wake(now, target(next));
            }
        }
    }

    /// Release `resource` completely and block until notified, then take
    /// it back with the same hold count.
    ///
    /// If the caller did not hold `resource`, nothing is re-acquired.
    pub fn wait(&self, resource: ResourceId) -> KernelResult<()> {
        let mut core = self.shared.core.lock();
        self.ensure_blockable(&core)?;
        let me = self.worker.id();
        let (held, heir) = core.locks.release_fully(resource, me);
        if let Some(next) = heir {
            let now = core.clock;
            core.schedule_wake(now, target(next));
        }
        core.locks.enqueue_waiter(
            resource,
            Pending {
                worker: me,
                generation: self.worker.generation(),
                hold: held,
            },
        );
        if let Some(rec) = core.working.get_mut(&me) {
            rec.sleep_target = Some(resource);
        }
        if core.trace.locks {
            trace!(worker = %me, resource = %resource, held, "wait");
        }
        suspend_worker(&self.shared, &self.worker, core, WorkerState::Waiting)?;

        if held == 0 {
            return Ok(());
        }
        let core = self.shared.core.lock();
        self.ensure_blockable(&core)?;
        self.acquire(core, resource, held)
    }

    /// Wake the longest-waiting worker on `resource`. Returns how many
    /// were woken (0 or 1).
    pub fn notify(&self, resource: ResourceId) -> usize {
        let mut core = self.shared.core.lock();
        match core.locks.pop_waiter(resource) {
            Some(p) => {
                let now = core.clock;
                core.schedule_wake(now, target(p));
                if core.trace.locks {
                    trace!(resource = %resource, woken = %p.worker, "notify");
                }
                1
            }
            None => 0,
        }
    }

    /// Wake every worker waiting on `resource`, oldest first.
    pub fn notify_all(&self, resource: ResourceId) -> usize {
        let mut core = self.shared.core.lock();
        let waiters = core.locks.drain_waiters(resource);
        let now = core.clock;
        for p in &waiters {
            core.schedule_wake(now, target(*p));
        }
        if core.trace.locks {
            trace!(resource = %resource, woken = waiters.len(), "notify_all");
        }
        waiters.len()
    }

    // ── Life cycle ────────────────────────────────────────────────────

    /// Declare that this task will not block again. Any later blocking
    /// call fails with [`KernelError::Misuse`].
    pub fn finish(&self) {
        let mut core = self.shared.core.lock();
        if let Some(rec) = core.working.get_mut(&self.worker.id()) {
            rec.state = WorkerState::Finishing;
        }
    }

    /// Ask the runtime to suspend once this task finishes or blocks.
    pub fn stop(&self) {
        let mut core = self.shared.core.lock();
        core.request_stop();
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn ensure_blockable(&self, core: &Core) -> KernelResult<()> {
        let me = self.worker.id();
        let Some(rec) = core.working.get(&me) else {
            return Err(KernelError::Cancelled);
        };
        if rec.cancelled {
            return Err(KernelError::Cancelled);
        }
        if rec.state == WorkerState::Finishing {
            error!(worker = %me, task = %self.task, "blocking call after finish()");
            return Err(KernelError::misuse(format!(
                "{} called a blocking primitive after finish()",
                me
            )));
        }
        Ok(())
    }

    /// Take `hold` counts of `resource`, queueing and parking if needed.
    fn acquire(
        &self,
        mut core: MutexGuard<'_, Core>,
        resource: ResourceId,
        hold: u32,
    ) -> KernelResult<()> {
        let me = self.worker.id();
        match core.locks.try_acquire(resource, me, hold) {
            Acquire::Acquired | Acquire::Reentered(_) => {
                if core.trace.locks {
                    trace!(worker = %me, resource = %resource, "lock");
                }
                Ok(())
            }
            Acquire::Contended => {
                core.locks.enqueue_requester(
                    resource,
                    Pending {
                        worker: me,
                        generation: self.worker.generation(),
                        hold,
                    },
                );
                if let Some(rec) = core.working.get_mut(&me) {
                    rec.sleep_target = Some(resource);
                }
                if core.trace.locks {
                    trace!(worker = %me, resource = %resource, "lock contended");
                }
                suspend_worker(&self.shared, &self.worker, core, WorkerState::Locking)
            }
        }
    }
}

fn target(p: Pending) -> WakeTarget {
    WakeTarget {
        worker: p.worker,
        generation: p.generation,
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("worker", &self.worker.id())
            .field("task", &self.task)
            .finish()
    }
}
