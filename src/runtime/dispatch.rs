//! Baton passing: who runs next, and what a worker does when its task
//! ends or blocks.
//!
//! All functions here run with the core locked. Mailbox posts happen
//! under the core lock too, so a worker is always reassigned atomically
//! with the bookkeeping that describes it.

use std::sync::Arc;

use parking_lot::MutexGuard;
use tracing::{debug, error, trace, warn};

use crate::error::{KernelError, KernelResult};
use crate::task::{Task, TaskKind, WakeTarget};
use crate::worker::handle::{Signal, Worker};
use crate::worker::{thread, WorkerId, WorkerState};

use super::core::{Core, WorkerRecord};
use super::state::RuntimeState;
use super::stats::TaskFault;
use super::Shared;

/// How a payload ended, as seen by its worker thread.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Cancelled,
    Fault(String),
}

/// What the worker thread does after reporting an outcome.
#[derive(Debug)]
pub(crate) enum Next {
    /// Run this task straight away.
    Run(Task),
    /// Park in the idle pool.
    Idle,
    /// Leave the worker loop and retire.
    Terminate,
}

impl Core {
    /// Pass the baton to whatever is due next.
    ///
    /// `finishing` is the worker that just completed a task, if any; an
    /// `Execute` task is returned to it rather than posted elsewhere.
    pub(crate) fn advance(
        &mut self,
        shared: &Arc<Shared>,
        finishing: Option<WorkerId>,
    ) -> KernelResult<Option<Task>> {
        loop {
            match self.state {
                RuntimeState::Running => {}
                RuntimeState::Suspending => {
                    self.active = None;
                    self.set_state(RuntimeState::Suspended);
                    shared.control.notify_all();
                    return Ok(None);
                }
                RuntimeState::Inactive | RuntimeState::Suspended | RuntimeState::Resetting => {
                    self.active = None;
                    return Ok(None);
                }
            }

            let Some(task) = self.dequeue_next() else {
                self.active = None;
                self.set_state(RuntimeState::Inactive);
                shared.control.notify_all();
                return Ok(None);
            };

            match task.kind {
                TaskKind::Notify(target) => {
                    if self.wake(target) {
                        self.active = Some(target.worker);
                        return Ok(None);
                    }
                }
                TaskKind::Execute(_) => {
                    if let Some(me) = finishing {
                        if let Some(rec) = self.working.get_mut(&me) {
                            rec.state = WorkerState::Active;
                            rec.current = Some(task.handle());
                            self.active = Some(me);
                            if self.trace.tasks {
                                trace!(worker = %me, task = %task.handle(), "dispatch (recycled)");
                            }
                            return Ok(Some(task));
                        }
                    }
                    self.hand_to_pool(shared, task)?;
                    return Ok(None);
                }
            }
        }
    }

    /// Resume a blocked worker if the wake-up is still current.
    fn wake(&mut self, target: WakeTarget) -> bool {
        let Some(rec) = self.working.get_mut(&target.worker) else {
            warn!(worker = %target.worker, "wake-up for a worker that no longer exists");
            return false;
        };
        if !rec.state.is_blocked() || !rec.handle.claim(target.generation) {
            if self.trace.workers {
                trace!(worker = %target.worker, generation = target.generation, "stale wake-up skipped");
            }
            return false;
        }
        rec.state = WorkerState::Active;
        rec.wakeup_time = None;
        rec.sleep_target = None;
        rec.handle.post(Signal::Resume);
        self.stats.wakeups += 1;
        if self.trace.workers {
            trace!(worker = %target.worker, time = %self.clock, "resumed");
        }
        true
    }

    /// Post an `Execute` task to an idle worker, spawning one if the pool
    /// is empty.
    fn hand_to_pool(&mut self, shared: &Arc<Shared>, task: Task) -> KernelResult<()> {
        let mut rec = match self.idle.pop_first() {
            Some((_, rec)) => rec,
            None => match self.spawn_worker(shared) {
                Ok(rec) => rec,
                Err(e) => {
                    error!(task = %task.handle(), error = %e, "could not spawn worker");
                    self.ready.push_front(task);
                    self.active = None;
                    self.set_state(RuntimeState::Inactive);
                    shared.control.notify_all();
                    return Err(KernelError::Spawn(e));
                }
            },
        };
        let id = rec.handle.id();
        rec.state = WorkerState::Active;
        rec.current = Some(task.handle());
        if self.trace.tasks {
            trace!(worker = %id, task = %task.handle(), "dispatch");
        }
        rec.handle.post(Signal::Run(task));
        self.working.insert(id, rec);
        self.active = Some(id);
        Ok(())
    }

    fn spawn_worker(&mut self, shared: &Arc<Shared>) -> std::io::Result<WorkerRecord> {
        let id = WorkerId::new(self.next_worker);
        let worker = Arc::new(Worker::new(id));
        let join = thread::spawn(shared, Arc::clone(&worker))?;
        shared.threads.lock().insert(id, join);
        self.next_worker += 1;
        self.live_workers += 1;
        self.stats.workers_spawned += 1;
        debug!(worker = %id, "spawned worker");
        Ok(WorkerRecord::new(worker))
    }
}

/// Report the end of a payload and find out what to do next.
pub(crate) fn finish_task(shared: &Arc<Shared>, me: WorkerId, outcome: Outcome) -> Next {
    let mut guard = shared.core.lock();
    let core = &mut *guard;

    let cancelled = core.working.get(&me).map_or(true, |rec| rec.cancelled);
    if cancelled || matches!(outcome, Outcome::Cancelled) {
        if cancelled && !matches!(outcome, Outcome::Cancelled) {
            warn!(worker = %me, "payload ignored cancellation");
        }
        core.release_all_locks(me);
        if let Some(mut rec) = core.working.remove(&me) {
            if let Some(next) = rec.next_task.take() {
                core.ready.push_front(next);
            }
        }
        if core.active == Some(me) {
            core.active = None;
            if let Err(e) = core.advance(shared, None) {
                error!(worker = %me, error = %e, "dispatch failed after cancellation");
            }
        }
        debug!(worker = %me, "worker terminating");
        return Next::Terminate;
    }

    core.stats.tasks_executed += 1;
    let task = core.working.get(&me).and_then(|rec| rec.current);
    if let Outcome::Fault(message) = outcome {
        error!(worker = %me, task = ?task, time = %core.clock, "task fault: {}", message);
        core.record_fault(TaskFault {
            worker: me,
            task,
            time: core.clock,
            message,
        });
        core.release_all_locks(me);
    } else {
        // Locks never outlive the task that took them.
        let held = core.locks.held_by(me);
        if !held.is_empty() {
            warn!(worker = %me, task = ?task, resources = ?held, "task completed while holding locks");
            core.release_all_locks(me);
        }
    }

    if let Some(rec) = core.working.get_mut(&me) {
        rec.current = None;
        rec.state = WorkerState::Active;
        if let Some(next) = rec.next_task.take() {
            core.ready.push_front(next);
        }
    }

    if core.state == RuntimeState::Resetting {
        return Next::Terminate;
    }

    match core.advance(shared, Some(me)) {
        Ok(Some(task)) => Next::Run(task),
        Ok(None) => {
            if let Some(mut rec) = core.working.remove(&me) {
                rec.park_idle();
                core.idle.insert(me, rec);
            }
            Next::Idle
        }
        Err(e) => {
            error!(worker = %me, error = %e, "dispatch failed");
            if let Some(mut rec) = core.working.remove(&me) {
                rec.park_idle();
                core.idle.insert(me, rec);
            }
            Next::Idle
        }
    }
}

/// Park the calling worker in `state` and give up the baton.
///
/// Consumes the core guard: the lock is released before parking.
pub(crate) fn suspend_worker(
    shared: &Arc<Shared>,
    worker: &Worker,
    mut guard: MutexGuard<'_, Core>,
    state: WorkerState,
) -> KernelResult<()> {
    let me = worker.id();
    let core = &mut *guard;
    if let Some(rec) = core.working.get_mut(&me) {
        rec.state = state;
        if let Some(next) = rec.next_task.take() {
            core.ready.push_front(next);
        }
    }
    if core.trace.workers {
        trace!(worker = %me, state = %state, time = %core.clock, "parking");
    }
    if core.active == Some(me) {
        core.active = None;
    }
    if core.active.is_none() {
        if let Err(e) = core.advance(shared, None) {
            error!(worker = %me, error = %e, "dispatch failed while parking");
        }
    }
    drop(guard);

    match worker.park() {
        Signal::Resume => Ok(()),
        Signal::Cancel | Signal::Exit => Err(KernelError::Cancelled),
        Signal::Run(task) => {
            // A blocked worker is never handed a task; put it back.
            error!(worker = %me, task = %task.handle(), "task posted to a blocked worker");
            shared.core.lock().ready.push_front(task);
            Err(KernelError::Cancelled)
        }
    }
}

impl Shared {
    /// Final bookkeeping for a worker thread that is about to exit.
    ///
    /// Outside a reset nobody will join this thread, so its handle is
    /// dropped here and the thread detaches as it returns.
    pub(crate) fn retire(&self, me: WorkerId) {
        let mut core = self.core.lock();
        core.working.remove(&me);
        core.idle.remove(&me);
        core.live_workers = core.live_workers.saturating_sub(1);
        if core.state != RuntimeState::Resetting {
            drop(self.threads.lock().remove(&me));
        }
        debug!(worker = %me, live = core.live_workers, "worker retired");
        self.control.notify_all();
    }
}
