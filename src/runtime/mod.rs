//! The scheduler and its public handle.
//!
//! | Module        | Contents                                          |
//! |---------------|---------------------------------------------------|
//! | `state`       | [`RuntimeState`] life cycle                       |
//! | `core`        | Queues, clock, pools and lock table under one lock|
//! | `dispatch`    | Baton passing, task completion, worker parking    |
//! | `stats`       | [`RuntimeStats`] snapshot and [`TaskFault`] log   |
//!
//! A [`Runtime`] owns a pool of worker threads. Exactly one of them holds
//! the dispatch baton at a time; it runs task payload code until the
//! payload returns or blocks, then passes the baton on. Everything else
//! is parked on its own mailbox.

pub(crate) mod core;
pub(crate) mod dispatch;
pub mod state;
pub mod stats;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::{KernelError, KernelResult};
use crate::sync::{LockInfo, ResourceId};
use crate::task::{TaskHandle, TaskKind};
use crate::time::SimTime;
use crate::worker::handle::Signal;
use crate::worker::{TaskContext, WorkerId, WorkerInfo};

use self::core::Core;
pub use state::RuntimeState;
pub use stats::{RuntimeStats, TaskFault};

// ── Shared ────────────────────────────────────────────────────────────

/// Everything the runtime handle and the worker threads share.
pub(crate) struct Shared {
    pub(crate) config: RuntimeConfig,
    pub(crate) core: Mutex<Core>,
    /// Signalled whenever the runtime goes quiet or a worker retires.
    pub(crate) control: Condvar,
    /// Join handles of worker threads that may still be running.
    pub(crate) threads: Mutex<BTreeMap<WorkerId, JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        Shared {
            core: Mutex::new(Core::new(&config)),
            config,
            control: Condvar::new(),
            threads: Mutex::new(BTreeMap::new()),
        }
    }

    /// Block on `control` until `done` holds or the quiescence budget
    /// runs out.
    fn await_condition(
        &self,
        operation: &'static str,
        mut core: MutexGuard<'_, Core>,
        done: impl Fn(&Core) -> bool,
    ) -> KernelResult<()> {
        self.await_for(operation, &mut core, self.config.quiescence_budget(), done)
    }

    fn await_for(
        &self,
        operation: &'static str,
        core: &mut MutexGuard<'_, Core>,
        budget: Duration,
        done: impl Fn(&Core) -> bool,
    ) -> KernelResult<()> {
        let deadline = Instant::now() + budget;
        while !done(&**core) {
            if self.control.wait_until(core, deadline).timed_out() && !done(&**core) {
                let stuck = core.stuck_workers();
                warn!(operation, stuck = ?stuck, state = %core.state, "quiescence timeout");
                return Err(KernelError::QuiescenceTimeout { operation, stuck });
            }
        }
        Ok(())
    }
}

// ── Runtime ───────────────────────────────────────────────────────────

/// A discrete-event simulation kernel.
///
/// Tasks are submitted with a logical time and run in `(time, submission
/// order)` order on a pool of recycled threads. Payloads receive a
/// [`TaskContext`] through which they can sleep, lock, wait and notify.
///
/// The control methods (`stop`, `resume`, `reset`, `wait_quiescent`) must
/// be called from outside the simulation, never from a payload.
///
/// Dropping the runtime resets it, cancelling every worker.
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Create a runtime. No threads exist until the first task is
    /// dispatched.
    pub fn new(config: RuntimeConfig) -> Self {
        debug!(name = %config.name, backend = %config.waiting_queue, "runtime created");
        Runtime {
            shared: Arc::new(Shared::new(config)),
        }
    }

    /// Create a runtime with [`RuntimeConfig::default`].
    pub fn with_defaults() -> Self {
        Runtime::new(RuntimeConfig::default())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    // ── Submission ────────────────────────────────────────────────────

    /// Schedule `payload` at absolute time `time`.
    ///
    /// Fails with [`KernelError::NonCausal`] if `time` is before
    /// [`now`](Self::now) and [`KernelError::InvalidTime`] if it is not
    /// finite. Starts dispatch if the runtime was `Inactive`.
    pub fn submit_at<F>(&self, time: f64, payload: F) -> KernelResult<TaskHandle>
    where
        F: FnOnce(&TaskContext) -> KernelResult<()> + Send + 'static,
    {
        let time = SimTime::new(time).ok_or(KernelError::InvalidTime(time))?;
        let mut core = self.shared.core.lock();
        core.submit(&self.shared, time, TaskKind::Execute(Box::new(payload)), None)
    }

    /// Schedule `payload` `delay` time units after now.
    pub fn submit_after<F>(&self, delay: f64, payload: F) -> KernelResult<TaskHandle>
    where
        F: FnOnce(&TaskContext) -> KernelResult<()> + Send + 'static,
    {
        let mut core = self.shared.core.lock();
        let time = core.clock.plus(delay).ok_or(KernelError::InvalidTime(delay))?;
        core.submit(&self.shared, time, TaskKind::Execute(Box::new(payload)), None)
    }

    /// Withdraw a task that has not run yet. Returns `false` if it already
    /// ran (or was already cancelled).
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        self.shared.core.lock().cancel(handle)
    }

    // ── Observation ───────────────────────────────────────────────────

    /// Current logical time.
    pub fn now(&self) -> f64 {
        self.shared.core.lock().clock.value()
    }

    pub fn state(&self) -> RuntimeState {
        self.shared.core.lock().state
    }

    pub fn stats(&self) -> RuntimeStats {
        self.shared.core.lock().snapshot()
    }

    /// One-line summary of queue depths, workers and rates.
    pub fn info(&self) -> String {
        self.stats().to_string()
    }

    /// Snapshot of every worker, in id order.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.shared.core.lock().worker_infos()
    }

    /// Snapshot of a lock record; `None` if the resource was never used.
    pub fn lock_info(&self, resource: ResourceId) -> Option<LockInfo> {
        self.shared.core.lock().lock_info(resource)
    }

    /// The most recent payload failures since the last reset, oldest
    /// first. At most [`RuntimeConfig::fault_log_limit`] are kept.
    pub fn faults(&self) -> Vec<TaskFault> {
        self.shared.core.lock().faults.iter().cloned().collect()
    }

    // ── Control ───────────────────────────────────────────────────────

    /// Suspend dispatch.
    ///
    /// A running task is not interrupted; the runtime becomes `Suspended`
    /// once it finishes or blocks. With `blocking`, wait for that (bounded
    /// by the quiescence budget). Stopping an `Inactive` runtime suspends
    /// it at once, which lets callers stage tasks before anything runs.
    pub fn stop(&self, blocking: bool) -> KernelResult<()> {
        let mut core = self.shared.core.lock();
        if core.state == RuntimeState::Resetting {
            return Err(KernelError::InvalidState {
                operation: "stop",
                state: core.state,
            });
        }
        if core.request_stop() {
            self.shared.control.notify_all();
            return Ok(());
        }
        if !blocking {
            return Ok(());
        }
        self.shared
            .await_condition("stop", core, |c| c.state != RuntimeState::Suspending)
    }

    /// Continue after [`stop`](Self::stop).
    pub fn resume(&self) -> KernelResult<()> {
        let mut core = self.shared.core.lock();
        match core.state {
            RuntimeState::Suspended => {
                core.set_state(RuntimeState::Running);
                if core.active.is_none() {
                    core.advance(&self.shared, None)?;
                }
                Ok(())
            }
            RuntimeState::Suspending => {
                core.set_state(RuntimeState::Running);
                Ok(())
            }
            RuntimeState::Running | RuntimeState::Inactive => Ok(()),
            RuntimeState::Resetting => Err(KernelError::InvalidState {
                operation: "resume",
                state: core.state,
            }),
        }
    }

    /// Block until nothing is running: `Inactive`, or `Suspended` with no
    /// baton holder.
    pub fn wait_quiescent(&self, timeout: Duration) -> KernelResult<()> {
        let mut core = self.shared.core.lock();
        if core.state == RuntimeState::Resetting {
            return Err(KernelError::InvalidState {
                operation: "wait_quiescent",
                state: core.state,
            });
        }
        self.shared
            .await_for("wait_quiescent", &mut core, timeout, Core::is_quiescent)
    }

    /// Cancel every worker, join their threads and return to a pristine
    /// `Inactive` runtime at time zero.
    ///
    /// Blocked workers see [`KernelError::Cancelled`] from their blocking
    /// call. A payload that never blocks or returns cannot be cancelled;
    /// in that case this returns [`KernelError::QuiescenceTimeout`] and
    /// leaves the runtime `Resetting`, and a later call retries.
    pub fn reset(&self) -> KernelResult<()> {
        let mut core = self.shared.core.lock();
        core.set_state(RuntimeState::Resetting);
        for rec in core.working.values_mut() {
            rec.cancelled = true;
            rec.handle.post(Signal::Cancel);
        }
        for (_, rec) in std::mem::take(&mut core.idle) {
            rec.handle.post(Signal::Exit);
        }
        core.ready.clear();
        core.waiting.clear();
        self.shared
            .await_condition("reset", core, |c| c.live_workers == 0)?;

        let threads = std::mem::take(&mut *self.shared.threads.lock());
        for join in threads.into_values() {
            if join.join().is_err() {
                warn!("worker thread panicked outside a task");
            }
        }

        let mut core = self.shared.core.lock();
        core.clear();
        core.set_state(RuntimeState::Inactive);
        self.shared.control.notify_all();
        debug!("runtime reset");
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::with_defaults()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(e) = self.reset() {
            warn!(error = %e, "runtime dropped without a clean reset");
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.shared.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}
