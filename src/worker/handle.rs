//! The thread-side half of a worker: mailbox, parking and generation.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::task::Task;

use super::id::WorkerId;

/// Message posted to a parked worker.
#[derive(Debug)]
pub(crate) enum Signal {
    /// Idle worker: run this `Execute` task.
    Run(Task),
    /// Blocked worker: the wake-up fired, return from the primitive.
    Resume,
    /// Reset: unwind and terminate.
    Cancel,
    /// Reset while idle: terminate.
    Exit,
}

/// Shared between the worker's own thread and the runtime core.
///
/// The core posts to the mailbox while holding its lock; the worker
/// parks on the mailbox without holding the core lock. A later post
/// overwrites an unread one, which is what lets `Cancel` pre-empt a
/// pending `Resume`.
#[derive(Debug)]
pub(crate) struct Worker {
    id: WorkerId,
    /// Block-episode counter; a wake-up claims the worker by advancing it.
    generation: AtomicU64,
    mailbox: Mutex<Option<Signal>>,
    ready: Condvar,
}

impl Worker {
    pub(crate) fn new(id: WorkerId) -> Self {
        Worker {
            id,
            generation: AtomicU64::new(0),
            mailbox: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Generation to stamp on a wake-up registered now.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Claim the worker for the wake-up stamped with `expected`.
    ///
    /// Succeeds at most once per generation; a wake-up that lost the race
    /// (or belongs to an older block episode) gets `false`.
    pub(crate) fn claim(&self, expected: u64) -> bool {
        self.generation
            .compare_exchange(expected, expected + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn post(&self, signal: Signal) {
        let mut slot = self.mailbox.lock();
        *slot = Some(signal);
        self.ready.notify_one();
    }

    /// Block the calling thread until something is posted.
    pub(crate) fn park(&self) -> Signal {
        let mut slot = self.mailbox.lock();
        loop {
            if let Some(signal) = slot.take() {
                return signal;
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Take a posted signal without blocking.
    #[cfg(test)]
    pub(crate) fn try_take(&self) -> Option<Signal> {
        self.mailbox.lock().take()
    }
}
