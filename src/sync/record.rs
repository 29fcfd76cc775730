//! `LockRecord` and the per-runtime `LockTable`.

use std::collections::{HashMap, VecDeque};

use crate::worker::WorkerId;

use super::resource::ResourceId;

// ── Pending ───────────────────────────────────────────────────────────

/// A worker parked on a resource, either for the lock or for a signal.
///
/// `generation` is the worker's block-episode counter when it parked; the
/// runtime echoes it in the `Notify` task so a late wake-up cannot resume
/// a later episode. `hold` is the count the worker gets when it becomes
/// holder (1 for a plain `lock`, the remembered count after a `wait`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub worker: WorkerId,
    pub generation: u64,
    pub hold: u32,
}

// ── LockRecord ────────────────────────────────────────────────────────

/// Reentrant lock state plus the two FIFOs for one resource.
#[derive(Debug, Default, Clone)]
pub struct LockRecord {
    holder: Option<WorkerId>,
    hold_count: u32,
    requesters: VecDeque<Pending>,
    waiters: VecDeque<Pending>,
}

impl LockRecord {
    /// Current holder, if any.
    pub fn holder(&self) -> Option<WorkerId> {
        self.holder
    }

    /// Reentrancy depth of the current holder; zero when free.
    pub fn hold_count(&self) -> u32 {
        self.hold_count
    }

    /// Workers queued for the lock.
    pub fn lock_requester_count(&self) -> usize {
        self.requesters.len()
    }

    /// Workers parked in `wait`.
    pub fn wait_count(&self) -> usize {
        self.waiters.len()
    }

    /// Release ownership and pass it to the first requester, if any.
    fn hand_off(&mut self) -> Option<Pending> {
        self.holder = None;
        self.hold_count = 0;
        let next = self.requesters.pop_front()?;
        self.holder = Some(next.worker);
        self.hold_count = next.hold.max(1);
        Some(next)
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────

/// Result of an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The resource was free; the caller now holds it.
    Acquired,
    /// The caller already held it; the count is now the inner value.
    Reentered(u32),
    /// Another worker holds it.
    Contended,
}

/// Result of a single `unlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The caller did not hold the resource; nothing changed.
    NotHolder,
    /// The count dropped but is still positive.
    StillHeld(u32),
    /// The resource is now free and nobody was queued.
    Released,
    /// Ownership moved to this queued worker, which must be woken.
    HandedOff(Pending),
}

// ── LockInfo ──────────────────────────────────────────────────────────

/// Diagnostic snapshot of one lock record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LockInfo {
    pub resource: ResourceId,
    pub holder: Option<WorkerId>,
    pub hold_count: u32,
    pub lock_requesters: usize,
    pub waiters: usize,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.holder {
            Some(w) => write!(f, "{}: held by {} x{}", self.resource, w, self.hold_count)?,
            None => write!(f, "{}: free", self.resource)?,
        }
        write!(
            f,
            ", {} requester(s), {} waiter(s)",
            self.lock_requesters, self.waiters
        )
    }
}

// ── LockTable ─────────────────────────────────────────────────────────

/// Side table from resource to lock record.
#[derive(Debug, Default)]
pub struct LockTable {
    records: HashMap<ResourceId, LockRecord>,
}

impl LockTable {
    /// Create an empty table.
    pub fn new() -> Self {
        LockTable {
            records: HashMap::new(),
        }
    }

    fn entry(&mut self, resource: ResourceId) -> &mut LockRecord {
        self.records.entry(resource).or_default()
    }

    /// Inspect a record without creating it.
    pub fn record(&self, resource: ResourceId) -> Option<&LockRecord> {
        self.records.get(&resource)
    }

    /// Snapshot a record for diagnostics.
    pub fn info(&self, resource: ResourceId) -> Option<LockInfo> {
        self.records.get(&resource).map(|r| LockInfo {
            resource,
            holder: r.holder,
            hold_count: r.hold_count,
            lock_requesters: r.requesters.len(),
            waiters: r.waiters.len(),
        })
    }

    /// Try to take `resource` for `who` with `hold` counts.
    ///
    /// Never queues; on [`Acquire::Contended`] the caller decides whether
    /// to [`enqueue_requester`](Self::enqueue_requester).
    pub fn try_acquire(&mut self, resource: ResourceId, who: WorkerId, hold: u32) -> Acquire {
        let rec = self.entry(resource);
        match rec.holder {
            Some(h) if h == who => {
                rec.hold_count = rec.hold_count.saturating_add(hold.max(1));
                Acquire::Reentered(rec.hold_count)
            }
            Some(_) => Acquire::Contended,
            None => {
                rec.holder = Some(who);
                rec.hold_count = hold.max(1);
                Acquire::Acquired
            }
        }
    }

    /// Queue a worker for the lock (FIFO).
    pub fn enqueue_requester(&mut self, resource: ResourceId, pending: Pending) {
        self.entry(resource).requesters.push_back(pending);
    }

    /// Drop one hold count of `who` on `resource`.
    ///
    /// Unlocking a resource the caller does not hold is a no-op.
    pub fn release(&mut self, resource: ResourceId, who: WorkerId) -> Release {
        let Some(rec) = self.records.get_mut(&resource) else {
            return Release::NotHolder;
        };
        if rec.holder != Some(who) {
            return Release::NotHolder;
        }
        rec.hold_count = rec.hold_count.saturating_sub(1);
        if rec.hold_count > 0 {
            return Release::StillHeld(rec.hold_count);
        }
        match rec.hand_off() {
            Some(next) => Release::HandedOff(next),
            None => Release::Released,
        }
    }

    /// Drop every hold count of `who` on `resource` at once.
    ///
    /// Returns the count that was held (zero if `who` was not the holder)
    /// and the worker ownership passed to, if any.
    pub fn release_fully(&mut self, resource: ResourceId, who: WorkerId) -> (u32, Option<Pending>) {
        let Some(rec) = self.records.get_mut(&resource) else {
            return (0, None);
        };
        if rec.holder != Some(who) {
            return (0, None);
        }
        let held = rec.hold_count;
        (held, rec.hand_off())
    }

    /// Park a worker on the resource's condition (FIFO).
    pub fn enqueue_waiter(&mut self, resource: ResourceId, pending: Pending) {
        self.entry(resource).waiters.push_back(pending);
    }

    /// Take the longest-waiting worker.
    pub fn pop_waiter(&mut self, resource: ResourceId) -> Option<Pending> {
        self.records.get_mut(&resource)?.waiters.pop_front()
    }

    /// Take every waiting worker, oldest first.
    pub fn drain_waiters(&mut self, resource: ResourceId) -> Vec<Pending> {
        match self.records.get_mut(&resource) {
            Some(rec) => rec.waiters.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Forget `who` everywhere: release what it holds and remove it from
    /// every queue. Returns the hand-offs that must be woken.
    pub fn release_all(&mut self, who: WorkerId) -> Vec<Pending> {
        let mut woken = Vec::new();
        for rec in self.records.values_mut() {
            rec.requesters.retain(|p| p.worker != who);
            rec.waiters.retain(|p| p.worker != who);
            if rec.holder == Some(who) {
                if let Some(next) = rec.hand_off() {
                    woken.push(next);
                }
            }
        }
        woken
    }

    /// Resources currently held by `who`, sorted.
    pub fn held_by(&self, who: WorkerId) -> Vec<ResourceId> {
        let mut held: Vec<ResourceId> = self
            .records
            .iter()
            .filter(|(_, r)| r.holder == Some(who))
            .map(|(id, _)| *id)
            .collect();
        held.sort();
        held
    }

    /// Number of records created so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no record exists.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
