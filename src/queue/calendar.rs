//! Adaptive calendar queue.
//!
//! Keys are mapped to buckets by `floor(key / width) & mask`; the number
//! `floor(key / width)` is the entry's *absolute bucket*. Each bucket is a
//! key-sorted chain, stable for equal keys.
//!
//! A cursor holds an absolute bucket number with the invariant that no
//! stored entry has a smaller absolute bucket. Dequeue walks forward from
//! the cursor for at most one "year" (one pass over all buckets),
//! stopping at the first bucket whose head belongs to the absolute bucket
//! being visited. If a whole year is empty of due entries the queue falls
//! back to a direct scan of every bucket head and resynchronises the
//! cursor.
//!
//! The bucket count doubles when the queue holds more than twice as many
//! entries as buckets and halves when it drops below half minus two. On
//! each resize the bucket width is re-estimated from the spacing of the
//! earliest entries.
//!
//! Ordering is exact for any width; the width only affects speed.

use std::collections::VecDeque;

use tracing::debug;

use super::{EventQueue, QueueBackend};

/// Fewest buckets the queue will shrink to.
const MIN_BUCKETS: usize = 2;

/// How many of the earliest entries feed the width estimate.
const SAMPLE_LIMIT: usize = 25;

/// Lower bound on bucket width.
const MIN_WIDTH: f64 = 1e-12;

/// Upper bound on `|key| / width`, keeping absolute bucket numbers exact
/// in both `f64` and `i64`.
const INDEX_LIMIT: f64 = 4_503_599_627_370_496.0; // 2^52

/// Width used when the sample is too small or degenerate.
const FALLBACK_WIDTH: f64 = 1.0;

struct Entry<T> {
    key: f64,
    value: T,
}

/// Calendar-queue backend for [`EventQueue`].
pub struct CalendarQueue<T> {
    buckets: Vec<VecDeque<Entry<T>>>,
    /// `buckets.len() - 1`; bucket count is always a power of two.
    mask: usize,
    width: f64,
    /// Absolute bucket number no stored entry precedes.
    cursor: i64,
    len: usize,
    /// Largest key magnitude ever enqueued.
    max_magnitude: f64,
    resizes: u64,
}

impl<T> CalendarQueue<T> {
    /// Create an empty queue with two buckets of width 1.0.
    pub fn new() -> Self {
        Self::with_layout(MIN_BUCKETS, FALLBACK_WIDTH)
    }

    /// Create an empty queue with an explicit layout.
    ///
    /// `buckets` is rounded up to a power of two (at least 2); `width` is
    /// clamped to the numeric floor.
    pub fn with_layout(buckets: usize, width: f64) -> Self {
        let count = buckets.max(MIN_BUCKETS).next_power_of_two();
        let width = if width.is_finite() && width > MIN_WIDTH {
            width
        } else {
            MIN_WIDTH
        };
        CalendarQueue {
            buckets: (0..count).map(|_| VecDeque::new()).collect(),
            mask: count - 1,
            width,
            cursor: 0,
            len: 0,
            max_magnitude: 0.0,
            resizes: 0,
        }
    }

    /// Current bucket width.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Current number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// How many times the queue has been rebuilt.
    pub fn resize_count(&self) -> u64 {
        self.resizes
    }

    #[inline]
    fn absolute_bucket(&self, key: f64) -> i64 {
        (key / self.width).floor() as i64
    }

    #[inline]
    fn slot(&self, absolute: i64) -> usize {
        (absolute as u64 as usize) & self.mask
    }

    /// Insert into the right chain, after any entries with an equal key.
    fn insert_entry(&mut self, entry: Entry<T>) {
        let absolute = self.absolute_bucket(entry.key);
        let slot = self.slot(absolute);
        let chain = &mut self.buckets[slot];
        // Typical simulation keys arrive in increasing order, so search
        // from the back.
        let pos = chain
            .iter()
            .rposition(|e| e.key <= entry.key)
            .map_or(0, |p| p + 1);
        chain.insert(pos, entry);
        if self.len == 0 || absolute < self.cursor {
            self.cursor = absolute;
        }
        self.len += 1;
    }

    /// Find the bucket holding the minimum entry and its absolute bucket.
    fn locate_min(&self) -> Option<(usize, i64)> {
        if self.len == 0 {
            return None;
        }

        let mut absolute = self.cursor;
        for _ in 0..self.buckets.len() {
            let slot = self.slot(absolute);
            if let Some(head) = self.buckets[slot].front() {
                if self.absolute_bucket(head.key) <= absolute {
                    return Some((slot, absolute));
                }
            }
            absolute += 1;
        }

        // A whole year with nothing due: the next entry is far ahead of
        // the cursor. Scan every head directly.
        let (slot, head) = self
            .buckets
            .iter()
            .enumerate()
            .filter_map(|(i, chain)| chain.front().map(|e| (i, e)))
            .min_by(|a, b| a.1.key.total_cmp(&b.1.key))?;
        Some((slot, self.absolute_bucket(head.key)))
    }

    /// Take every entry out, sorted by key (stable for equal keys).
    fn take_sorted(&mut self) -> Vec<Entry<T>> {
        let mut entries: Vec<Entry<T>> = Vec::with_capacity(self.len);
        for chain in &mut self.buckets {
            entries.extend(chain.drain(..));
        }
        // Equal keys live in one chain in FIFO order, so a stable sort
        // keeps them in insertion order.
        entries.sort_by(|a, b| a.key.total_cmp(&b.key));
        self.len = 0;
        entries
    }

    /// Rebuild with `count` buckets of (at least) `width`.
    fn rebuild(&mut self, count: usize, width: f64, entries: Vec<Entry<T>>) {
        let count = count.max(MIN_BUCKETS).next_power_of_two();
        let width = width
            .max(MIN_WIDTH)
            .max(self.max_magnitude / (INDEX_LIMIT / 2.0));

        self.buckets = (0..count).map(|_| VecDeque::new()).collect();
        self.mask = count - 1;
        self.width = width;
        self.cursor = 0;
        self.len = 0;
        for entry in entries {
            // Sorted input: every insert appends to its chain.
            self.insert_entry(entry);
        }
        self.resizes += 1;
    }

    fn resize(&mut self, count: usize) {
        let entries = self.take_sorted();
        let width = estimate_width(&entries);
        debug!(
            from = self.buckets.len(),
            to = count,
            width,
            entries = entries.len(),
            "calendar queue resize"
        );
        self.rebuild(count, width, entries);
    }

    /// Recompute the width if `key` would push bucket numbers out of the
    /// exact integer range.
    fn guard_index_range(&mut self, key: f64) {
        let magnitude = key.abs();
        if magnitude <= self.max_magnitude {
            return;
        }
        self.max_magnitude = magnitude;
        if magnitude / self.width >= INDEX_LIMIT / 2.0 {
            let entries = self.take_sorted();
            let count = self.buckets.len();
            let width = self.width;
            self.rebuild(count, width, entries);
        }
    }
}

impl<T> Default for CalendarQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> EventQueue<T> for CalendarQueue<T> {
    fn enqueue(&mut self, key: f64, value: T) {
        debug_assert!(key.is_finite(), "non-finite queue key {}", key);
        self.guard_index_range(key);
        self.insert_entry(Entry { key, value });
        if self.len > 2 * self.buckets.len() {
            self.resize(2 * self.buckets.len());
        }
    }

    fn dequeue_min(&mut self) -> Option<(f64, T)> {
        let (slot, absolute) = self.locate_min()?;
        let entry = self.buckets[slot].pop_front()?;
        self.cursor = absolute;
        self.len -= 1;

        let count = self.buckets.len();
        if count > MIN_BUCKETS && self.len + 2 < count / 2 {
            self.resize(count / 2);
        }
        Some((entry.key, entry.value))
    }

    fn peek_min_key(&self) -> Option<f64> {
        let (slot, _) = self.locate_min()?;
        self.buckets[slot].front().map(|e| e.key)
    }

    fn remove(&mut self, key: f64, matches: &mut dyn FnMut(&T) -> bool) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let slot = self.slot(self.absolute_bucket(key));
        let chain = &mut self.buckets[slot];
        let pos = chain
            .iter()
            .position(|e| e.key == key && matches(&e.value))?;
        let entry = chain.remove(pos)?;
        self.len -= 1;
        Some(entry.value)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.len = 0;
        self.cursor = 0;
    }

    fn backend(&self) -> QueueBackend {
        QueueBackend::Calendar
    }
}

/// Estimate a bucket width from the earliest (sorted) entries.
///
/// Mean gap over the sample, then the mean again over the gaps smaller
/// than twice that, times three. Falls back to `1.0` when the sample has
/// fewer than two entries or no spread.
fn estimate_width<T>(sorted: &[Entry<T>]) -> f64 {
    let sample = &sorted[..sorted.len().min(SAMPLE_LIMIT)];
    if sample.len() < 2 {
        return FALLBACK_WIDTH;
    }

    let gaps: Vec<f64> = sample.windows(2).map(|w| w[1].key - w[0].key).collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if !(mean > 0.0) {
        return FALLBACK_WIDTH;
    }

    let (sum, n) = gaps
        .iter()
        .filter(|g| **g < 2.0 * mean)
        .fold((0.0, 0usize), |(s, n), g| (s + g, n + 1));
    let separation = if n > 0 { sum / n as f64 } else { mean };
    if separation > 0.0 {
        3.0 * separation
    } else {
        // Mostly ties with a few large jumps.
        3.0 * mean
    }
}
