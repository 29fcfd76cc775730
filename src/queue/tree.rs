/// Ordered-map event queue.
///
/// A `BTreeMap` from time key to a FIFO chain of same-time values.
/// Insert and remove are O(log n); ordering is exact and no resampling
/// ever happens, which is why the scheduler uses it for the waiting
/// queue by default.

use std::collections::{BTreeMap, VecDeque};

use super::{EventQueue, QueueBackend};
use crate::time::SimTime;

/// Balanced-tree backend for [`EventQueue`].
#[derive(Debug, Clone)]
pub struct TreeQueue<T> {
    /// Same-key entries chain in insertion order.
    chains: BTreeMap<SimTime, VecDeque<T>>,

    /// Total number of entries across all chains.
    len: usize,
}

impl<T> TreeQueue<T> {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        TreeQueue {
            chains: BTreeMap::new(),
            len: 0,
        }
    }

    /// Number of distinct keys currently stored.
    pub fn distinct_keys(&self) -> usize {
        self.chains.len()
    }
}

impl<T> Default for TreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> EventQueue<T> for TreeQueue<T> {
    fn enqueue(&mut self, key: f64, value: T) {
        debug_assert!(key.is_finite(), "non-finite queue key {}", key);
        self.chains
            .entry(SimTime::from_key(key))
            .or_default()
            .push_back(value);
        self.len += 1;
    }

    fn dequeue_min(&mut self) -> Option<(f64, T)> {
        let mut first = self.chains.first_entry()?;
        let key = first.key().value();
        let value = first.get_mut().pop_front();
        if first.get().is_empty() {
            first.remove();
        }
        let value = value?;
        self.len -= 1;
        Some((key, value))
    }

    fn peek_min_key(&self) -> Option<f64> {
        self.chains.keys().next().map(|k| k.value())
    }

    fn remove(&mut self, key: f64, matches: &mut dyn FnMut(&T) -> bool) -> Option<T> {
        let slot = SimTime::from_key(key);
        let chain = self.chains.get_mut(&slot)?;
        let pos = chain.iter().position(|v| matches(v))?;
        let value = chain.remove(pos)?;
        if chain.is_empty() {
            self.chains.remove(&slot);
        }
        self.len -= 1;
        Some(value)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.chains.clear();
        self.len = 0;
    }

    fn backend(&self) -> QueueBackend {
        QueueBackend::Tree
    }

    /// Whole-chain transfer: the earliest key's chain is already in FIFO
    /// order, so it moves out in one map operation.
    fn drain_min(&mut self) -> Vec<(f64, T)> {
        match self.chains.pop_first() {
            Some((key, chain)) => {
                self.len -= chain.len();
                let key = key.value();
                chain.into_iter().map(|v| (key, v)).collect()
            }
            None => Vec::new(),
        }
    }
}
