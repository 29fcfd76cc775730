//! Time-ordered event queues.
//!
//! Both backends implement [`EventQueue`]: entries are keyed by a finite
//! `f64` time and come out in non-decreasing key order, FIFO among equal
//! keys.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`tree`] | [`TreeQueue`]: ordered map of same-key chains, O(log n) |
//! | [`calendar`] | [`CalendarQueue`]: adaptive bucket queue, amortized O(1) |

pub mod calendar;
pub mod tree;

pub use calendar::CalendarQueue;
pub use tree::TreeQueue;

/// Ordered container from time key to value.
///
/// Keys must be finite. Among equal keys, values are returned in
/// insertion order.
pub trait EventQueue<T>: Send {
    /// Insert `value` at `key`.
    fn enqueue(&mut self, key: f64, value: T);

    /// Remove and return the entry with the smallest key.
    fn dequeue_min(&mut self) -> Option<(f64, T)>;

    /// Smallest key currently stored, if any.
    fn peek_min_key(&self) -> Option<f64>;

    /// Remove the first entry at `key` whose value satisfies `matches`.
    fn remove(&mut self, key: f64, matches: &mut dyn FnMut(&T) -> bool) -> Option<T>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Drop every entry.
    fn clear(&mut self);

    /// Short backend name for diagnostics.
    fn backend(&self) -> QueueBackend;

    /// Returns `true` if the queue holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry sharing the smallest key, in insertion order.
    fn drain_min(&mut self) -> Vec<(f64, T)> {
        let mut out = Vec::new();
        let Some(min) = self.peek_min_key() else {
            return out;
        };
        while self.peek_min_key() == Some(min) {
            match self.dequeue_min() {
                Some(entry) => out.push(entry),
                None => break,
            }
        }
        out
    }
}

/// Selects the implementation behind a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueBackend {
    /// Balanced ordered map.
    #[default]
    Tree,
    /// Adaptive calendar queue.
    Calendar,
}

impl QueueBackend {
    /// Build an empty queue of this kind.
    pub fn build<T: Send + 'static>(self) -> Box<dyn EventQueue<T>> {
        match self {
            QueueBackend::Tree => Box::new(TreeQueue::new()),
            QueueBackend::Calendar => Box::new(CalendarQueue::new()),
        }
    }
}

impl std::fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueBackend::Tree => write!(f, "tree"),
            QueueBackend::Calendar => write!(f, "calendar"),
        }
    }
}

impl std::str::FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tree" => Ok(QueueBackend::Tree),
            "calendar" => Ok(QueueBackend::Calendar),
            other => Err(format!("unknown queue backend '{}'", other)),
        }
    }
}
