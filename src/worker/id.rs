//! Worker ID — a lightweight, ordered, copyable worker identifier.

/// Identifies one pooled worker.
///
/// Ids are assigned in creation order and never reused until the
/// runtime is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerId(u64);

impl WorkerId {
    /// Create a worker ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        WorkerId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "W{}", self.0)
    }
}
