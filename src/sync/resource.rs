//! Resource ID — names one lockable resource.

/// Identifies a shared resource guarded by the kernel's lock subsystem.
///
/// Collaborators pick ids however they like (an object index, a hash of
/// a name, a port number). Two calls naming the same id contend for the
/// same lock and the same wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create a resource ID from a raw integer.
    #[inline]
    pub const fn new(id: u64) -> Self {
        ResourceId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        ResourceId(id)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}
