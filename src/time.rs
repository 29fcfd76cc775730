/// Simulated time for the discrete-event kernel.
///
/// Represents a logical timestamp with no dependency on `std::time`.
/// Time advances only when the scheduler performs a time jump, never
/// from wall-clock observation.

use std::cmp::Ordering;

/// A point on the logical clock.
///
/// Wraps a finite `f64`. Ordering is total (via `f64::total_cmp`) so the
/// type can key ordered maps; constructors reject NaN and infinities so
/// the total order agrees with the numeric one.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(f64);

impl SimTime {
    /// The zero-point of simulation time.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a `SimTime` from a raw value.
    ///
    /// Returns `None` for NaN or infinite input.
    #[inline]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() {
            // Normalise -0.0 so that equal times compare equal.
            Some(SimTime(value + 0.0))
        } else {
            None
        }
    }

    /// Wrap a key already known to be finite (queue internals).
    #[inline]
    pub(crate) fn from_key(key: f64) -> Self {
        SimTime(key + 0.0)
    }

    /// Return the raw value.
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Compute the time that is `delay` after `self`.
    ///
    /// Returns `None` for a negative or non-finite delay, or if the sum
    /// overflows to infinity.
    #[inline]
    pub fn plus(self, delay: f64) -> Option<SimTime> {
        if !delay.is_finite() || delay < 0.0 {
            return None;
        }
        SimTime::new(self.0 + delay)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: SimTime) -> bool {
        self < other
    }

    /// Later of two times.
    #[inline]
    pub fn max(self, other: SimTime) -> SimTime {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for SimTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl Default for SimTime {
    fn default() -> Self {
        SimTime::ZERO
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}
