//! Runtime life-cycle state.

/// Where the runtime is in its life cycle.
///
/// ```text
/// Inactive ──submit──▶ Running ──stop──▶ Suspending ──baton freed──▶ Suspended
///    ▲                   │   ▲                                          │
///    └──queues empty─────┘   └──────────────resume──────────────────────┘
///
/// any ──reset──▶ Resetting ──workers drained──▶ Inactive
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RuntimeState {
    /// Nothing due and no worker holds the baton.
    Inactive,
    /// Dispatching tasks.
    Running,
    /// A stop was requested; the baton holder has not yet let go.
    Suspending,
    /// Stopped with no baton holder. Submissions are staged, not run.
    Suspended,
    /// Cancelling and draining workers.
    Resetting,
}

impl RuntimeState {
    /// No worker will pick up new work in this state without an explicit
    /// `resume` or submission.
    pub fn is_quiet(self) -> bool {
        matches!(self, RuntimeState::Inactive | RuntimeState::Suspended)
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        RuntimeState::Inactive
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeState::Inactive => "Inactive",
            RuntimeState::Running => "Running",
            RuntimeState::Suspending => "Suspending",
            RuntimeState::Suspended => "Suspended",
            RuntimeState::Resetting => "Resetting",
        };
        f.write_str(s)
    }
}
