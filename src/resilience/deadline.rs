//! End-to-end deadline shared by a chain of nested calls.
//!
//! The budget is consumed by the passage of time only; there is nothing to
//! record, so one instance can be copied into every concurrent sub-call.

use std::time::Duration;
use tokio::time::Instant;

/// A fixed deadline. Never moves once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineBudget {
    deadline_at: Instant,
}

impl DeadlineBudget {
    /// A budget of `total` starting now.
    pub fn new(total: Duration) -> Self {
        Self {
            deadline_at: Instant::now() + total,
        }
    }

    /// A budget ending at `deadline_at`.
    pub fn until(deadline_at: Instant) -> Self {
        Self { deadline_at }
    }

    pub fn deadline_at(&self) -> Instant {
        self.deadline_at
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline_at.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The lesser of `requested` and the remaining budget.
    ///
    /// Zero means the call must be abandoned, not attempted with a zero
    /// timeout.
    pub fn ms_for(&self, requested: Duration) -> Duration {
        requested.min(self.remaining())
    }
}
