//! Outer limits applied to every loop of a plan run.

use std::time::{Duration, Instant};

/// Caps applied through the external continuation predicate.
///
/// `max_iterations` bounds every loop in the step tree independently, since the
/// predicate sees each loop's own iteration index. `deadline` stops all loops at
/// their next iteration boundary once it has passed; running networks are never
/// interrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    pub max_iterations: Option<u64>,
    pub deadline: Option<Instant>,
}

impl RunLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Set the deadline to `timeout` from now. A timeout too large to
    /// represent as an instant leaves the run without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn should_continue(&self, iteration: u64) -> bool {
        if self.max_iterations.is_some_and(|max| iteration >= max) {
            return false;
        }
        !self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
