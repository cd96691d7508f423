//! Run progress reporting.
//!
//! Overall progress is `floor(completed / total * 100 + step / total)`
//! where `step` is the percentage the running step reported for itself.
//! Values are only emitted when they grow, so a listener never sees the
//! same percentage twice in a row.

use std::fmt;
use std::sync::Arc;

/// Listener receiving overall run percentages.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Tracks progress over a fixed number of steps.
pub struct Progress {
    total: usize,
    completed: usize,
    last: Option<u8>,
    callback: Option<ProgressCallback>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("completed", &self.completed)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Creates a tracker over `total` steps.
    #[must_use]
    pub fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            completed: 0,
            last: None,
            callback,
        }
    }

    /// Overall percentage for a position in the run.
    #[must_use]
    pub fn percentage(completed: usize, total: usize, step_percentage: u8) -> u8 {
        if total == 0 {
            return 100;
        }
        let value = (completed * 100 + usize::from(step_percentage.min(100))) / total;
        u8::try_from(value.min(100)).unwrap_or(100)
    }

    /// Emits the starting value.
    pub fn start(&mut self) {
        self.emit(Self::percentage(0, self.total, 0));
    }

    /// Records how far the running step has come.
    pub fn step(&mut self, step_percentage: u8) {
        self.emit(Self::percentage(self.completed, self.total, step_percentage));
    }

    /// Marks the running step as done.
    pub fn complete_step(&mut self) {
        self.completed = (self.completed + 1).min(self.total);
        self.emit(Self::percentage(self.completed, self.total, 0));
    }

    /// Last emitted value.
    #[must_use]
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    fn emit(&mut self, value: u8) {
        if self.last.is_some_and(|last| value <= last) {
            return;
        }
        self.last = Some(value);
        tracing::debug!(percent = value, "Progress");
        if let Some(ref callback) = self.callback {
            callback(value);
        }
    }
}
