//! Deadline/budget controller (spec §4.8).
//!
//! Grounded on the teacher's `ScopedZeroKmsCipher`/config-cloning pattern
//! of carrying a narrowed, context-scoped handle through the executors
//! rather than threading a raw deadline value through every call site:
//! here a [`Deadline`] plays that role, attached to a [`Ctx`] that every
//! public operation takes.

use crate::error::DeadlineError;
use std::time::{Duration, Instant};

/// Per-operation-kind safety buffer: the smallest `remaining` at which an
/// operation still proceeds. Executor work gets a tighter buffer than the
/// cross-platform scheduling buffer used for the final wire call.
pub const DEFAULT_EXECUTOR_BUFFER: Duration = Duration::from_millis(100);
pub const DEFAULT_SCHEDULING_BUFFER: Duration = Duration::from_millis(500);

/// A deadline anchored to an [`Instant`], so it is immune to wall-clock
/// adjustments during a single operation's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    buffer: Duration,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None, buffer: DEFAULT_EXECUTOR_BUFFER }
    }

    pub fn after(duration: Duration) -> Self {
        Self {
            at: Some(Instant::now() + duration),
            buffer: DEFAULT_EXECUTOR_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// Time remaining until the deadline, or `None` if there is none.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Milliseconds remaining, `-1` when there is no deadline — the shape
    /// spec §4.8 calls `GetRemainingTimeMillis`.
    pub fn remaining_millis(&self) -> i64 {
        match self.remaining() {
            Some(d) => d.as_millis() as i64,
            None => -1,
        }
    }

    /// Called before every wire call and before every retry iteration.
    /// Aborts with `deadline_imminent` once the remaining budget drops
    /// below this deadline's buffer.
    pub fn check(&self) -> Result<(), DeadlineError> {
        match self.remaining() {
            None => Ok(()),
            Some(remaining) if remaining.is_zero() => Err(DeadlineError::Exceeded),
            Some(remaining) if remaining < self.buffer => Err(DeadlineError::Imminent),
            Some(_) => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// Ambient context every public operation accepts: the deadline plus
/// whatever else should flow downward without being an explicit argument
/// at every call site. A context-decorated clone of the library instance
/// (spec §4.8) is produced by [`Ctx::with_deadline`]; it copies its caches
/// for read access rather than sharing mutable state with the original.
#[derive(Debug, Clone, Default)]
pub struct Ctx {
    pub deadline: Deadline,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Deadline) -> Self {
        Self { deadline }
    }

    pub fn check_deadline(&self) -> Result<(), DeadlineError> {
        self.deadline.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_never_aborts() {
        assert!(Deadline::none().check().is_ok());
        assert_eq!(Deadline::none().remaining_millis(), -1);
    }

    #[test]
    fn imminent_deadline_aborts() {
        let d = Deadline::after(Duration::from_millis(10)).with_buffer(Duration::from_millis(50));
        assert!(matches!(d.check(), Err(DeadlineError::Imminent)));
    }

    #[test]
    fn ample_deadline_passes() {
        let d = Deadline::after(Duration::from_secs(10)).with_buffer(Duration::from_millis(100));
        assert!(d.check().is_ok());
    }
}
