//! Clock abstraction for the `created_at`/`updated_at` role-field lifecycle
//! (spec §4.4.3 and the PutItem example in §8). Not present in the
//! teacher, which has no time-stamped role fields; added so the lifecycle
//! rule is testable against a frozen instant rather than real wall time,
//! the same reason the teacher injects a `Credentials` implementation
//! rather than calling out to an ambient global.

use chrono::{SecondsFormat, Utc};

pub trait Clock: Send + Sync {
    /// RFC3339 timestamp with nanosecond precision, e.g.
    /// `2026-01-16T00:00:00.000000000Z`.
    fn now_rfc3339(&self) -> String;

    fn now_epoch_seconds(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn now_epoch_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A clock frozen at a fixed instant, for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    rfc3339: String,
    epoch_seconds: i64,
}

impl FixedClock {
    pub fn new(rfc3339: impl Into<String>, epoch_seconds: i64) -> Self {
        Self { rfc3339: rfc3339.into(), epoch_seconds }
    }
}

impl Clock for FixedClock {
    fn now_rfc3339(&self) -> String {
        self.rfc3339.clone()
    }

    fn now_epoch_seconds(&self) -> i64 {
        self.epoch_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock::new("2026-01-16T00:00:00.000000000Z", 1768521600);
        assert_eq!(clock.now_rfc3339(), "2026-01-16T00:00:00.000000000Z");
        assert_eq!(clock.now_epoch_seconds(), 1768521600);
    }
}
