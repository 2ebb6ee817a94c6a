//! Shared backoff policy for unprocessed-item retries (spec §4.4.6/§4.4.7)
//! and the transaction builder's fixed retry schedule (spec §4.5).
//!
//! Grounded on the teacher's `crypto/envelope.rs` use of `rand::rngs::OsRng`
//! for anything that needs unpredictability — jitter draws from the same
//! cryptographic source rather than a fast PRNG, per the spec's explicit
//! requirement.

use crate::deadline::Ctx;
use crate::error::DeadlineError;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, used by the batch orchestrator (C11)
/// while a chunk still has unprocessed keys or items.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Jitter is drawn uniformly from `[-jitter_fraction, +jitter_fraction]`
    /// and multiplied onto the computed delay.
    pub jitter_fraction: f64,
    pub max_retries: usize,
}

impl BackoffPolicy {
    pub const fn new(
        initial: Duration,
        factor: f64,
        max_delay: Duration,
        jitter_fraction: f64,
        max_retries: usize,
    ) -> Self {
        Self { initial, factor, max_delay, jitter_fraction, max_retries }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial.as_secs_f64() * self.factor.powi(attempt as i32);
        let base = base.min(self.max_delay.as_secs_f64());
        let jitter = rand::rngs::OsRng.gen_range(-self.jitter_fraction..=self.jitter_fraction);
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }

    /// Sleep before retry attempt `attempt` (0-based), clamped to whatever
    /// remains on the deadline and failing fast if nothing does.
    pub async fn sleep(&self, ctx: &Ctx, attempt: u32) -> Result<(), DeadlineError> {
        ctx.check_deadline()?;
        let delay = match ctx.deadline.remaining() {
            Some(remaining) => self.delay_for(attempt).min(remaining),
            None => self.delay_for(attempt),
        };
        tokio::time::sleep(delay).await;
        ctx.check_deadline()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            factor: 2.0,
            max_delay: Duration::from_secs(5),
            jitter_fraction: 0.1,
            max_retries: 8,
        }
    }
}

/// Fixed retry schedule for cancelled transactions (spec §4.5):
/// `{100, 200, 400, 800}` ms, stopping at schedule exhaustion or deadline.
#[derive(Debug, Clone)]
pub struct FixedSchedule {
    delays: Vec<Duration>,
}

impl FixedSchedule {
    pub fn transaction_default() -> Self {
        Self {
            delays: vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ],
        }
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }

    /// Sleep before retry attempt `attempt` (0-based). `attempt` beyond the
    /// schedule's length is a caller bug; it is treated as schedule
    /// exhaustion rather than panicking.
    pub async fn sleep(&self, ctx: &Ctx, attempt: usize) -> Result<(), DeadlineError> {
        ctx.check_deadline()?;
        let Some(&delay) = self.delays.get(attempt) else {
            return Ok(());
        };
        let delay = match ctx.deadline.remaining() {
            Some(remaining) => delay.min(remaining),
            None => delay,
        };
        tokio::time::sleep(delay).await;
        ctx.check_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_respects_cap() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(50),
            2.0,
            Duration::from_millis(200),
            0.0,
            5,
        );
        assert_eq!(policy.delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(10), Duration::from_millis(200));
    }

    #[test]
    fn transaction_schedule_has_four_steps() {
        let schedule = FixedSchedule::transaction_default();
        assert_eq!(schedule.max_retries(), 4);
    }

    #[tokio::test]
    async fn sleep_fails_fast_past_deadline() {
        let ctx = Ctx::with_deadline(crate::deadline::Deadline::after(Duration::from_millis(0)));
        let policy = BackoffPolicy::default();
        let err = policy.sleep(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, DeadlineError::Exceeded | DeadlineError::Imminent));
    }
}
