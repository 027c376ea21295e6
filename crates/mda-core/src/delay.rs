//! Per-probe send-delay generator (spec §4.E "delay model"): spaces
//! outbound probes so a burst doesn't trip rate limiting on the path,
//! with optional jitter so probes for the same flow don't all land on
//! the same millisecond.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct DelayModel {
    pub base: Duration,
    pub jitter: Duration,
}

impl DelayModel {
    #[must_use]
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// Draws the next inter-probe delay: `base` plus a uniform random
    /// offset in `[0, jitter]`.
    pub fn next_delay(&self, rng: &mut impl Rng) -> Duration {
        if self.jitter.is_zero() {
            return self.base;
        }
        let jitter_ns = rng.gen_range(0..=self.jitter.as_nanos() as u64);
        self.base + Duration::from_nanos(jitter_ns)
    }
}

impl Default for DelayModel {
    fn default() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}
