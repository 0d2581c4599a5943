//! # timer
//!
//! why: drive elections and heartbeats from discrete ticks instead of wall time
//! relations: owned by node.rs (election and heartbeat countdowns)
//! what: Countdown with fixed and jittered re-arming

use rand::Rng;
use serde::{Deserialize, Serialize};

/// An integer countdown measured in ticks.
///
/// A countdown at zero is expired. Setting it to zero is how a node asks for
/// its timer action to run in the current tick's timer phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    remaining: u64,
}

impl Countdown {
    pub fn new(ticks: u64) -> Self {
        Self { remaining: ticks }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn set(&mut self, ticks: u64) {
        self.remaining = ticks;
    }

    /// Re-arm with a value drawn uniformly from `[min, max)`.
    pub fn arm_jittered<R: Rng + ?Sized>(&mut self, rng: &mut R, min: u64, max: u64) {
        self.remaining = if max > min { rng.gen_range(min..max) } else { min };
    }

    /// Count down one tick. Returns true if the countdown is expired
    /// afterwards (including when it was already at zero).
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ticks_down_to_expiry() {
        let mut timer = Countdown::new(2);
        assert!(!timer.tick());
        assert!(timer.tick());
        assert!(timer.is_expired());
    }

    #[test]
    fn zero_fires_on_next_tick() {
        let mut timer = Countdown::new(5);
        timer.set(0);
        assert!(timer.tick());
    }

    #[test]
    fn jitter_stays_in_range_and_is_seeded() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let mut ta = Countdown::default();
        let mut tb = Countdown::default();
        for _ in 0..100 {
            ta.arm_jittered(&mut a, 10, 20);
            tb.arm_jittered(&mut b, 10, 20);
            assert!((10..20).contains(&ta.remaining()));
            assert_eq!(ta, tb);
        }
    }

    #[test]
    fn degenerate_range_uses_min() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut timer = Countdown::default();
        timer.arm_jittered(&mut rng, 12, 12);
        assert_eq!(timer.remaining(), 12);
    }
}
