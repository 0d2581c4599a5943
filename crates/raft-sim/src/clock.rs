//! # clock
//!
//! why: give the simulation one discrete notion of time
//! relations: advanced by engine.rs once per step, reported in snapshots

/// Monotonic tick counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    tick: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.tick
    }

    /// Move to the next tick and return it
    pub fn advance(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_and_advances() {
        let mut clock = Clock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.now(), 2);
    }
}
