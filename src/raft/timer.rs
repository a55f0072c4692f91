use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of randomized delays (startup delay, join and election backoff).
///
/// Seeded from configuration when a seed is given so that tests can replay
/// the same sequence of delays.
#[derive(Debug)]
pub struct RandomDelay {
    rng: StdRng,
}

impl RandomDelay {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Random duration within `[min_ms, max_ms]`.
    pub fn between(&mut self, min_ms: u64, max_ms: u64) -> Duration {
        if max_ms <= min_ms {
            return Duration::from_millis(min_ms);
        }
        Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
    }

    pub fn up_to(&mut self, max_ms: u64) -> Duration {
        self.between(0, max_ms)
    }
}
