use tinyrand::{Rand, RandRange, Seeded, StdRand};
use tinyrand_std::ClockSeed;

pub mod env;
pub mod humanize;
pub mod munge;
pub mod telemetry;

/// Picks an index in `0..max` (`max` must be nonzero).
pub fn random_index(max: u64) -> u64 {
    let seed = ClockSeed::default().next_u64();
    let mut rng = StdRand::seed(seed);

    rng.next_range(0..max)
}
