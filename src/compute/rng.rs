//! Seedable random source shared by every stochastic operation.

use rand::prelude::*;
use rand_distr::Uniform;

use crate::schema::MutationRates;

/// Random number generator wrapper for evolutionary operations.
///
/// A population owns exactly one of these. Replaying the same seed with the
/// same externally supplied fitness values reproduces the same trajectory.
#[derive(Debug, Clone)]
pub struct NeatRng {
    rng: StdRng,
}

impl NeatRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    /// True with probability `p`. Always consumes one draw; `p > 1` is certain.
    pub fn chance(&mut self, p: f64) -> bool {
        self.unit() < p
    }

    /// Fair coin flip.
    pub fn coin(&mut self) -> bool {
        self.chance(0.5)
    }

    /// Uniform index in `[0, n)`. `n` must be non-zero.
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Uniform integer in `[low, high)`.
    pub fn range(&mut self, low: usize, high: usize) -> usize {
        self.rng.gen_range(low..high)
    }

    /// Fresh connection weight in `[-bound, bound]`.
    pub fn weight(&mut self, bound: f64) -> f64 {
        Uniform::new_inclusive(-bound, bound).sample(&mut self.rng)
    }

    /// Random sign times a unit draw, in `(-1, 1)`.
    pub fn signed_unit(&mut self) -> f64 {
        let magnitude = self.unit();
        if self.coin() { -magnitude } else { magnitude }
    }

    /// Self-adaptation step: scale every rate up or down by about 5%.
    pub fn jitter_rates(&mut self, rates: &mut MutationRates) {
        for rate in rates.values_mut() {
            *rate *= if self.coin() {
                MutationRates::DECAY
            } else {
                MutationRates::GROWTH
            };
        }
    }
}
