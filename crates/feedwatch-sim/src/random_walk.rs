//! Seeded random walk for the simulated true price.
//!
//! Each tick the true price is multiplied by `exp((u - 0.5) * drift)` with
//! `u` uniform in `[0, 1)`. Each feed then reports the true price plus
//! `(u - 0.5) * noise`, rounded to the nearest integer unit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Default per-tick multiplicative drift.
pub const DEFAULT_DRIFT: f64 = 0.01;

/// Default additive per-feed noise, in price units.
pub const DEFAULT_NOISE: f64 = 1.0;

/// Shape of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkParams {
    /// Width of the log-price step.
    pub drift: f64,
    /// Width of the per-feed reading noise.
    pub noise: f64,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            drift: DEFAULT_DRIFT,
            noise: DEFAULT_NOISE,
        }
    }
}

/// A true price evolving over ticks, plus noisy observations of it.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    rng: StdRng,
    true_price: f64,
    params: WalkParams,
}

impl RandomWalk {
    /// Start a walk at `initial`. A `seed` makes the walk reproducible.
    pub fn new(initial: u64, params: WalkParams, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            true_price: initial as f64,
            params,
        }
    }

    /// Advance the true price by one tick and return it.
    pub fn step(&mut self) -> f64 {
        let u: f64 = self.rng.gen();
        self.true_price *= ((u - 0.5) * self.params.drift).exp();
        self.true_price
    }

    /// One feed's noisy observation of the current true price.
    pub fn reading(&mut self) -> u64 {
        let u: f64 = self.rng.gen();
        to_price(self.true_price + (u - 0.5) * self.params.noise)
    }

    /// The current true price, unrounded.
    pub fn true_price(&self) -> f64 {
        self.true_price
    }

    /// The current true price scaled by `multiplier`, rounded.
    pub fn scaled(&self, multiplier: u64) -> u64 {
        to_price(self.true_price * multiplier as f64)
    }
}

/// Round to the nearest unit, clamping negatives and non-finite values to zero.
fn to_price(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
