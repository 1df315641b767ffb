//! Seeded random source for the simulation.
//!
//! Every random draw made on behalf of a transaction goes through a
//! [`SimRng`] derived from the transaction's seed, so a run is reproducible
//! from its seeds alone.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Simulation random number generator.
///
/// Thin wrapper over [`StdRng`] that remembers its seed and offers the
/// draws the simulators need. It also implements [`RngCore`], so any `rand`
/// distribution can sample from it directly.
///
/// # Examples
///
/// ```rust
/// use fnb_core::rng::SimRng;
///
/// let mut a = SimRng::from_seed(7);
/// let mut b = SimRng::from_seed(7);
/// assert_eq!(a.gen_uniform(), b.gen_uniform());
/// ```
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: StdRng,
    seed: u64,
}

impl SimRng {
    /// Create a generator from a 64-bit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create a generator from operating system entropy.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random())
    }

    /// Seed used for initialisation
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derive an independent generator.
    ///
    /// The child seed is drawn from this generator, so forking the same
    /// parent in the same order always yields the same children.
    pub fn fork(&mut self) -> SimRng {
        SimRng::from_seed(self.inner.next_u64())
    }

    /// Uniform value in [0, 1)
    pub fn gen_uniform(&mut self) -> f64 {
        self.inner.gen()
    }

    /// Standard normal variate
    pub fn gen_normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.inner)
    }

    /// Uniform value in [low, high). Returns `low` when the range is empty.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Uniform integer in [low, high]. Returns `low` when the range is empty.
    pub fn int_inclusive(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..=high)
    }

    /// Bernoulli trial with success probability `p`.
    ///
    /// Probabilities outside [0, 1] are clamped rather than rejected.
    pub fn bernoulli(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.gen_uniform() < p
    }

    /// Pick one element uniformly. Returns `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.inner.gen_range(0..items.len());
        items.get(idx)
    }

    /// Sample a latency from a configured range
    pub fn latency(&mut self, range: LatencyRange) -> u64 {
        self.int_inclusive(range.min_ms, range.max_ms)
    }
}

impl RngCore for SimRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

/// Inclusive latency range in simulated milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// True when `ms` lies inside the range
    pub fn contains(&self, ms: u64) -> bool {
        (self.min_ms..=self.max_ms).contains(&ms)
    }

    /// Describe the problem with this range, if any.
    pub fn check(&self, name: &str) -> Option<String> {
        (self.min_ms > self.max_ms).then(|| {
            format!(
                "{name}: min_ms ({}) must not exceed max_ms ({})",
                self.min_ms, self.max_ms
            )
        })
    }
}

/// Describe the problem with a probability value, if any.
pub fn check_rate(name: &str, rate: f64) -> Option<String> {
    (!(0.0..=1.0).contains(&rate)).then(|| format!("{name}: rate {rate} must be within [0, 1]"))
}
