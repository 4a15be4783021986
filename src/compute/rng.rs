//! Seedable random source owned by the walkers.

use rand::prelude::*;

/// Random number generator wrapper for balancing operations.
///
/// Every draw the walkers make goes through this type, so a fixed seed
/// reproduces a run exactly.
#[derive(Debug, Clone)]
pub struct WalkerRng {
    rng: StdRng,
}

impl WalkerRng {
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

    /// Create from an optional seed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::random, Self::new)
    }

    /// Uniformly random permutation of `0..n`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut index: Vec<usize> = (0..n).collect();
        index.shuffle(&mut self.rng);
        index
    }

    /// `n` draws with replacement from `pool`.
    pub fn choose_with_replacement(&mut self, pool: &[usize], n: usize) -> Vec<usize> {
        (0..n)
            .map(|_| pool[self.rng.gen_range(0..pool.len())])
            .collect()
    }

    /// `n` independent draws from U(0, 1).
    pub fn uniform(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.rng.r#gen::<f64>()).collect()
    }

    /// Uniform draw in `[low, high)`.
    pub fn uniform_in(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }

    /// Uniform index in `0..n`.
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Gaussian draw.
    pub fn normal(&mut self, loc: f64, scale: f64) -> f64 {
        let noise: f64 = self.rng.sample(rand_distr::StandardNormal);
        loc + noise * scale
    }
}
