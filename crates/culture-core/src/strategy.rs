//! Symbolic strategies, the hidden key, and the scoring rule that compares them.

use rand::{Rng, RngCore, seq::index};
use rand_distr::{Distribution, Normal, NormalError};
use serde::{Deserialize, Serialize};

/// Number of symbols in a key or strategy.
pub const STRATEGY_LEN: usize = 25;
/// Size of the symbol alphabet (symbols are `0..ALPHABET_SIZE`).
pub const ALPHABET_SIZE: u8 = 10;

/// A single strategy digit.
pub type Symbol = u8;

/// Draw a symbol uniformly from the alphabet minus `current`.
fn different_symbol(current: Symbol, rng: &mut dyn RngCore) -> Symbol {
    let offset = rng.random_range(1..ALPHABET_SIZE);
    (current + offset) % ALPHABET_SIZE
}

/// Target pattern every agent tries to match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Key(pub [Symbol; STRATEGY_LEN]);

impl Key {
    /// Sample a fresh key with every position uniform over the alphabet.
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let mut symbols = [0; STRATEGY_LEN];
        for symbol in &mut symbols {
            *symbol = rng.random_range(0..ALPHABET_SIZE);
        }
        Self(symbols)
    }

    #[must_use]
    pub const fn symbols(&self) -> &[Symbol; STRATEGY_LEN] {
        &self.0
    }

    /// Number of positions a mutation with the given fraction rewrites.
    #[must_use]
    pub fn changes_for(key_change: f64) -> usize {
        ((key_change * STRATEGY_LEN as f64) as usize).min(STRATEGY_LEN)
    }

    /// Rewrite `⌊key_change · 25⌋` distinct positions, each to a different symbol.
    ///
    /// Returns the number of positions changed.
    pub fn mutate(&mut self, key_change: f64, rng: &mut dyn RngCore) -> usize {
        let changes = Self::changes_for(key_change);
        for idx in index::sample(rng, STRATEGY_LEN, changes) {
            self.0[idx] = different_symbol(self.0[idx], rng);
        }
        changes
    }

    /// Number of positions where `self` and `other` disagree.
    #[must_use]
    pub fn hamming(&self, other: &Key) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a != b)
            .count()
    }
}

/// Source of the initial accuracy (correct-position count) for new strategies.
pub trait AccuracySampler: Send {
    /// Raw accuracy draw; callers clamp it to `0..=STRATEGY_LEN`.
    fn sample_accuracy(&self, rng: &mut dyn RngCore) -> f64;
}

/// Mean of the default accuracy draw.
pub const ACCURACY_MEAN: f64 = STRATEGY_LEN as f64 / 2.0;
/// Standard deviation of the default accuracy draw.
pub const ACCURACY_STD_DEV: f64 = 3.0;

/// Gaussian accuracy: most agents start mediocre, a few close to perfect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalAccuracy {
    distribution: Normal<f64>,
}

impl NormalAccuracy {
    /// Fails when `std_dev` is negative or NaN.
    pub fn new(mean: f64, std_dev: f64) -> Result<Self, NormalError> {
        Ok(Self {
            distribution: Normal::new(mean, std_dev)?,
        })
    }

    /// The default draw: mean 12.5, standard deviation 3.
    pub fn standard() -> Result<Self, NormalError> {
        Self::new(ACCURACY_MEAN, ACCURACY_STD_DEV)
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.distribution.mean()
    }

    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.distribution.std_dev()
    }
}

impl AccuracySampler for NormalAccuracy {
    fn sample_accuracy(&self, rng: &mut dyn RngCore) -> f64 {
        self.distribution.sample(rng)
    }
}

/// Always yields the same accuracy. Handy for reproducible fixtures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedAccuracy(pub usize);

impl AccuracySampler for FixedAccuracy {
    fn sample_accuracy(&self, _rng: &mut dyn RngCore) -> f64 {
        self.0 as f64
    }
}

/// An agent's guess at the key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Strategy(pub [Symbol; STRATEGY_LEN]);

impl Strategy {
    /// Build a strategy that agrees with `key` on exactly the sampled number of positions.
    ///
    /// The accuracy draw is clamped to `[0, 25]` and truncated. Correct positions are
    /// chosen without replacement; every other position gets a symbol different from
    /// the key's.
    pub fn initialize(key: &Key, sampler: &dyn AccuracySampler, rng: &mut dyn RngCore) -> Self {
        let accuracy = sampler
            .sample_accuracy(rng)
            .clamp(0.0, STRATEGY_LEN as f64) as usize;
        let mut correct = [false; STRATEGY_LEN];
        for idx in index::sample(rng, STRATEGY_LEN, accuracy) {
            correct[idx] = true;
        }
        let mut symbols = key.0;
        for (idx, symbol) in symbols.iter_mut().enumerate() {
            if !correct[idx] {
                *symbol = different_symbol(*symbol, rng);
            }
        }
        Self(symbols)
    }

    #[must_use]
    pub const fn symbols(&self) -> &[Symbol; STRATEGY_LEN] {
        &self.0
    }

    /// Count of positions equal to `key`.
    #[must_use]
    pub fn score(&self, key: &Key) -> u32 {
        score(self, key)
    }
}

/// Count of positions where `strategy` matches `key`.
#[must_use]
pub fn score(strategy: &Strategy, key: &Key) -> u32 {
    strategy
        .0
        .iter()
        .zip(key.0.iter())
        .filter(|(s, k)| s == k)
        .count() as u32
}
