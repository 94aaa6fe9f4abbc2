//! Simulation knobs and their validation.

use culture_grid::GridError;
use rand::{SeedableRng, rngs::SmallRng};
use rand_distr::NormalError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when constructing a simulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The grid rejected a placement.
    #[error(transparent)]
    Grid(#[from] GridError),
    /// The accuracy distribution could not be built.
    #[error("invalid accuracy distribution: {0}")]
    Accuracy(#[from] NormalError),
}

/// Static configuration for a social-learning run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Width of the torus in cells.
    pub width: u32,
    /// Height of the torus in cells.
    pub height: u32,
    /// Fraction of key positions rewritten each generation.
    pub key_change: f64,
    /// Fraction of newly created agents that learn horizontally.
    pub horizontal_ratio: f64,
    /// Fraction of learners promoted to role model at each generation boundary.
    pub role_model_ratio: f64,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of round snapshots retained in memory.
    pub history_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
            key_change: 0.8,
            horizontal_ratio: 0.5,
            role_model_ratio: 0.3,
            rng_seed: None,
            history_capacity: 1_024,
        }
    }
}

fn is_unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl SimulationConfig {
    /// Rejects values the simulation cannot honour.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.width == 0 || self.height == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if !is_unit_interval(self.key_change) {
            return Err(SimulationError::InvalidConfig(
                "key_change must lie in [0, 1]",
            ));
        }
        if !is_unit_interval(self.horizontal_ratio) {
            return Err(SimulationError::InvalidConfig(
                "horizontal_ratio must lie in [0, 1]",
            ));
        }
        if !is_unit_interval(self.role_model_ratio) {
            return Err(SimulationError::InvalidConfig(
                "role_model_ratio must lie in [0, 1]",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn out_of_range_ratios_fail_fast() {
        let cases = [
            SimulationConfig {
                key_change: 1.2,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                horizontal_ratio: -0.1,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                role_model_ratio: f64::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                width: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                history_capacity: 0,
                ..SimulationConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(SimulationError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"width": 8, "rng_seed": 7}"#).expect("config");
        assert_eq!(config.width, 8);
        assert_eq!(config.height, 20);
        assert_eq!(config.rng_seed, Some(7));
        assert!((config.key_change - 0.8).abs() < f64::EPSILON);
    }
}
