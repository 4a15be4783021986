//! Run configuration for the command line driver.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ConfigError, WalkersConfig};

/// Complete configuration for optimizing a benchmark landscape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Walker population settings.
    pub walkers: WalkersConfig,
    /// Function to optimize.
    pub landscape: Landscape,
    /// Number of dimensions of the search space.
    pub dims: usize,
    /// Lower bound of every coordinate.
    pub low: f64,
    /// Upper bound of every coordinate.
    pub high: f64,
    /// Action sampling policy.
    #[serde(default)]
    pub model: ModelConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            walkers: WalkersConfig {
                n_walkers: 64,
                max_iters: Some(500),
                accumulate_rewards: false,
                minimize: true,
                ..Default::default()
            },
            landscape: Landscape::Rastrigin,
            dims: 2,
            low: -5.12,
            high: 5.12,
            model: ModelConfig::default(),
        }
    }
}

/// Benchmark functions shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landscape {
    /// Sum of squares, minimum 0 at the origin.
    Sphere,
    /// Highly multimodal, minimum 0 at the origin.
    Rastrigin,
}

/// Action sampling policy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelConfig {
    /// Uniform perturbations in `[-step, step]`.
    Uniform { step: f64 },
    /// Gaussian perturbations clipped into `[-step, step]`.
    Normal { loc: f64, scale: f64, step: f64 },
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::Uniform { step: 0.5 }
    }
}

impl ModelConfig {
    /// Largest absolute perturbation per coordinate.
    pub fn step(&self) -> f64 {
        match self {
            Self::Uniform { step } | Self::Normal { step, .. } => *step,
        }
    }
}

// ============================================================================
// Progress and results
// ============================================================================

/// Snapshot reported after every swarm iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmProgress {
    /// Completed balance iterations.
    pub iteration: usize,
    /// Best reward found so far.
    pub best_reward: f64,
    /// Share of the virtual reward explained by diversity, NaN when the
    /// last iteration's scores could not be normalized.
    pub efficiency: f64,
    /// Fraction of walkers flagged as dead.
    pub dead_fraction: f64,
    /// Fraction of walkers that cloned on the last iteration.
    pub cloned_fraction: f64,
}

/// Final result of a swarm run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmResult {
    pub best_reward: f64,
    /// Observation of the best walker.
    pub best_observation: Vec<f64>,
    pub iterations: usize,
    pub elapsed_seconds: f64,
    pub stop_reason: StopReason,
}

/// Reason a swarm run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Reached `max_iters`.
    MaxIters,
    /// Every walker reached a terminal state.
    AllDead,
}

/// Errors loading a run configuration from disk.
#[derive(Debug, thiserror::Error)]
pub enum RunConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(#[from] ConfigError),
}

impl RunConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RunConfigError> {
        let content = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate run configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.walkers.validate()?;
        if self.dims == 0 {
            return Err(ConfigError::InvalidBounds(
                "dims must be non-zero".to_string(),
            ));
        }
        if !(self.low < self.high) {
            return Err(ConfigError::InvalidBounds(format!(
                "low ({}) must be below high ({})",
                self.low, self.high
            )));
        }
        let step = self.model.step();
        if !step.is_finite() || step <= 0.0 {
            return Err(ConfigError::InvalidBounds(format!(
                "model step must be positive, got {}",
                step
            )));
        }
        if let ModelConfig::Normal { scale, .. } = &self.model
            && !(*scale > 0.0)
        {
            return Err(ConfigError::InvalidBounds(format!(
                "normal scale must be positive, got {}",
                scale
            )));
        }
        Ok(())
    }
}
