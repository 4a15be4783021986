//! Configuration types for the walker population and its balancing parameters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

fn default_n_walkers() -> usize {
    32
}
fn default_scale() -> f64 {
    1.0
}
fn default_accumulate_rewards() -> bool {
    true
}

/// Top-level walker population configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkersConfig {
    /// Number of walkers. Constant for the lifetime of a run.
    #[serde(default = "default_n_walkers")]
    pub n_walkers: usize,
    /// Exponent applied to the relativized reward (recommended range 0-5).
    #[serde(default = "default_scale")]
    pub reward_scale: f64,
    /// Exponent applied to the relativized distance (recommended range 0-5).
    #[serde(default = "default_scale")]
    pub dist_scale: f64,
    /// Maximum number of balance iterations. `None` runs until every walker dies.
    #[serde(default)]
    pub max_iters: Option<usize>,
    /// Sum rewards over the run, or keep only the last reward received.
    #[serde(default = "default_accumulate_rewards")]
    pub accumulate_rewards: bool,
    /// Minimize the reward instead of maximizing it.
    #[serde(default)]
    pub minimize: bool,
    /// Attributes excluded from cloning.
    #[serde(default)]
    pub ignore_clone: IgnoreClone,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for WalkersConfig {
    fn default() -> Self {
        Self {
            n_walkers: default_n_walkers(),
            reward_scale: default_scale(),
            dist_scale: default_scale(),
            max_iters: None,
            accumulate_rewards: default_accumulate_rewards(),
            minimize: false,
            ignore_clone: IgnoreClone::default(),
            random_seed: None,
        }
    }
}

/// Names of the attributes that keep their own value when a walker clones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreClone {
    /// Attributes of the environment states.
    #[serde(default)]
    pub env: BTreeSet<String>,
    /// Attributes of the model states.
    #[serde(default)]
    pub model: BTreeSet<String>,
}

impl WalkersConfig {
    /// Iteration limit used by the end condition.
    #[inline]
    pub fn iteration_limit(&self) -> usize {
        self.max_iters.unwrap_or(usize::MAX)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_walkers == 0 {
            return Err(ConfigError::NoWalkers);
        }
        if !self.reward_scale.is_finite() || self.reward_scale < 0.0 {
            return Err(ConfigError::InvalidScale {
                name: "reward_scale",
                value: self.reward_scale,
            });
        }
        if !self.dist_scale.is_finite() || self.dist_scale < 0.0 {
            return Err(ConfigError::InvalidScale {
                name: "dist_scale",
                value: self.dist_scale,
            });
        }
        if self.max_iters == Some(0) {
            return Err(ConfigError::InvalidMaxIters);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Walker count must be non-zero")]
    NoWalkers,
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidScale { name: &'static str, value: f64 },
    #[error("max_iters must be positive when set")]
    InvalidMaxIters,
    #[error("Attribute `{0}` stores rows and needs a `size`")]
    MissingSize(String),
    #[error("State spec is missing required attribute `{0}`")]
    MissingAttribute(String),
    #[error("Attribute `{name}` must be declared as {expected}")]
    WrongAttributeKind { name: String, expected: &'static str },
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = WalkersConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.iteration_limit(), usize::MAX);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = WalkersConfig {
            n_walkers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoWalkers)));

        let config = WalkersConfig {
            dist_scale: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidScale {
                name: "dist_scale",
                ..
            })
        ));

        let config = WalkersConfig {
            max_iters: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMaxIters)));
    }

    #[test]
    fn test_serde_defaults() {
        let parsed: WalkersConfig =
            serde_json::from_str(r#"{"n_walkers": 8, "ignore_clone": {"env": ["observs"]}}"#)
                .unwrap();
        assert_eq!(parsed.n_walkers, 8);
        assert_eq!(parsed.reward_scale, 1.0);
        assert!(parsed.accumulate_rewards);
        assert!(parsed.ignore_clone.env.contains("observs"));
        assert!(parsed.ignore_clone.model.is_empty());
    }
}
