//! Environments the walkers explore.

use std::f64::consts::PI;
use std::fmt;

use rayon::prelude::*;

use crate::compute::model::Bounds;
use crate::compute::rng::WalkerRng;
use crate::compute::states::{Attribute, StateError, States};
use crate::schema::{Landscape, StateSpec, env_state_spec};

/// Errors raised by environments.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Actions have {found} coordinates, environment has {expected}")]
    ActionWidth { expected: usize, found: usize },
}

/// Transition function applied to a batch of walkers.
///
/// Every returned [`States`] carries `observs`, `states`, `rewards` and `ends`.
pub trait Environment: Send {
    /// Attributes produced by [`Environment::reset`] and [`Environment::step`].
    fn state_spec(&self) -> StateSpec;

    /// Initial states for `batch_size` walkers.
    fn reset(&mut self, batch_size: usize) -> Result<States, EnvError>;

    /// Apply the model's actions to the current states.
    fn step(&mut self, model_states: &States, env_states: &States) -> Result<States, EnvError>;
}

/// Objective evaluated on a single point.
pub type Objective = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Walkers move through a box and receive the value of a function as reward.
///
/// A walker that steps outside the bounds is marked as ended.
pub struct FunctionEnv {
    bounds: Bounds,
    function: Objective,
    rng: WalkerRng,
}

impl FunctionEnv {
    pub fn new<F>(bounds: Bounds, function: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            bounds,
            function: Box::new(function),
            rng: WalkerRng::random(),
        }
    }

    /// Environment over one of the built-in benchmark functions.
    pub fn from_landscape(landscape: Landscape, bounds: Bounds) -> Self {
        match landscape {
            Landscape::Sphere => Self::new(bounds, sphere),
            Landscape::Rastrigin => Self::new(bounds, rastrigin),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = WalkerRng::new(seed);
        self
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Evaluate the objective on every row of `points`.
    pub fn evaluate(&self, points: &[f64]) -> Vec<f64> {
        points
            .par_chunks(self.bounds.dims())
            .map(|p| (self.function)(p))
            .collect()
    }

    fn states_from_points(&self, points: Vec<f64>) -> Result<States, EnvError> {
        let n = points.len() / self.bounds.dims();
        let width = self.bounds.dims();
        let rewards = self.evaluate(&points);
        let ends = self
            .bounds
            .points_in_bounds(&points)
            .into_iter()
            .map(|inside| !inside)
            .collect();
        Ok(States::new(n)
            .with(
                "observs",
                Attribute::Rows {
                    data: points.clone(),
                    width,
                },
            )?
            .with(
                "states",
                Attribute::Rows {
                    data: points,
                    width,
                },
            )?
            .with("rewards", Attribute::Scalars(rewards))?
            .with("ends", Attribute::Flags(ends))?)
    }
}

impl Environment for FunctionEnv {
    fn state_spec(&self) -> StateSpec {
        env_state_spec(self.bounds.dims(), self.bounds.dims())
    }

    fn reset(&mut self, batch_size: usize) -> Result<States, EnvError> {
        let points = (0..batch_size)
            .flat_map(|_| self.bounds.sample(&mut self.rng))
            .collect();
        self.states_from_points(points)
    }

    fn step(&mut self, model_states: &States, env_states: &States) -> Result<States, EnvError> {
        let (actions, width) = model_states.rows("actions")?;
        if width != self.bounds.dims() {
            return Err(EnvError::ActionWidth {
                expected: self.bounds.dims(),
                found: width,
            });
        }
        let (points, _) = env_states.rows("states")?;
        if actions.len() != points.len() {
            return Err(StateError::BatchMismatch {
                expected: env_states.len(),
                found: model_states.len(),
            }
            .into());
        }
        let moved = points.iter().zip(actions).map(|(x, a)| x + a).collect();
        self.states_from_points(moved)
    }
}

impl fmt::Debug for FunctionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEnv")
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

/// `Σ xᵢ²`, minimum 0 at the origin.
pub fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

/// `10n + Σ (xᵢ² - 10 cos(2π xᵢ))`, minimum 0 at the origin.
pub fn rastrigin(x: &[f64]) -> f64 {
    10.0 * x.len() as f64
        + x.iter()
            .map(|v| v * v - 10.0 * (2.0 * PI * v).cos())
            .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_env_spec;

    fn env() -> FunctionEnv {
        FunctionEnv::from_landscape(Landscape::Sphere, Bounds::uniform(2, -1.0, 1.0).unwrap())
            .with_seed(3)
    }

    fn actions(data: Vec<f64>, width: usize) -> States {
        let n = data.len() / width;
        States::new(n)
            .with("actions", Attribute::Rows { data, width })
            .unwrap()
    }

    #[test]
    fn test_landscapes() {
        assert_eq!(sphere(&[0.0, 0.0]), 0.0);
        assert_eq!(sphere(&[1.0, 2.0]), 5.0);
        assert!(rastrigin(&[0.0, 0.0, 0.0]).abs() < 1e-12);
        assert!((rastrigin(&[1.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_spec_is_walker_compatible() {
        assert!(validate_env_spec(&env().state_spec()).is_ok());
    }

    #[test]
    fn test_reset_inside_bounds() {
        let mut env = env();
        let states = env.reset(50).unwrap();
        assert_eq!(states.len(), 50);
        assert!(states.flags("ends").unwrap().iter().all(|&e| !e));
        let (points, width) = states.rows("observs").unwrap();
        assert_eq!(width, 2);
        assert_eq!(env.evaluate(points), states.scalars("rewards").unwrap());
    }

    #[test]
    fn test_step_moves_and_ends_out_of_bounds() {
        let mut env = env();
        let start = States::new(2)
            .with(
                "states",
                Attribute::Rows {
                    data: vec![0.0, 0.0, 0.5, 0.5],
                    width: 2,
                },
            )
            .unwrap();
        let next = env
            .step(&actions(vec![0.5, -0.5, 1.0, 0.0], 2), &start)
            .unwrap();
        assert_eq!(next.row("states", 0).unwrap(), &[0.5, -0.5]);
        assert_eq!(next.row("observs", 1).unwrap(), &[1.5, 0.5]);
        assert_eq!(next.scalars("rewards").unwrap(), &[0.5, 2.5]);
        assert_eq!(next.flags("ends").unwrap(), &[false, true]);
    }

    #[test]
    fn test_step_rejects_wrong_action_width() {
        let mut env = env();
        let start = env.reset(2).unwrap();
        assert!(matches!(
            env.step(&actions(vec![0.1, 0.1, 0.1], 3), &start),
            Err(EnvError::ActionWidth {
                expected: 2,
                found: 3
            })
        ));
    }
}
