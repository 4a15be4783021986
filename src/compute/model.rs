//! Action sampling policies.
//!
//! A [`Model`] fills a [`States`] with one action per walker plus a `dt`
//! attribute (number of environment steps per action, always 1 here).

use crate::compute::rng::WalkerRng;
use crate::compute::states::{Attribute, StateError, States};
use crate::schema::{AttributeSpec, ConfigError, StateSpec};

/// Errors raised by models.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Per-coordinate box constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl Bounds {
    /// Create bounds from explicit limits.
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Result<Self, ConfigError> {
        if low.is_empty() || low.len() != high.len() {
            return Err(ConfigError::InvalidBounds(format!(
                "low has {} coordinates and high has {}",
                low.len(),
                high.len()
            )));
        }
        let valid = |i: usize| low[i].is_finite() && high[i].is_finite() && low[i] <= high[i];
        if let Some(i) = (0..low.len()).find(|&i| !valid(i)) {
            return Err(ConfigError::InvalidBounds(format!(
                "coordinate {} has low {} and high {}",
                i, low[i], high[i]
            )));
        }
        Ok(Self { low, high })
    }

    /// Same limits on every coordinate.
    pub fn uniform(dims: usize, low: f64, high: f64) -> Result<Self, ConfigError> {
        Self::new(vec![low; dims], vec![high; dims])
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Whether `point` lies inside the box, limits included.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dims()
            && point
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(x, (lo, hi))| lo <= x && x <= hi)
    }

    /// [`Bounds::contains`] for every row of a row-major batch.
    pub fn points_in_bounds(&self, data: &[f64]) -> Vec<bool> {
        data.chunks(self.dims()).map(|p| self.contains(p)).collect()
    }

    /// Clamp `point` into the box.
    pub fn clip(&self, point: &mut [f64]) {
        for (x, (lo, hi)) in point.iter_mut().zip(self.low.iter().zip(&self.high)) {
            *x = x.clamp(*lo, *hi);
        }
    }

    /// Uniform sample inside the box.
    pub fn sample(&self, rng: &mut WalkerRng) -> Vec<f64> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| if lo < hi { rng.uniform_in(lo, hi) } else { lo })
            .collect()
    }
}

/// Policy that proposes the next action of every walker.
pub trait Model: Send {
    /// Attributes written by [`Model::predict`].
    fn state_spec(&self) -> StateSpec;

    /// Sample actions.
    ///
    /// The batch size is taken from `model_states`, then `env_states`, then
    /// `batch_size`. Fails with [`ModelError::InvalidArgument`] if none is given.
    fn predict(
        &mut self,
        batch_size: Option<usize>,
        model_states: Option<&States>,
        env_states: Option<&States>,
    ) -> Result<States, ModelError>;

    /// Initial model states for a new run.
    fn reset(
        &mut self,
        batch_size: usize,
        model_states: Option<&States>,
    ) -> Result<States, ModelError> {
        self.predict(Some(batch_size), model_states, None)
    }
}

fn resolve_batch_size(
    batch_size: Option<usize>,
    model_states: Option<&States>,
    env_states: Option<&States>,
) -> Result<usize, ModelError> {
    model_states
        .map(States::len)
        .or_else(|| env_states.map(States::len))
        .or(batch_size)
        .ok_or_else(|| {
            ModelError::InvalidArgument(
                "predict needs model_states, env_states or batch_size".to_string(),
            )
        })
}

fn with_dt(actions: Attribute, n: usize) -> Result<States, ModelError> {
    Ok(States::new(n)
        .with("actions", actions)?
        .with("dt", Attribute::Scalars(vec![1.0; n]))?)
}

/// Uniformly random discrete actions in `0..n_actions`.
#[derive(Debug, Clone)]
pub struct DiscreteUniform {
    n_actions: usize,
    rng: WalkerRng,
}

impl DiscreteUniform {
    pub fn new(n_actions: usize) -> Result<Self, ModelError> {
        if n_actions == 0 {
            return Err(ModelError::InvalidArgument(
                "n_actions must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            n_actions,
            rng: WalkerRng::random(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = WalkerRng::new(seed);
        self
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }
}

impl Model for DiscreteUniform {
    fn state_spec(&self) -> StateSpec {
        StateSpec::from([
            ("actions".to_string(), AttributeSpec::indices()),
            ("dt".to_string(), AttributeSpec::scalars()),
        ])
    }

    fn predict(
        &mut self,
        batch_size: Option<usize>,
        model_states: Option<&States>,
        env_states: Option<&States>,
    ) -> Result<States, ModelError> {
        let n = resolve_batch_size(batch_size, model_states, env_states)?;
        let actions = (0..n).map(|_| self.rng.index(self.n_actions)).collect();
        with_dt(Attribute::Indices(actions), n)
    }
}

/// Continuous actions drawn uniformly inside [`Bounds`].
#[derive(Debug, Clone)]
pub struct ContinuousUniform {
    bounds: Bounds,
    rng: WalkerRng,
}

impl ContinuousUniform {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            rng: WalkerRng::random(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = WalkerRng::new(seed);
        self
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

impl Model for ContinuousUniform {
    fn state_spec(&self) -> StateSpec {
        continuous_spec(self.bounds.dims())
    }

    fn predict(
        &mut self,
        batch_size: Option<usize>,
        model_states: Option<&States>,
        env_states: Option<&States>,
    ) -> Result<States, ModelError> {
        let n = resolve_batch_size(batch_size, model_states, env_states)?;
        let data = (0..n).flat_map(|_| self.bounds.sample(&mut self.rng)).collect();
        with_dt(
            Attribute::Rows {
                data,
                width: self.bounds.dims(),
            },
            n,
        )
    }
}

/// Gaussian actions clipped into [`Bounds`].
#[derive(Debug, Clone)]
pub struct NormalContinuous {
    loc: f64,
    scale: f64,
    bounds: Bounds,
    rng: WalkerRng,
}

impl NormalContinuous {
    pub fn new(loc: f64, scale: f64, bounds: Bounds) -> Result<Self, ModelError> {
        if !(scale.is_finite() && scale > 0.0) || !loc.is_finite() {
            return Err(ModelError::InvalidArgument(format!(
                "normal distribution needs a finite loc and positive scale, got loc {} scale {}",
                loc, scale
            )));
        }
        Ok(Self {
            loc,
            scale,
            bounds,
            rng: WalkerRng::random(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = WalkerRng::new(seed);
        self
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

impl Model for NormalContinuous {
    fn state_spec(&self) -> StateSpec {
        continuous_spec(self.bounds.dims())
    }

    fn predict(
        &mut self,
        batch_size: Option<usize>,
        model_states: Option<&States>,
        env_states: Option<&States>,
    ) -> Result<States, ModelError> {
        let n = resolve_batch_size(batch_size, model_states, env_states)?;
        let width = self.bounds.dims();
        let mut data: Vec<f64> = (0..n * width)
            .map(|_| self.rng.normal(self.loc, self.scale))
            .collect();
        for row in data.chunks_mut(width) {
            self.bounds.clip(row);
        }
        with_dt(Attribute::Rows { data, width }, n)
    }
}

fn continuous_spec(dims: usize) -> StateSpec {
    StateSpec::from([
        ("actions".to_string(), AttributeSpec::rows(dims)),
        ("dt".to_string(), AttributeSpec::scalars()),
    ])
}

/// Binary masks with between 1 and `n_swaps` entries set.
#[derive(Debug, Clone)]
pub struct BinarySwap {
    n_actions: usize,
    n_swaps: usize,
    rng: WalkerRng,
}

impl BinarySwap {
    pub fn new(n_actions: usize, n_swaps: usize) -> Result<Self, ModelError> {
        if n_actions == 0 || n_swaps == 0 {
            return Err(ModelError::InvalidArgument(format!(
                "n_actions and n_swaps must be non-zero, got {} and {}",
                n_actions, n_swaps
            )));
        }
        Ok(Self {
            n_actions,
            n_swaps,
            rng: WalkerRng::random(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = WalkerRng::new(seed);
        self
    }
}

impl Model for BinarySwap {
    fn state_spec(&self) -> StateSpec {
        StateSpec::from([
            ("actions".to_string(), AttributeSpec::rows(self.n_actions)),
            ("dt".to_string(), AttributeSpec::scalars()),
        ])
    }

    fn predict(
        &mut self,
        batch_size: Option<usize>,
        model_states: Option<&States>,
        env_states: Option<&States>,
    ) -> Result<States, ModelError> {
        let n = resolve_batch_size(batch_size, model_states, env_states)?;
        let width = self.n_actions;
        let mut data = vec![0.0; n * width];
        for row in data.chunks_mut(width) {
            // swaps may hit the same position twice
            let swaps = 1 + self.rng.index(self.n_swaps);
            for _ in 0..swaps {
                row[self.rng.index(width)] = 1.0;
            }
        }
        with_dt(Attribute::Rows { data, width }, n)
    }
}
