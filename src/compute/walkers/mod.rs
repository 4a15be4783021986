//! Walker populations.
//!
//! [`SimpleWalkers`] implements the balancing step: relativized distances
//! and rewards combine into a virtual reward, low-value walkers clone
//! higher-value companions, and dead walkers always clone. [`Walkers`] adds
//! best-solution tracking, minimization, entropy diagnostics and an optional
//! [`Critic`](crate::compute::Critic).

mod extended;
mod simple;
mod states;

pub use extended::{EntropyDiagnostics, Walkers};
pub use simple::{Lineages, SimpleWalkers, StatesUpdate};
pub use states::{BestWalker, WalkerStates};

use crate::compute::states::StateError;
use crate::schema::ConfigError;

/// Errors raised while balancing.
#[derive(Debug, thiserror::Error)]
pub enum WalkersError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Critic returned {found} scores for {expected} walkers")]
    CriticScore { expected: usize, found: usize },
    #[error("Clone probability of walker {index} is {value}")]
    NonFiniteCloneProbability { index: usize, value: f64 },
}
