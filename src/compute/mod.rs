//! Compute module - Walker balancing, environments and models.

mod critic;
mod distance;
mod env;
mod model;
mod relativize;
mod rng;
mod states;
mod swarm;
mod walkers;

pub use critic::*;
pub use distance::*;
pub use env::*;
pub use model::*;
pub use relativize::*;
pub use rng::*;
pub use states::*;
pub use swarm::*;
pub use walkers::*;
