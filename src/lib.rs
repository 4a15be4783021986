//! Fractal walkers - Population balancing search driven by virtual reward.
//!
//! A population of walkers explores an environment in parallel. After every
//! step each walker is compared with a random companion: rewards and
//! distances are relativized into a virtual reward, and walkers with a low
//! virtual reward clone the state of a better companion. Dead walkers always
//! clone. This keeps the population focused on promising regions while
//! preserving diversity.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration types, state specifications and run results
//! - `compute`: Balancing engine, state containers, models and environments
//!
//! # Example
//!
//! ```rust,no_run
//! use fractal_walkers::{
//!     compute::{Bounds, ContinuousUniform, FunctionEnv, Swarm},
//!     schema::{Landscape, WalkersConfig},
//! };
//!
//! let config = WalkersConfig {
//!     n_walkers: 64,
//!     max_iters: Some(200),
//!     accumulate_rewards: false,
//!     minimize: true,
//!     random_seed: Some(42),
//!     ..Default::default()
//! };
//!
//! let env = FunctionEnv::from_landscape(
//!     Landscape::Rastrigin,
//!     Bounds::uniform(2, -5.12, 5.12).unwrap(),
//! );
//! let model = ContinuousUniform::new(Bounds::uniform(2, -0.5, 0.5).unwrap());
//!
//! let mut swarm = Swarm::new(config, env, model).unwrap();
//! let result = swarm.run().unwrap();
//!
//! println!("Best reward after {} iterations: {}", result.iterations, result.best_reward);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{Swarm, Walkers, relativize};
pub use schema::{RunConfig, WalkersConfig};
