//! Schema module - Configuration types for walker populations and runs.

mod config;
mod run;
mod state_spec;

pub use config::*;
pub use run::*;
pub use state_spec::*;
