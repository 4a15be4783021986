//! Critic extension point.

use super::{States, WalkerStates};

/// Auxiliary scorer that reweights the virtual reward.
///
/// Every method returns one score per walker. The score is stored as the
/// walkers' `critic_score` and multiplied into the virtual reward, so scores
/// should be non-negative.
pub trait Critic: Send {
    /// Score the walkers right before cloning probabilities are computed.
    fn calculate(&mut self, walkers: &WalkerStates, model: &States, env: &States) -> Vec<f64>;

    /// Called after each balance step. Keeps the current scores by default.
    fn update(&mut self, walkers: &WalkerStates, _model: &States, _env: &States) -> Vec<f64> {
        walkers.critic_score.clone()
    }

    /// Called when the walkers are reset. Neutral scores by default.
    fn reset(&mut self, walkers: &WalkerStates, _model: &States, _env: &States) -> Vec<f64> {
        vec![1.0; walkers.len()]
    }
}
