//! Per-walker bookkeeping owned by the balancing engine.

use crate::compute::states::{StateError, check_clone_mapping, clone_items};

/// Best solution observed during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BestWalker {
    /// Reward of the best walker, `±inf` until something is recorded.
    pub reward: f64,
    /// Observation row of the best walker.
    pub observs: Vec<f64>,
    /// Environment state row of the best walker.
    pub state: Vec<f64>,
    /// Lineage id of the best walker. `None` until something is recorded.
    pub id: Option<u64>,
}

impl BestWalker {
    /// Empty record for a maximization (`-inf`) or minimization (`+inf`) run.
    pub fn unset(minimize: bool) -> Self {
        Self {
            reward: if minimize {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            },
            observs: Vec::new(),
            state: Vec::new(),
            id: None,
        }
    }

    /// Whether a walker has been recorded as best.
    #[inline]
    pub fn is_recorded(&self) -> bool {
        self.id.is_some()
    }
}

/// Batched walker attributes, one entry per walker.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerStates {
    /// Lineage ids: content hash of each walker's environment state.
    pub id_walkers: Vec<u64>,
    /// Accumulated (or last) reward.
    pub cum_rewards: Vec<f64>,
    /// Relativized distance to the companion in `compas_dist`.
    pub distances: Vec<f64>,
    pub compas_dist: Vec<usize>,
    pub virtual_rewards: Vec<f64>,
    pub processed_rewards: Vec<f64>,
    /// Probability of being overwritten by the companion in `compas_clone`.
    pub clone_probs: Vec<f64>,
    pub compas_clone: Vec<usize>,
    pub will_clone: Vec<bool>,
    pub end_condition: Vec<bool>,
    pub alive_mask: Vec<bool>,
    /// Multiplier supplied by the critic.
    pub critic_score: Vec<f64>,
    pub best: BestWalker,
}

impl WalkerStates {
    /// Default states for `n` walkers.
    pub fn new(n: usize) -> Self {
        Self {
            id_walkers: vec![0; n],
            cum_rewards: vec![0.0; n],
            distances: vec![1.0; n],
            compas_dist: (0..n).collect(),
            virtual_rewards: vec![1.0; n],
            processed_rewards: vec![1.0; n],
            clone_probs: vec![0.0; n],
            compas_clone: (0..n).collect(),
            will_clone: vec![false; n],
            end_condition: vec![false; n],
            alive_mask: vec![true; n],
            critic_score: vec![1.0; n],
            best: BestWalker::unset(false),
        }
    }

    /// Number of walkers.
    #[inline]
    pub fn len(&self) -> usize {
        self.cum_rewards.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cum_rewards.is_empty()
    }

    pub fn n_dead(&self) -> usize {
        self.end_condition.iter().filter(|&&e| e).count()
    }

    pub fn n_cloned(&self) -> usize {
        self.will_clone.iter().filter(|&&c| c).count()
    }

    /// Check every per-walker vector holds `n` entries.
    pub fn validate(&self, n: usize) -> Result<(), StateError> {
        let lengths = [
            ("id_walkers", self.id_walkers.len()),
            ("cum_rewards", self.cum_rewards.len()),
            ("distances", self.distances.len()),
            ("compas_dist", self.compas_dist.len()),
            ("virtual_rewards", self.virtual_rewards.len()),
            ("processed_rewards", self.processed_rewards.len()),
            ("clone_probs", self.clone_probs.len()),
            ("compas_clone", self.compas_clone.len()),
            ("will_clone", self.will_clone.len()),
            ("end_condition", self.end_condition.len()),
            ("alive_mask", self.alive_mask.len()),
            ("critic_score", self.critic_score.len()),
        ];
        for (name, found) in lengths {
            if found != n {
                return Err(StateError::LengthMismatch {
                    name: name.to_string(),
                    expected: n,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Apply the current clone decision to the walker bookkeeping.
    ///
    /// Rewards, lineage ids and termination flags travel with the cloned
    /// state. Returns the mapping so the environment and model states can
    /// clone with it.
    pub fn clone_walkers(&mut self) -> Result<(Vec<bool>, Vec<usize>), StateError> {
        let will_clone = self.will_clone.clone();
        let compas = self.compas_clone.clone();
        check_clone_mapping(self.len(), &will_clone, &compas)?;

        clone_items(&mut self.cum_rewards, &will_clone, &compas);
        clone_items(&mut self.id_walkers, &will_clone, &compas);
        clone_items(&mut self.end_condition, &will_clone, &compas);
        Ok((will_clone, compas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_consistent() {
        let states = WalkerStates::new(6);
        assert!(states.validate(6).is_ok());
        assert_eq!(states.n_dead(), 0);
        assert!(!states.best.is_recorded());
    }

    #[test]
    fn test_validate_detects_short_vector() {
        let mut states = WalkerStates::new(4);
        states.distances.pop();
        assert!(matches!(
            states.validate(4),
            Err(StateError::LengthMismatch { found: 3, .. })
        ));
    }

    #[test]
    fn test_clone_walkers_moves_lineage() {
        let mut states = WalkerStates::new(3);
        states.id_walkers = vec![10, 20, 30];
        states.cum_rewards = vec![1.0, 2.0, 3.0];
        states.end_condition = vec![true, false, false];
        states.will_clone = vec![true, false, false];
        states.compas_clone = vec![2, 1, 2];

        let (clone, compas) = states.clone_walkers().unwrap();
        assert_eq!(clone, vec![true, false, false]);
        assert_eq!(compas, vec![2, 1, 2]);
        assert_eq!(states.id_walkers, vec![30, 20, 30]);
        assert_eq!(states.cum_rewards, vec![3.0, 2.0, 3.0]);
        assert_eq!(states.end_condition, vec![false, false, false]);
    }
}
