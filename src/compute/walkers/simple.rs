//! Balancing engine: distances, virtual reward, clone probabilities and cloning.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, trace};

use crate::compute::distance::{DistanceFunction, Euclidean, gather_rows};
use crate::compute::relativize::{Statistics, relativize};
use crate::compute::rng::WalkerRng;
use crate::compute::states::{StateError, States};
use crate::schema::{StateSpec, WalkersConfig, validate_env_spec};

use super::{WalkerStates, WalkersError};

/// Divisor used in place of a zero virtual reward so clone probabilities stay finite.
const ZERO_VIRTUAL_REWARD: f64 = 1e-12;

/// Lineage ids at the start and at the end of a balance step.
pub type Lineages = (BTreeSet<u64>, BTreeSet<u64>);

/// Partial update routed through [`SimpleWalkers::update_states`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatesUpdate<'a> {
    /// Rewards received on the last transition.
    pub rewards: Option<&'a [f64]>,
    /// Termination flags.
    pub end_condition: Option<&'a [bool]>,
    /// Environment attributes to merge. `rewards` and `ends` also feed the walkers.
    pub env_states: Option<&'a States>,
    /// Model attributes to merge.
    pub model_states: Option<&'a States>,
}

/// Virtual reward and the intermediate scores it is built from.
pub(super) struct VirtualReward {
    pub processed_rewards: Vec<f64>,
    pub score_reward: Vec<f64>,
    pub score_dist: Vec<f64>,
    pub virtual_rewards: Vec<f64>,
}

impl VirtualReward {
    /// `relativize(objective)^reward_scale * distances^dist_scale`.
    pub(super) fn compute(
        objective: &[f64],
        distances: &[f64],
        reward_scale: f64,
        dist_scale: f64,
    ) -> Self {
        let processed_rewards = relativize(objective);
        let score_reward: Vec<f64> = processed_rewards
            .iter()
            .map(|r| r.powf(reward_scale))
            .collect();
        let score_dist: Vec<f64> = distances.iter().map(|d| d.powf(dist_scale)).collect();
        let virtual_rewards = score_reward
            .iter()
            .zip(&score_dist)
            .map(|(r, d)| r * d)
            .collect();
        Self {
            processed_rewards,
            score_reward,
            score_dist,
            virtual_rewards,
        }
    }
}

/// Population of walkers balanced by reward and diversity.
pub struct SimpleWalkers {
    pub(super) config: WalkersConfig,
    pub(super) states: WalkerStates,
    pub(super) env_states: States,
    pub(super) model_states: States,
    env_spec: StateSpec,
    model_spec: StateSpec,
    distance_function: Box<dyn DistanceFunction>,
    rng: WalkerRng,
    n_iters: usize,
}

impl SimpleWalkers {
    /// Create a new population.
    ///
    /// The environment spec must declare `observs`, `states`, `rewards` and
    /// `ends`, and every row attribute of either spec needs a size.
    pub fn new(
        config: WalkersConfig,
        env_spec: &StateSpec,
        model_spec: &StateSpec,
    ) -> Result<Self, WalkersError> {
        config.validate()?;
        validate_env_spec(env_spec)?;
        let n = config.n_walkers;

        Ok(Self {
            rng: WalkerRng::from_seed(config.random_seed),
            states: WalkerStates::new(n),
            env_states: States::from_spec(env_spec, n)?,
            model_states: States::from_spec(model_spec, n)?,
            env_spec: env_spec.clone(),
            model_spec: model_spec.clone(),
            distance_function: Box::new(Euclidean),
            n_iters: 0,
            config,
        })
    }

    /// Replace the default Euclidean distance.
    pub fn with_distance_function<D: DistanceFunction + 'static>(mut self, distance: D) -> Self {
        self.distance_function = Box::new(distance);
        self
    }

    /// Number of walkers.
    #[inline]
    pub fn n(&self) -> usize {
        self.config.n_walkers
    }

    #[inline]
    pub fn n_iters(&self) -> usize {
        self.n_iters
    }

    pub fn config(&self) -> &WalkersConfig {
        &self.config
    }

    pub fn states(&self) -> &WalkerStates {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut WalkerStates {
        &mut self.states
    }

    pub fn env_states(&self) -> &States {
        &self.env_states
    }

    pub fn model_states(&self) -> &States {
        &self.model_states
    }

    /// Lineage id of every walker: content hash of its environment `states` row.
    pub fn ids(&self) -> Result<Vec<u64>, StateError> {
        self.env_states.hash_values("states")
    }

    /// Store the current lineage ids.
    pub fn update_ids(&mut self) -> Result<(), WalkersError> {
        self.states.id_walkers = self.ids()?;
        Ok(())
    }

    /// Whether the run should stop: every walker is dead or the iteration limit is hit.
    pub fn calculate_end_condition(&self) -> bool {
        let all_dead = self.states.end_condition.iter().all(|&e| e);
        all_dead || self.n_iters >= self.config.iteration_limit()
    }

    /// Compare every walker with a random companion and store the relativized distances.
    pub fn calculate_distances(&mut self) -> Result<(), WalkersError> {
        let n = self.n();
        let compas = self.rng.permutation(n);
        let (obs, width) = self.env_states.rows("observs")?;
        let companions = gather_rows(obs, width, &compas);
        let distances = self.distance_function.distance(obs, &companions, width);
        if distances.len() != n {
            return Err(StateError::LengthMismatch {
                name: "distances".to_string(),
                expected: n,
                found: distances.len(),
            }
            .into());
        }

        self.states.distances = relativize(&distances);
        self.states.compas_dist = compas;
        Ok(())
    }

    /// Combine relativized reward and distance into the virtual reward.
    pub fn calculate_virtual_reward(&mut self) {
        let vr = VirtualReward::compute(
            &self.states.cum_rewards,
            &self.states.distances,
            self.config.reward_scale,
            self.config.dist_scale,
        );
        self.states.processed_rewards = vr.processed_rewards;
        self.states.virtual_rewards = vr.virtual_rewards;
    }

    /// Companions for cloning, drawn among the alive walkers.
    ///
    /// The first `k` entries are exactly the `k` alive walkers in order, so
    /// each of them is a candidate at least once. The rest are sampled with
    /// replacement. With no walker alive every walker is its own companion.
    pub fn get_alive_compas(&mut self) -> Vec<usize> {
        self.states.alive_mask = self.states.end_condition.iter().map(|&e| !e).collect();
        let alive: Vec<usize> = self
            .states
            .alive_mask
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| a.then_some(i))
            .collect();

        let n = self.n();
        if alive.is_empty() {
            return (0..n).collect();
        }
        let mut compas = self.rng.choose_with_replacement(&alive, n);
        compas[..alive.len()].copy_from_slice(&alive);
        compas
    }

    /// Probability of each walker being overwritten by a companion.
    ///
    /// `(vr[companion] - vr[i]) / vr[i]`, unbounded and possibly negative.
    /// Identical virtual rewards carry no information: every probability is
    /// zero and every walker is its own companion.
    pub fn update_clone_probs(&mut self) {
        let n = self.n();
        let first = self.states.virtual_rewards[0];
        let all_equal = self.states.virtual_rewards.iter().all(|&v| v == first);

        if all_equal {
            trace!("virtual rewards are all equal, skipping fitness cloning");
            self.states.clone_probs = vec![0.0; n];
            self.states.compas_clone = (0..n).collect();
            return;
        }

        let compas = self.get_alive_compas();
        let vr = &self.states.virtual_rewards;
        self.states.clone_probs = compas
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let divisor = if vr[i] > 0.0 { vr[i] } else { ZERO_VIRTUAL_REWARD };
                (vr[c] - vr[i]) / divisor
            })
            .collect();
        self.states.compas_clone = compas;
    }

    /// Decide which walkers clone and copy their companions' states.
    ///
    /// Dead walkers always clone.
    pub fn clone_walkers(&mut self) -> Result<(), WalkersError> {
        if let Some((index, &value)) = self
            .states
            .clone_probs
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite())
        {
            return Err(WalkersError::NonFiniteCloneProbability { index, value });
        }

        let draws = self.rng.uniform(self.n());
        self.states.will_clone = self
            .states
            .clone_probs
            .iter()
            .zip(&draws)
            .zip(&self.states.end_condition)
            .map(|((&p, &u), &dead)| dead || p > u)
            .collect();

        let (will_clone, compas) = self.states.clone_walkers()?;
        self.env_states
            .clone_walkers(&will_clone, &compas, &self.config.ignore_clone.env)?;
        self.model_states
            .clone_walkers(&will_clone, &compas, &self.config.ignore_clone.model)?;
        Ok(())
    }

    /// One balance iteration.
    ///
    /// Returns the lineage ids before and after cloning.
    pub fn balance(&mut self) -> Result<Lineages, WalkersError> {
        self.balance_with(|walkers| {
            walkers.calculate_virtual_reward();
            Ok(())
        })
    }

    /// Balance iteration with a custom virtual reward step.
    pub(super) fn balance_with<F>(&mut self, virtual_reward: F) -> Result<Lineages, WalkersError>
    where
        F: FnOnce(&mut Self) -> Result<(), WalkersError>,
    {
        let old_ids = self.states.id_walkers.iter().copied().collect();
        self.calculate_distances()?;
        virtual_reward(self)?;
        self.update_clone_probs();
        self.clone_walkers()?;
        self.n_iters += 1;
        let new_ids = self.states.id_walkers.iter().copied().collect();

        debug!(
            "iteration {}: dead {:.2}%, cloned {:.2}%",
            self.n_iters,
            100.0 * self.states.n_dead() as f64 / self.n() as f64,
            100.0 * self.states.n_cloned() as f64 / self.n() as f64,
        );
        Ok((old_ids, new_ids))
    }

    /// Restart the population for a new run.
    ///
    /// Containers are reallocated, then the optional snapshots are merged.
    /// Lineage ids are recomputed unless walker states were supplied.
    pub fn reset(
        &mut self,
        env_states: Option<&States>,
        model_states: Option<&States>,
        walker_states: Option<WalkerStates>,
    ) -> Result<(), WalkersError> {
        let n = self.n();
        let recompute_ids = walker_states.is_none();
        self.states = match walker_states {
            Some(states) => {
                states.validate(n)?;
                states
            }
            None => WalkerStates::new(n),
        };
        self.env_states = States::from_spec(&self.env_spec, n)?;
        self.model_states = States::from_spec(&self.model_spec, n)?;

        self.update_states(StatesUpdate {
            env_states,
            model_states,
            ..Default::default()
        })?;
        if recompute_ids {
            self.update_ids()?;
        }
        self.n_iters = 0;
        Ok(())
    }

    /// Merge new data into the walkers.
    ///
    /// Rewards, given directly or carried by the environment states, go
    /// through reward accumulation. Environment `ends` refresh the end
    /// condition.
    pub fn update_states(&mut self, update: StatesUpdate<'_>) -> Result<(), WalkersError> {
        if let Some(rewards) = update.rewards {
            self.accumulate_rewards(rewards)?;
        }
        if let Some(ends) = update.end_condition {
            self.set_end_condition(ends)?;
        }
        if let Some(env) = update.env_states {
            self.env_states.update(env)?;
            if env.contains("rewards") {
                self.accumulate_rewards(env.scalars("rewards")?)?;
            }
            if env.contains("ends") {
                self.set_end_condition(env.flags("ends")?)?;
            }
        }
        if let Some(model) = update.model_states {
            self.model_states.update(model)?;
        }
        Ok(())
    }

    /// Sum the rewards into `cum_rewards`, or keep only the last ones.
    fn accumulate_rewards(&mut self, rewards: &[f64]) -> Result<(), StateError> {
        check_len("rewards", self.n(), rewards.len())?;
        if self.config.accumulate_rewards {
            for (cum, r) in self.states.cum_rewards.iter_mut().zip(rewards) {
                *cum += r;
            }
        } else {
            self.states.cum_rewards.copy_from_slice(rewards);
        }
        Ok(())
    }

    fn set_end_condition(&mut self, ends: &[bool]) -> Result<(), StateError> {
        check_len("end_condition", self.n(), ends.len())?;
        self.states.end_condition.copy_from_slice(ends);
        Ok(())
    }

    /// Human readable summary of the population.
    pub(super) fn write_summary(&self, f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
        let n = self.n() as f64;
        writeln!(
            f,
            "{} iteration {} Dead walkers: {:.2}% Cloned: {:.2}%\n",
            name,
            self.n_iters,
            100.0 * self.states.n_dead() as f64 / n,
            100.0 * self.states.n_cloned() as f64 / n,
        )?;
        writeln!(f, "Walkers States:")?;
        for (label, values) in [
            ("cum_rewards", &self.states.cum_rewards),
            ("distances", &self.states.distances),
            ("virtual_rewards", &self.states.virtual_rewards),
            ("processed_rewards", &self.states.processed_rewards),
            ("clone_probs", &self.states.clone_probs),
        ] {
            write_statistics(f, label, values)?;
        }
        writeln!(f, "Env States:")?;
        if let Ok(rewards) = self.env_states.scalars("rewards") {
            write_statistics(f, "rewards", rewards)?;
        }
        Ok(())
    }
}

impl fmt::Display for SimpleWalkers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_summary(f, "SimpleWalkers")
    }
}

fn write_statistics(f: &mut fmt::Formatter<'_>, label: &str, values: &[f64]) -> fmt::Result {
    let stats = Statistics::from_values(values);
    writeln!(
        f,
        "  {} Mean: {:.3}, Std: {:.3}, Max: {:.3} Min: {:.3}",
        label, stats.mean, stats.std, stats.max, stats.min
    )
}

fn check_len(name: &str, expected: usize, found: usize) -> Result<(), StateError> {
    if expected != found {
        return Err(StateError::LengthMismatch {
            name: name.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
