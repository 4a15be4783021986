//! Walkers with best-solution tracking, minimization and critic support.

use std::fmt;

use log::trace;

use crate::compute::critic::Critic;
use crate::compute::distance::DistanceFunction;
use crate::compute::states::{StateError, States};
use crate::schema::{StateSpec, WalkersConfig};

use super::simple::{Lineages, SimpleWalkers, StatesUpdate, VirtualReward};
use super::{BestWalker, WalkerStates, WalkersError};

/// How much of the virtual reward is explained by diversity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyDiagnostics {
    /// `Π(2 - dist_prob^reward_prob)`.
    pub total_entropy: f64,
    /// `Π(2 - reward_prob^reward_prob)`, the value for degenerate diversity.
    pub min_entropy: f64,
    /// `min_entropy / total_entropy`.
    pub efficiency: f64,
}

impl EntropyDiagnostics {
    /// Placeholder for an iteration whose diagnostics could not be computed.
    pub const UNAVAILABLE: Self = Self {
        total_entropy: f64::NAN,
        min_entropy: f64::NAN,
        efficiency: f64::NAN,
    };

    pub fn is_available(&self) -> bool {
        !self.efficiency.is_nan()
    }

    /// Diagnostics from the exponent-weighted reward and distance scores.
    ///
    /// Products are accumulated in log space. Returns `None` when either
    /// score cannot be normalized into a distribution.
    pub fn from_scores(score_reward: &[f64], score_dist: &[f64]) -> Option<Self> {
        let reward_sum: f64 = score_reward.iter().sum();
        let dist_sum: f64 = score_dist.iter().sum();
        if !(reward_sum > 0.0 && reward_sum.is_finite() && dist_sum > 0.0 && dist_sum.is_finite())
        {
            return None;
        }

        let mut ln_total = 0.0;
        let mut ln_min = 0.0;
        for (r, d) in score_reward.iter().zip(score_dist) {
            let reward_prob = r / reward_sum;
            let dist_prob = d / dist_sum;
            ln_total += (2.0 - dist_prob.powf(reward_prob)).ln();
            ln_min += (2.0 - reward_prob.powf(reward_prob)).ln();
        }
        Some(Self {
            total_entropy: ln_total.exp(),
            min_entropy: ln_min.exp(),
            efficiency: (ln_min - ln_total).exp(),
        })
    }
}

/// Walker population that keeps track of the best solution found.
pub struct Walkers {
    base: SimpleWalkers,
    critic: Option<Box<dyn Critic>>,
    diagnostics: EntropyDiagnostics,
}

impl Walkers {
    /// Create a new population. See [`SimpleWalkers::new`].
    pub fn new(
        config: WalkersConfig,
        env_spec: &StateSpec,
        model_spec: &StateSpec,
    ) -> Result<Self, WalkersError> {
        let minimize = config.minimize;
        let mut base = SimpleWalkers::new(config, env_spec, model_spec)?;
        base.states.best = BestWalker::unset(minimize);
        Ok(Self {
            base,
            critic: None,
            diagnostics: EntropyDiagnostics::UNAVAILABLE,
        })
    }

    /// Attach a critic that reweights the virtual reward.
    pub fn with_critic<C: Critic + 'static>(mut self, critic: C) -> Self {
        self.critic = Some(Box::new(critic));
        self
    }

    /// Replace the default Euclidean distance.
    pub fn with_distance_function<D: DistanceFunction + 'static>(mut self, distance: D) -> Self {
        self.base = self.base.with_distance_function(distance);
        self
    }

    #[inline]
    pub fn minimize(&self) -> bool {
        self.base.config.minimize
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.base.n()
    }

    #[inline]
    pub fn n_iters(&self) -> usize {
        self.base.n_iters()
    }

    pub fn has_critic(&self) -> bool {
        self.critic.is_some()
    }

    pub fn base(&self) -> &SimpleWalkers {
        &self.base
    }

    pub fn config(&self) -> &WalkersConfig {
        self.base.config()
    }

    pub fn states(&self) -> &WalkerStates {
        self.base.states()
    }

    pub fn states_mut(&mut self) -> &mut WalkerStates {
        self.base.states_mut()
    }

    pub fn env_states(&self) -> &States {
        self.base.env_states()
    }

    pub fn model_states(&self) -> &States {
        self.base.model_states()
    }

    pub fn best(&self) -> &BestWalker {
        &self.base.states.best
    }

    pub fn diagnostics(&self) -> EntropyDiagnostics {
        self.diagnostics
    }

    /// Share of the virtual reward signal attributable to diversity.
    ///
    /// NaN before the first virtual reward and after an iteration whose
    /// scores could not be normalized.
    pub fn efficiency(&self) -> f64 {
        self.diagnostics.efficiency
    }

    pub fn ids(&self) -> Result<Vec<u64>, StateError> {
        self.base.ids()
    }

    pub fn update_ids(&mut self) -> Result<(), WalkersError> {
        self.base.update_ids()
    }

    pub fn update_states(&mut self, update: StatesUpdate<'_>) -> Result<(), WalkersError> {
        self.base.update_states(update)
    }

    pub fn calculate_end_condition(&self) -> bool {
        self.base.calculate_end_condition()
    }

    pub fn calculate_distances(&mut self) -> Result<(), WalkersError> {
        self.base.calculate_distances()
    }

    pub fn update_clone_probs(&mut self) {
        self.base.update_clone_probs()
    }

    pub fn clone_walkers(&mut self) -> Result<(), WalkersError> {
        self.base.clone_walkers()
    }

    /// Virtual reward on the signed objective, reweighted by the critic.
    pub fn calculate_virtual_reward(&mut self) -> Result<(), WalkersError> {
        signed_virtual_reward(&mut self.base, &mut self.critic, &mut self.diagnostics)
    }

    /// Record the best alive walker if it beats the best found so far.
    ///
    /// Ties go to the lowest index. Dead walkers are never recorded.
    pub fn update_best(&mut self) -> Result<(), WalkersError> {
        let minimize = self.minimize();
        let improves = |a: f64, b: f64| if minimize { a < b } else { a > b };
        let states = &self.base.states;

        let mut best_ix: Option<usize> = None;
        for (i, (&reward, &dead)) in states
            .cum_rewards
            .iter()
            .zip(&states.end_condition)
            .enumerate()
        {
            if dead {
                continue;
            }
            match best_ix {
                Some(b) if !improves(reward, states.cum_rewards[b]) => {}
                _ => best_ix = Some(i),
            }
        }

        let Some(ix) = best_ix else {
            trace!("no walker alive, best solution unchanged");
            return Ok(());
        };
        let reward = states.cum_rewards[ix];
        if !improves(reward, states.best.reward) {
            return Ok(());
        }

        let env = &self.base.env_states;
        let best = BestWalker {
            reward,
            observs: env.row("observs", ix)?.to_vec(),
            state: env.row("states", ix)?.to_vec(),
            id: Some(states.id_walkers[ix]),
        };
        self.base.states.best = best;
        Ok(())
    }

    /// One balance iteration: track the best walker, clone, then update the critic.
    pub fn balance(&mut self) -> Result<Lineages, WalkersError> {
        self.update_best()?;

        let critic = &mut self.critic;
        let diagnostics = &mut self.diagnostics;
        let lineages = self
            .base
            .balance_with(|base| signed_virtual_reward(base, critic, diagnostics))?;

        if let Some(critic) = self.critic.as_mut() {
            let base = &self.base;
            let scores = critic.update(&base.states, &base.model_states, &base.env_states);
            self.store_critic_score(scores)?;
        }
        Ok(lineages)
    }

    /// Write the best solution found into the last walker.
    ///
    /// Consumers can read the answer from slot `n - 1` once the run halts.
    /// Does nothing until a best walker has been recorded.
    pub fn fix_best(&mut self) -> Result<(), WalkersError> {
        let best = &self.base.states.best;
        let Some(id) = best.id else {
            return Ok(());
        };
        let last = self.n() - 1;
        let (reward, observs, state) = (best.reward, best.observs.clone(), best.state.clone());

        self.base.env_states.set_row("observs", last, &observs)?;
        self.base.env_states.set_row("states", last, &state)?;
        self.base.states.cum_rewards[last] = reward;
        self.base.states.id_walkers[last] = id;
        Ok(())
    }

    /// Restart for a new search.
    ///
    /// The best record starts at `±inf` with the observation and state of
    /// the environment's best-by-reward walker.
    pub fn reset(
        &mut self,
        env_states: Option<&States>,
        model_states: Option<&States>,
        walker_states: Option<WalkerStates>,
    ) -> Result<(), WalkersError> {
        self.base.reset(env_states, model_states, walker_states)?;
        self.diagnostics = EntropyDiagnostics::UNAVAILABLE;

        let minimize = self.minimize();
        let env = &self.base.env_states;
        let rewards = env.scalars("rewards")?;
        let ix = (0..rewards.len()).fold(0, |best, i| {
            let better = if minimize {
                rewards[i] < rewards[best]
            } else {
                rewards[i] > rewards[best]
            };
            if better { i } else { best }
        });
        let best = BestWalker {
            observs: env.row("observs", ix)?.to_vec(),
            state: env.row("states", ix)?.to_vec(),
            ..BestWalker::unset(minimize)
        };
        self.base.states.best = best;

        if let Some(critic) = self.critic.as_mut() {
            let base = &self.base;
            let scores = critic.reset(&base.states, &base.model_states, &base.env_states);
            self.store_critic_score(scores)?;
        }
        Ok(())
    }

    fn store_critic_score(&mut self, scores: Vec<f64>) -> Result<(), WalkersError> {
        check_critic_len(self.n(), &scores)?;
        self.base.states.critic_score = scores;
        Ok(())
    }
}

fn check_critic_len(n: usize, scores: &[f64]) -> Result<(), WalkersError> {
    if scores.len() != n {
        return Err(WalkersError::CriticScore {
            expected: n,
            found: scores.len(),
        });
    }
    Ok(())
}

/// Virtual reward step of [`Walkers`].
fn signed_virtual_reward(
    base: &mut SimpleWalkers,
    critic: &mut Option<Box<dyn Critic>>,
    diagnostics: &mut EntropyDiagnostics,
) -> Result<(), WalkersError> {
    let objective: Vec<f64> = if base.config.minimize {
        base.states.cum_rewards.iter().map(|r| -r).collect()
    } else {
        base.states.cum_rewards.clone()
    };
    let vr = VirtualReward::compute(
        &objective,
        &base.states.distances,
        base.config.reward_scale,
        base.config.dist_scale,
    );
    *diagnostics = EntropyDiagnostics::from_scores(&vr.score_reward, &vr.score_dist)
        .unwrap_or_else(|| {
            trace!("scores cannot be normalized, entropy diagnostics unavailable");
            EntropyDiagnostics::UNAVAILABLE
        });
    base.states.processed_rewards = vr.processed_rewards;
    base.states.virtual_rewards = vr.virtual_rewards;

    if let Some(critic) = critic.as_mut() {
        let scores = critic.calculate(&base.states, &base.model_states, &base.env_states);
        check_critic_len(base.n(), &scores)?;
        for (v, s) in base.states.virtual_rewards.iter_mut().zip(&scores) {
            *v *= s;
        }
        base.states.critic_score = scores;
    }
    Ok(())
}

impl fmt::Display for Walkers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "\nBest reward found: {:.4} , efficiency {:.3}, Critic: {}",
            self.best().reward,
            self.efficiency(),
            if self.has_critic() { "yes" } else { "none" },
        )?;
        self.base.write_summary(f, "Walkers")
    }
}
