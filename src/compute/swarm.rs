//! Search loop driving the walkers through an environment.

use std::time::Instant;

use log::info;

use crate::compute::critic::Critic;
use crate::compute::env::{EnvError, Environment};
use crate::compute::model::{Model, ModelError};
use crate::compute::walkers::{Lineages, StatesUpdate, Walkers, WalkersError};
use crate::schema::{ConfigError, StopReason, SwarmProgress, SwarmResult, WalkersConfig};

/// Errors raised while running a swarm.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Walkers error: {0}")]
    Walkers(#[from] WalkersError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),
}

/// Walkers, an environment and a model stepping together.
pub struct Swarm<E, M> {
    walkers: Walkers,
    env: E,
    model: M,
}

impl<E: Environment, M: Model> Swarm<E, M> {
    /// Create a swarm. State specs are taken from the environment and the model.
    pub fn new(config: WalkersConfig, env: E, model: M) -> Result<Self, SwarmError> {
        let walkers = Walkers::new(config, &env.state_spec(), &model.state_spec())?;
        Ok(Self {
            walkers,
            env,
            model,
        })
    }

    /// Reweight the virtual reward with a critic.
    pub fn with_critic<C: Critic + 'static>(mut self, critic: C) -> Self {
        self.walkers = self.walkers.with_critic(critic);
        self
    }

    pub fn walkers(&self) -> &Walkers {
        &self.walkers
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Draw fresh environment and model states and reset the walkers.
    pub fn reset(&mut self) -> Result<(), SwarmError> {
        let n = self.walkers.n();
        let env_states = self.env.reset(n)?;
        let model_states = self.model.reset(n, None)?;
        self.walkers
            .reset(Some(&env_states), Some(&model_states), None)?;
        Ok(())
    }

    /// Sample actions, step the environment and feed the result to the walkers.
    pub fn step_walkers(&mut self) -> Result<(), SwarmError> {
        let model_states = self.model.predict(
            None,
            Some(self.walkers.model_states()),
            Some(self.walkers.env_states()),
        )?;
        let env_states = self.env.step(&model_states, self.walkers.env_states())?;
        self.walkers.update_states(StatesUpdate {
            env_states: Some(&env_states),
            model_states: Some(&model_states),
            ..Default::default()
        })?;
        self.walkers.update_ids()?;
        Ok(())
    }

    /// One search iteration: step then balance.
    pub fn run_step(&mut self) -> Result<Lineages, SwarmError> {
        self.step_walkers()?;
        Ok(self.walkers.balance()?)
    }

    /// Current progress.
    pub fn progress(&self) -> SwarmProgress {
        let states = self.walkers.states();
        let n = self.walkers.n() as f64;
        SwarmProgress {
            iteration: self.walkers.n_iters(),
            best_reward: self.walkers.best().reward,
            efficiency: self.walkers.efficiency(),
            dead_fraction: states.n_dead() as f64 / n,
            cloned_fraction: states.n_cloned() as f64 / n,
        }
    }

    fn should_stop(&self) -> Option<StopReason> {
        if !self.walkers.calculate_end_condition() {
            return None;
        }
        if self.walkers.states().end_condition.iter().all(|&e| e) {
            Some(StopReason::AllDead)
        } else {
            Some(StopReason::MaxIters)
        }
    }

    /// Run until the walkers stop, reporting progress after every iteration.
    ///
    /// The best solution is written into the last walker before returning.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<SwarmResult, SwarmError>
    where
        F: FnMut(&SwarmProgress),
    {
        let start_time = Instant::now();
        info!(
            "Starting swarm with {} walkers, max_iters {:?}",
            self.walkers.n(),
            self.walkers.config().max_iters
        );

        self.reset()?;
        callback(&self.progress());

        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }
            self.run_step()?;
            callback(&self.progress());
        };
        self.walkers.fix_best()?;

        let elapsed = start_time.elapsed().as_secs_f64();
        let best = self.walkers.best();
        info!(
            "Swarm stopped ({:?}) after {} iterations in {:.2}s, best reward {:.6}",
            stop_reason,
            self.walkers.n_iters(),
            elapsed,
            best.reward
        );

        Ok(SwarmResult {
            best_reward: best.reward,
            best_observation: best.observs.clone(),
            iterations: self.walkers.n_iters(),
            elapsed_seconds: elapsed,
            stop_reason,
        })
    }

    /// Run to completion.
    pub fn run(&mut self) -> Result<SwarmResult, SwarmError> {
        self.run_with_callback(|_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::env::{FunctionEnv, sphere};
    use crate::compute::model::{Bounds, ContinuousUniform};
    use crate::compute::states::{Attribute, States};
    use crate::compute::walkers::WalkerStates;
    use crate::schema::{Landscape, StateSpec};

    fn config(max_iters: usize, seed: u64) -> WalkersConfig {
        WalkersConfig {
            n_walkers: 32,
            max_iters: Some(max_iters),
            accumulate_rewards: false,
            minimize: true,
            random_seed: Some(seed),
            ..Default::default()
        }
    }

    fn sphere_swarm(max_iters: usize, seed: u64) -> Swarm<FunctionEnv, ContinuousUniform> {
        let env = FunctionEnv::from_landscape(
            Landscape::Sphere,
            Bounds::uniform(2, -5.0, 5.0).unwrap(),
        )
        .with_seed(seed);
        let model =
            ContinuousUniform::new(Bounds::uniform(2, -0.5, 0.5).unwrap()).with_seed(seed + 1);
        Swarm::new(config(max_iters, seed), env, model).unwrap()
    }

    /// Every step terminates every walker.
    struct Cliff;

    impl Environment for Cliff {
        fn state_spec(&self) -> StateSpec {
            crate::schema::env_state_spec(1, 1)
        }

        fn reset(&mut self, batch_size: usize) -> Result<States, EnvError> {
            cliff_states(batch_size, false)
        }

        fn step(&mut self, _: &States, env_states: &States) -> Result<States, EnvError> {
            cliff_states(env_states.len(), true)
        }
    }

    fn cliff_states(n: usize, ended: bool) -> Result<States, EnvError> {
        let points: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Ok(States::new(n)
            .with(
                "observs",
                Attribute::Rows {
                    data: points.clone(),
                    width: 1,
                },
            )?
            .with(
                "states",
                Attribute::Rows {
                    data: points.clone(),
                    width: 1,
                },
            )?
            .with("rewards", Attribute::Scalars(points))?
            .with("ends", Attribute::Flags(vec![ended; n]))?)
    }

    struct Halving;

    impl Critic for Halving {
        fn calculate(&mut self, walkers: &WalkerStates, _: &States, _: &States) -> Vec<f64> {
            vec![0.5; walkers.len()]
        }
    }

    #[test]
    fn test_swarm_improves_sphere() {
        let mut swarm = sphere_swarm(60, 7);
        let mut history = Vec::new();
        let result = swarm.run_with_callback(|p| history.push(p.best_reward)).unwrap();

        assert_eq!(result.stop_reason, StopReason::MaxIters);
        assert_eq!(result.iterations, 60);
        assert_eq!(history.len(), 61);
        // best reward never gets worse when minimizing
        assert!(history.windows(2).all(|w| w[1] <= w[0]));
        assert!(result.best_reward.is_finite());
        assert!((sphere(&result.best_observation) - result.best_reward).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_best_in_last_walker() {
        let mut swarm = sphere_swarm(20, 3);
        let result = swarm.run().unwrap();
        let walkers = swarm.walkers();
        let last = walkers.n() - 1;
        assert_eq!(walkers.states().cum_rewards[last], result.best_reward);
        assert_eq!(
            walkers.env_states().row("observs", last).unwrap(),
            result.best_observation.as_slice()
        );
    }

    #[test]
    fn test_same_seed_same_run() {
        let a = sphere_swarm(25, 11).run().unwrap();
        let b = sphere_swarm(25, 11).run().unwrap();
        assert_eq!(a.best_reward, b.best_reward);
        assert_eq!(a.best_observation, b.best_observation);
    }

    #[test]
    fn test_population_size_is_stable() {
        let mut swarm = sphere_swarm(10, 5);
        swarm.reset().unwrap();
        for _ in 0..10 {
            swarm.run_step().unwrap();
            assert!(swarm.walkers().states().validate(32).is_ok());
            assert_eq!(swarm.walkers().env_states().len(), 32);
        }
    }

    #[test]
    fn test_all_dead_stops() {
        let model = ContinuousUniform::new(Bounds::uniform(1, -1.0, 1.0).unwrap()).with_seed(1);
        let mut swarm = Swarm::new(config(100, 1), Cliff, model).unwrap();
        let result = swarm.run().unwrap();
        assert_eq!(result.stop_reason, StopReason::AllDead);
        assert_eq!(result.iterations, 1);
        assert_eq!(swarm.progress().dead_fraction, 1.0);
    }

    #[test]
    fn test_swarm_with_critic() {
        let mut swarm = sphere_swarm(10, 9).with_critic(Halving);
        assert!(swarm.walkers().has_critic());
        let result = swarm.run().unwrap();
        assert_eq!(result.iterations, 10);
        assert!(
            swarm
                .walkers()
                .states()
                .critic_score
                .iter()
                .all(|&s| s == 0.5)
        );
    }
}
