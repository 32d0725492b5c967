//! Evaluation mode for trained agents
//!
//! Plays episodes with a loaded algorithm without feeding anything back, so
//! the weights and buffers stay untouched.

use anyhow::{Context, Result};
use std::fmt::Display;
use tracing::{debug, info};

use super::train::EpisodeSummary;
use crate::metrics::TrainingStats;
use crate::rl::{Algorithm, Environment, Lifecycle};

/// Runs an algorithm's policy against an environment
pub struct EvaluateMode<A: Algorithm, E: Environment> {
    algorithm: A,
    env: E,
    stats: TrainingStats,
}

impl<A: Algorithm, E: Environment> EvaluateMode<A, E> {
    /// Wrap an initialized algorithm, usually restored with `load_checkpoint`
    pub fn new(algorithm: A, env: E) -> Result<Self> {
        if matches!(
            algorithm.lifecycle(),
            Lifecycle::Uninitialized | Lifecycle::Disposed
        ) {
            anyhow::bail!("{} must be initialized before evaluation", algorithm.name());
        }
        Ok(Self {
            algorithm,
            env,
            stats: TrainingStats::new(100),
        })
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Play `episodes` episodes and return the accumulated statistics
    pub fn run(&mut self, episodes: usize) -> Result<&TrainingStats> {
        for episode in 0..episodes {
            let summary = self.run_episode()?;
            self.stats
                .record_episode(summary.reward, summary.steps, summary.success);
            info!(
                episode = episode + 1,
                reward = summary.reward,
                steps = summary.steps,
                success = summary.success,
                "episode finished"
            );
        }
        info!("Evaluation complete: {}", self.stats.format_summary());
        Ok(&self.stats)
    }

    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        self.play_episode(|_, _, _| {})
    }

    /// Play one episode, calling `on_step` with the environment after each step
    fn play_episode(&mut self, mut on_step: impl FnMut(&E, usize, f32)) -> Result<EpisodeSummary> {
        let mut obs = self.env.reset();
        let mut summary = EpisodeSummary {
            reward: 0.0,
            steps: 0,
            success: false,
        };

        loop {
            let action = self
                .algorithm
                .act(&obs)?
                .as_discrete()
                .context("environment needs a discrete action")?;
            let outcome = self.env.step(action);
            on_step(&self.env, action, outcome.reward);

            summary.reward += outcome.reward;
            summary.steps += 1;
            if outcome.is_done() {
                summary.success = outcome.terminated && outcome.reward > 0.0;
                return Ok(summary);
            }
            obs = outcome.observation;
        }
    }
}

impl<A: Algorithm, E: Environment + Display> EvaluateMode<A, E> {
    /// Like [`EvaluateMode::run_episode`], logging every frame at debug level
    pub fn run_rendered_episode(&mut self) -> Result<EpisodeSummary> {
        let mut step = 0;
        self.play_episode(|env, action, reward| {
            step += 1;
            debug!(step, action, reward, "\n{}", env);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GridWorld, GridWorldConfig};
    use crate::rl::{DqnAlgorithm, DqnConfig, PpoAlgorithm, PpoConfig, TrainingBackend, default_device};

    #[test]
    fn test_requires_initialized_algorithm() {
        let ppo = PpoAlgorithm::<TrainingBackend>::new(PpoConfig::default(), default_device());
        let env = GridWorld::new(GridWorldConfig::small());
        assert!(EvaluateMode::new(ppo, env).is_err());
    }

    #[test]
    fn test_evaluation_does_not_buffer() {
        let config = DqnConfig {
            min_buffer_before_training: 2,
            hidden_sizes: vec![8],
            ..Default::default()
        };
        let mut dqn = DqnAlgorithm::<TrainingBackend>::new(config, default_device());
        dqn.init(&[5], 4, "3").unwrap();
        let env = GridWorld::new(GridWorldConfig::small());

        let mut evaluate = EvaluateMode::new(dqn, env).unwrap();
        let stats = evaluate.run(2).unwrap();
        assert_eq!(stats.total_episodes(), 2);
        assert_eq!(stats.total_updates(), 0);
        assert_eq!(evaluate.algorithm.replay_len(), 0);
        assert_eq!(evaluate.algorithm.step_count(), 0);
    }

    #[test]
    fn test_rendered_episode_matches_bounds() {
        let mut ppo = PpoAlgorithm::<TrainingBackend>::new(
            PpoConfig {
                hidden_sizes: vec![8],
                ..Default::default()
            },
            default_device(),
        );
        ppo.init(&[5], 4, "5").unwrap();
        let mut evaluate = EvaluateMode::new(ppo, GridWorld::new(GridWorldConfig::small())).unwrap();

        let summary = evaluate.run_rendered_episode().unwrap();
        assert!(summary.steps >= 1);
        assert!(summary.steps <= GridWorldConfig::small().max_steps);
    }
}
