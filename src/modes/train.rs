//! Training mode
//!
//! Drives any [`Algorithm`] against any discrete [`Environment`]: one
//! `act → step → observe` round per environment step, periodic progress
//! logs and checkpoints, and a final save.
//!
//! # Example
//!
//! ```rust,no_run
//! use playground_rl::game::{GridWorld, GridWorldConfig};
//! use playground_rl::modes::{TrainConfig, TrainMode};
//! use playground_rl::rl::{PpoAlgorithm, PpoConfig, TrainingBackend, default_device};
//! use std::path::PathBuf;
//!
//! let env = GridWorld::new(GridWorldConfig::default());
//! let ppo = PpoAlgorithm::<TrainingBackend>::new(PpoConfig::default(), default_device());
//! let config = TrainConfig::new(500, Some(PathBuf::from("models/ppo.bin")));
//!
//! let mut train_mode = TrainMode::new(ppo, env, config)?;
//! train_mode.run()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::metrics::TrainingStats;
use crate::rl::{Algorithm, Environment, Lifecycle, TrainBatch, save_checkpoint};

/// Configuration for training mode
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of episodes to train
    pub num_episodes: usize,

    /// Where to save the final weights; `None` skips every save
    pub save_path: Option<PathBuf>,

    /// Save a checkpoint every N episodes (0 disables)
    pub checkpoint_frequency: usize,

    /// Log training progress every N episodes (0 disables)
    pub log_frequency: usize,

    /// Seed passed to `init` when the algorithm is not initialized yet
    pub seed: String,

    /// Mark the last transition of each episode as a flush, forcing an
    /// on-policy update at episode boundaries
    pub flush_on_episode_end: bool,
}

impl TrainConfig {
    /// Create a training configuration with defaults
    ///
    /// # Example
    ///
    /// ```rust
    /// use playground_rl::modes::TrainConfig;
    /// use std::path::PathBuf;
    ///
    /// let config = TrainConfig::new(1000, Some(PathBuf::from("models/agent.bin")));
    /// assert_eq!(config.log_frequency, 100);
    /// ```
    pub fn new(num_episodes: usize, save_path: Option<PathBuf>) -> Self {
        Self {
            num_episodes,
            save_path,
            checkpoint_frequency: 1000,
            log_frequency: 100,
            seed: "0".to_string(),
            flush_on_episode_end: false,
        }
    }
}

/// Outcome of one episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub reward: f32,
    pub steps: usize,
    /// Ended by termination with a positive final reward
    pub success: bool,
}

/// Training loop over one algorithm and one environment
pub struct TrainMode<A: Algorithm, E: Environment> {
    algorithm: A,
    env: E,
    stats: TrainingStats,
    config: TrainConfig,
    current_episode: usize,
    /// `Algorithm::training_updates` already folded into `stats`
    seen_updates: usize,
}

impl<A: Algorithm, E: Environment> TrainMode<A, E> {
    /// Create a training mode, initializing `algorithm` for `env` if needed
    ///
    /// An algorithm that is already initialized (for instance from a
    /// checkpoint) is trained further as-is.
    pub fn new(mut algorithm: A, env: E, config: TrainConfig) -> Result<Self> {
        if matches!(
            algorithm.lifecycle(),
            Lifecycle::Uninitialized | Lifecycle::Disposed
        ) {
            algorithm
                .init(&env.observation_shape(), env.action_size(), &config.seed)
                .with_context(|| format!("Failed to initialize {}", algorithm.name()))?;
        }
        let seen_updates = algorithm.training_updates();

        Ok(Self {
            algorithm,
            env,
            stats: TrainingStats::new(100),
            config,
            current_episode: 0,
            seen_updates,
        })
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Hand the trained algorithm back to the caller
    pub fn into_algorithm(self) -> A {
        self.algorithm
    }

    /// Run every configured episode, then save the final weights
    pub fn run(&mut self) -> Result<&TrainingStats> {
        self.log_header();

        for episode in 0..self.config.num_episodes {
            self.current_episode = episode;

            let summary = self.run_episode()?;
            self.stats
                .record_episode(summary.reward, summary.steps, summary.success);

            if is_multiple(episode + 1, self.config.log_frequency) {
                info!(
                    "[Episode {}/{}] {}",
                    episode + 1,
                    self.config.num_episodes,
                    self.stats.format_summary()
                );
            }

            if is_multiple(episode + 1, self.config.checkpoint_frequency) {
                self.save_checkpoint()?;
            }
        }

        if let Some(path) = &self.config.save_path {
            self.save_to(path)
                .with_context(|| format!("Failed to save final model to {:?}", path))?;
            info!(path = %path.display(), "final model saved");
        }
        info!("Training complete: {}", self.stats.format_summary());

        Ok(&self.stats)
    }

    /// Run one training episode
    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        let mut obs = self.env.reset();
        let mut summary = EpisodeSummary {
            reward: 0.0,
            steps: 0,
            success: false,
        };

        loop {
            let action = self.algorithm.act(&obs)?;
            let index = action
                .as_discrete()
                .context("environment needs a discrete action")?;
            let outcome = self.env.step(index);
            let done = outcome.is_done();

            let mut batch = TrainBatch::new();
            batch.push(
                &obs,
                &action.to_vec(),
                outcome.reward,
                &outcome.observation,
                done,
            );
            self.algorithm
                .observe(&batch.with_flush(done && self.config.flush_on_episode_end))?;
            self.record_new_updates();

            summary.reward += outcome.reward;
            summary.steps += 1;
            if done {
                summary.success = outcome.terminated && outcome.reward > 0.0;
                return Ok(summary);
            }
            obs = outcome.observation;
        }
    }

    /// Fold diagnostics of updates run since the last check into the stats
    fn record_new_updates(&mut self) {
        let updates = self.algorithm.training_updates();
        if updates > self.seen_updates {
            if let Some(diagnostics) = self.algorithm.diagnostics() {
                self.stats.record_update(diagnostics);
            }
            self.seen_updates = updates;
        }
    }

    fn save_checkpoint(&self) -> Result<()> {
        let Some(save_path) = &self.config.save_path else {
            return Ok(());
        };
        let checkpoint_path = save_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("checkpoint_ep{}.bin", self.current_episode + 1));

        self.save_to(&checkpoint_path)
            .with_context(|| format!("Failed to save checkpoint to {:?}", checkpoint_path))
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        save_checkpoint(
            &self.algorithm,
            &self.env.observation_shape(),
            self.env.action_size(),
            path,
        )
    }

    fn log_header(&self) {
        info!(
            algorithm = self.algorithm.name(),
            episodes = self.config.num_episodes,
            obs_shape = ?self.env.observation_shape(),
            action_size = self.env.action_size(),
            "training started"
        );
        info!(hyperparameters = %self.algorithm.hyperparameters(), "configuration");
        if let Some(path) = &self.config.save_path {
            info!(
                path = %path.display(),
                checkpoint_frequency = self.config.checkpoint_frequency,
                "saving enabled"
            );
        }
    }
}

fn is_multiple(count: usize, frequency: usize) -> bool {
    frequency > 0 && count % frequency == 0
}
