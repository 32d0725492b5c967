//! Algorithm hyperparameter configuration
//!
//! Keys serialize in camelCase, so a JSON config file uses the same option
//! names as the lifecycle API (`clipRange`, `rolloutLength`, ...). Missing
//! keys take their defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the PPO policy network output is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyHead {
    /// Logits over discrete actions
    #[default]
    Categorical,
    /// Per-dimension means with a learned log standard deviation
    Gaussian,
}

/// Configuration for PPO (clipped-surrogate actor-critic)
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::PpoConfig;
///
/// let config = PpoConfig {
///     rollout_length: 256,
///     mini_batch_size: 32,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PpoConfig {
    /// Adam step size
    ///
    /// Default: 3e-4
    pub learning_rate: f64,

    /// Discount factor, used by the built-in GAE fallback
    ///
    /// Default: 0.99
    pub gamma: f32,

    /// GAE λ, used when the caller does not supply advantages/returns
    ///
    /// Default: 0.95
    pub gae_lambda: f32,

    /// Surrogate and value clip width ε
    ///
    /// Default: 0.2
    pub clip_range: f32,

    /// Entropy bonus weight
    ///
    /// Default: 0.01
    pub entropy_coeff: f32,

    /// Value loss weight
    ///
    /// Default: 0.5
    pub value_coeff: f32,

    /// Transitions collected before an update
    ///
    /// Default: 2048
    pub rollout_length: usize,

    /// SGD minibatch size
    ///
    /// Default: 64
    pub mini_batch_size: usize,

    /// Passes over one rollout
    ///
    /// Default: 10
    pub epochs: usize,

    /// Use the clipped value objective
    ///
    /// Default: false
    pub clip_value_loss: bool,

    /// Global gradient-norm clip, 0 disables
    ///
    /// Default: 0.5
    pub max_grad_norm: f32,

    /// Normalize advantages per update
    ///
    /// Default: true
    pub normalize_advantages: bool,

    /// Abort the whole update once approximate KL exceeds this, 0 disables
    ///
    /// Default: 0.0
    #[serde(rename = "targetKL")]
    pub target_kl: f32,

    /// Hidden layer widths shared by the policy and value networks
    ///
    /// Default: [64, 64]
    pub hidden_sizes: Vec<usize>,

    /// Discrete or continuous action space
    pub policy_head: PolicyHead,
}

impl PpoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        read_json(path)
    }

    /// Check that all hyperparameters are in valid ranges
    ///
    /// # Returns
    ///
    /// `Ok(())` if all parameters are valid, `Err(String)` naming the first
    /// offending parameter otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(format!(
                "learningRate must be positive, got {}",
                self.learning_rate
            ));
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must be in [0, 1], got {}", self.gamma));
        }

        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(format!(
                "gaeLambda must be in [0, 1], got {}",
                self.gae_lambda
            ));
        }

        if self.clip_range <= 0.0 || self.clip_range > 1.0 {
            return Err(format!(
                "clipRange must be in (0, 1], got {}",
                self.clip_range
            ));
        }

        if self.entropy_coeff < 0.0 {
            return Err(format!(
                "entropyCoeff must be non-negative, got {}",
                self.entropy_coeff
            ));
        }

        if self.value_coeff < 0.0 {
            return Err(format!(
                "valueCoeff must be non-negative, got {}",
                self.value_coeff
            ));
        }

        if self.max_grad_norm < 0.0 {
            return Err(format!(
                "maxGradNorm must be non-negative, got {}",
                self.max_grad_norm
            ));
        }

        if self.target_kl < 0.0 {
            return Err(format!(
                "targetKL must be non-negative, got {}",
                self.target_kl
            ));
        }

        if self.epochs == 0 {
            return Err("epochs must be at least 1".to_string());
        }

        if self.mini_batch_size == 0 {
            return Err("miniBatchSize must be at least 1".to_string());
        }

        if self.rollout_length == 0 {
            return Err("rolloutLength must be at least 1".to_string());
        }

        if self.mini_batch_size > self.rollout_length {
            return Err(format!(
                "miniBatchSize ({}) cannot exceed rolloutLength ({})",
                self.mini_batch_size, self.rollout_length
            ));
        }

        validate_hidden_sizes(&self.hidden_sizes)
    }
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            entropy_coeff: 0.01,
            value_coeff: 0.5,
            rollout_length: 2048,
            mini_batch_size: 64,
            epochs: 10,
            clip_value_loss: false,
            max_grad_norm: 0.5,
            normalize_advantages: true,
            target_kl: 0.0,
            hidden_sizes: vec![64, 64],
            policy_head: PolicyHead::Categorical,
        }
    }
}

/// Configuration for DQN (value-based, off-policy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DqnConfig {
    /// Adam step size
    ///
    /// Default: 1e-3
    pub learning_rate: f64,

    /// Discount factor
    ///
    /// Default: 0.99
    pub gamma: f32,

    /// Exploration rate at step 0
    ///
    /// Default: 1.0
    pub epsilon_start: f32,

    /// Exploration rate after decay
    ///
    /// Default: 0.01
    pub epsilon_final: f32,

    /// Steps over which epsilon decays linearly
    ///
    /// Default: 10000
    pub epsilon_decay_steps: u64,

    /// Replay capacity
    ///
    /// Default: 100000
    pub buffer_size: usize,

    /// Replay occupancy required before training starts
    ///
    /// Default: 1000
    pub min_buffer_before_training: usize,

    /// Observed transitions between hard target syncs
    ///
    /// Default: 1000
    pub target_update_frequency: u64,

    /// Replay sample size per update
    ///
    /// Default: 32
    pub batch_size: usize,

    /// Hidden layer widths of the Q-network
    ///
    /// Default: [64, 64]
    pub hidden_sizes: Vec<usize>,
}

impl DqnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        read_json(path)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(format!(
                "learningRate must be positive, got {}",
                self.learning_rate
            ));
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must be in [0, 1], got {}", self.gamma));
        }

        for (name, value) in [
            ("epsilonStart", self.epsilon_start),
            ("epsilonFinal", self.epsilon_final),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be in [0, 1], got {value}"));
            }
        }

        if self.buffer_size == 0 {
            return Err("bufferSize must be at least 1".to_string());
        }

        if self.batch_size == 0 {
            return Err("batchSize must be at least 1".to_string());
        }

        if self.target_update_frequency == 0 {
            return Err("targetUpdateFrequency must be at least 1".to_string());
        }

        if self.min_buffer_before_training > self.buffer_size {
            return Err(format!(
                "minBufferBeforeTraining ({}) cannot exceed bufferSize ({})",
                self.min_buffer_before_training, self.buffer_size
            ));
        }

        validate_hidden_sizes(&self.hidden_sizes)
    }
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_final: 0.01,
            epsilon_decay_steps: 10_000,
            buffer_size: 100_000,
            min_buffer_before_training: 1_000,
            target_update_frequency: 1_000,
            batch_size: 32,
            hidden_sizes: vec![64, 64],
        }
    }
}

fn validate_hidden_sizes(hidden_sizes: &[usize]) -> Result<(), String> {
    if hidden_sizes.contains(&0) {
        return Err(format!(
            "hiddenSizes entries must be positive, got {hidden_sizes:?}"
        ));
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse config {:?}", path))
}
