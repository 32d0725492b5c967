//! Lifecycle contract shared by PPO and DQN
//!
//! An external harness drives an algorithm as
//!
//! ```text
//! init → (act → observe)* → save/load → dispose
//! ```
//!
//! `observe` is where buffering and, conditionally, a training update
//! happen. Every call before `init` or after `dispose` fails with
//! [`RlError::NotInitialized`](super::RlError::NotInitialized).

use super::batch::{Action, TrainBatch};
use super::codec::checked_numel;
use super::error::{Result, RlError};
use serde::Serialize;

/// Where an algorithm instance is in its lifecycle
///
/// Training runs to completion inside `observe`, so it is never observable
/// from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Uninitialized,
    /// Initialized with nothing buffered for the next update
    Ready,
    /// Transitions are buffered toward the next update
    Collecting,
    Disposed,
}

/// Snapshot of the most recent training update
///
/// Overwritten by every update, never accumulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Total loss of the final minibatch
    pub loss: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    pub learning_rate: f64,
    /// Gradient steps applied during the update
    pub gradient_steps: usize,
    /// Whether the KL threshold cut the update short
    pub early_stopped: bool,
}

/// A trainable agent driven through the lifecycle above
pub trait Algorithm {
    /// Short identifier, stored in checkpoint metadata
    fn name(&self) -> &'static str;

    /// Build networks, seed the RNG, and reset buffers
    ///
    /// `seed` may be any string; decimal strings are used as-is, anything
    /// else is hashed.
    fn init(&mut self, obs_shape: &[usize], action_size: usize, seed: &str) -> Result<()>;

    /// Choose an action for one observation
    fn act(&mut self, observation: &[f32]) -> Result<Action>;

    /// Feed back transitions; may run a training update
    fn observe(&mut self, batch: &TrainBatch) -> Result<()>;

    /// Serialize the network parameters
    fn save(&self) -> Result<Vec<u8>>;

    /// Restore parameters written by [`Algorithm::save`]
    fn load(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release networks, optimizer and buffers
    fn dispose(&mut self);

    fn lifecycle(&self) -> Lifecycle;

    /// Diagnostics of the last training update, if any ran
    fn diagnostics(&self) -> Option<&Diagnostics>;

    /// Training updates run since `init`
    fn training_updates(&self) -> usize;

    /// Hyperparameters as JSON, for checkpoint metadata
    fn hyperparameters(&self) -> serde_json::Value;
}

/// Flattened observation size, rejecting empty shapes and action spaces
pub(crate) fn validate_init_shapes(obs_shape: &[usize], action_size: usize) -> Result<usize> {
    let obs_size = checked_numel(obs_shape).ok_or_else(|| {
        RlError::InvalidConfig(format!("observation shape {obs_shape:?} overflows"))
    })?;
    if obs_shape.is_empty() || obs_size == 0 {
        return Err(RlError::InvalidConfig(format!(
            "observation shape {obs_shape:?} has no elements"
        )));
    }
    if action_size == 0 {
        return Err(RlError::InvalidConfig(
            "action size must be at least 1".to_string(),
        ));
    }
    Ok(obs_size)
}

pub(crate) fn check_observation(observation: &[f32], obs_size: usize) -> Result<()> {
    if observation.len() != obs_size {
        return Err(RlError::ObservationSize {
            expected: obs_size,
            found: observation.len(),
        });
    }
    Ok(())
}
