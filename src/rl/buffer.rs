//! Rollout buffer for on-policy trajectory collection
//!
//! This module stores the transitions collected under one policy version
//! until PPO consumes them in a training update. Insertion order is kept and
//! drives minibatch indexing; the owning algorithm clears the buffer after
//! every update.

use rand::Rng;
use rand::seq::SliceRandom;

/// One on-policy transition
///
/// `action` holds a single element (the index as `f32`) for categorical
/// policies and one element per dimension for Gaussian policies.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutTransition {
    /// Observation the action was taken in
    pub observation: Vec<f32>,

    /// Action taken
    pub action: Vec<f32>,

    /// Log-probability of the action at collection time
    pub log_prob: f32,

    /// Reward received
    pub reward: f32,

    /// Value estimate `V(s)` at collection time
    pub value: f32,

    /// Whether the episode terminated after this transition
    pub done: bool,

    /// Caller-supplied advantage, if any
    pub advantage: Option<f32>,

    /// Caller-supplied return, if any
    pub ret: Option<f32>,
}

/// Ordered store of PPO transitions for one update cycle
///
/// No capacity bound: PPO decides when to train and clear.
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::{RolloutBuffer, RolloutTransition};
///
/// let mut buffer = RolloutBuffer::new();
/// buffer.push(RolloutTransition {
///     observation: vec![0.0, 1.0],
///     action: vec![1.0],
///     log_prob: -0.7,
///     reward: 1.0,
///     value: 0.2,
///     done: false,
///     advantage: None,
///     ret: None,
/// });
///
/// assert_eq!(buffer.len(), 1);
/// buffer.clear();
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    transitions: Vec<RolloutTransition>,

    /// Next-observation of the most recent transition, for bootstrapping
    bootstrap_observation: Option<Vec<f32>>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transition
    pub fn push(&mut self, transition: RolloutTransition) {
        self.transitions.push(transition);
    }

    /// Remember the observation that follows the latest transition
    pub fn set_bootstrap_observation(&mut self, observation: Vec<f32>) {
        self.bootstrap_observation = Some(observation);
    }

    pub fn bootstrap_observation(&self) -> Option<&[f32]> {
        self.bootstrap_observation.as_deref()
    }

    /// Empty the buffer and forget the bootstrap observation
    pub fn clear(&mut self) {
        self.transitions.clear();
        self.bootstrap_observation = None;
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RolloutTransition> {
        self.transitions.get(index)
    }

    /// Transitions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RolloutTransition> {
        self.transitions.iter()
    }

    pub fn last(&self) -> Option<&RolloutTransition> {
        self.transitions.last()
    }

    /// Whether every transition carries both an advantage and a return
    pub fn has_complete_targets(&self) -> bool {
        self.transitions
            .iter()
            .all(|t| t.advantage.is_some() && t.ret.is_some())
    }

    /// Fill missing advantages and returns with GAE over the whole rollout
    ///
    /// Caller-supplied entries are kept as they are.
    ///
    /// # Arguments
    ///
    /// * `gamma` - Discount factor
    /// * `gae_lambda` - GAE λ
    /// * `last_value` - `V` of the observation after the final transition
    pub fn fill_missing_targets(&mut self, gamma: f32, gae_lambda: f32, last_value: f32) {
        if self.has_complete_targets() {
            return;
        }

        let rewards: Vec<f32> = self.transitions.iter().map(|t| t.reward).collect();
        let values: Vec<f32> = self.transitions.iter().map(|t| t.value).collect();
        let dones: Vec<bool> = self.transitions.iter().map(|t| t.done).collect();
        let (advantages, returns) =
            super::gae::compute_gae(&rewards, &values, &dones, last_value, gamma, gae_lambda);

        for ((t, adv), ret) in self.transitions.iter_mut().zip(advantages).zip(returns) {
            t.advantage.get_or_insert(adv);
            t.ret.get_or_insert(ret);
        }
    }

    /// Shuffle indices with Fisher–Yates and split them into contiguous minibatches
    ///
    /// The final minibatch is shorter when the length is not a multiple of
    /// `batch_size`.
    pub fn minibatch_indices<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);

        indices
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}
