//! Transition batches and action side channels
//!
//! A [`TrainBatch`] carries fixed-stride flat arrays, one record per
//! transition, plus optional per-step [`BatchExtras`]. Extras are resolved
//! through a single rule, see [`BatchExtras::resolve`].

use super::error::{Result, RlError};

/// Action returned by `act`
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Index into a discrete action space
    Discrete(usize),
    /// One value per continuous action dimension
    Continuous(Vec<f32>),
}

impl Action {
    pub fn as_discrete(&self) -> Option<usize> {
        match self {
            Action::Discrete(index) => Some(*index),
            Action::Continuous(_) => None,
        }
    }

    /// Flat `f32` form as stored in a [`TrainBatch`]
    pub fn to_vec(&self) -> Vec<f32> {
        match self {
            Action::Discrete(index) => vec![*index as f32],
            Action::Continuous(values) => values.clone(),
        }
    }
}

/// Parameters of the distribution an action was drawn from
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionParams {
    Categorical { probs: Vec<f32> },
    Gaussian { mean: Vec<f32>, std: Vec<f32> },
}

/// What the policy believed when it chose an action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMetadata {
    pub action: Action,
    pub log_prob: f32,
    pub value: f32,
    pub distribution: DistributionParams,
}

/// Named per-step extras
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraField {
    LogProb,
    Value,
    Advantage,
    Return,
}

/// A resolved extra: a usable caller value, or "use what was recorded"
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extra {
    Provided(f32),
    UseRecorded,
}

impl Extra {
    pub fn provided(self) -> Option<f32> {
        match self {
            Extra::Provided(value) => Some(value),
            Extra::UseRecorded => None,
        }
    }

    /// The provided value, or `recorded()` otherwise
    pub fn or_recorded(self, recorded: impl FnOnce() -> f32) -> f32 {
        self.provided().unwrap_or_else(recorded)
    }
}

/// Optional caller-supplied per-step arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchExtras {
    pub log_probs: Option<Vec<f32>>,
    pub values: Option<Vec<f32>>,
    pub advantages: Option<Vec<f32>>,
    pub returns: Option<Vec<f32>>,
}

impl BatchExtras {
    /// Resolve one extra for transition `index`
    ///
    /// An entry is [`Extra::Provided`] only when its array exists, has an
    /// element at `index`, and that element is finite. Everything else
    /// resolves to [`Extra::UseRecorded`].
    pub fn resolve(&self, field: ExtraField, index: usize) -> Extra {
        let array = match field {
            ExtraField::LogProb => &self.log_probs,
            ExtraField::Value => &self.values,
            ExtraField::Advantage => &self.advantages,
            ExtraField::Return => &self.returns,
        };
        match array.as_ref().and_then(|a| a.get(index)) {
            Some(&value) if value.is_finite() => Extra::Provided(value),
            _ => Extra::UseRecorded,
        }
    }
}

/// Transitions handed to `observe`
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::TrainBatch;
///
/// let mut batch = TrainBatch::new();
/// batch.push(&[0.0, 1.0], &[2.0], 1.0, &[1.0, 1.0], false);
/// batch.push(&[1.0, 1.0], &[0.0], 0.0, &[1.0, 2.0], true);
///
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.observation(1, 2), &[1.0, 1.0]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainBatch {
    pub observations: Vec<f32>,
    pub actions: Vec<f32>,
    pub rewards: Vec<f32>,
    pub next_observations: Vec<f32>,
    pub dones: Vec<bool>,
    pub extras: BatchExtras,
    /// Force a training update regardless of rollout length
    pub flush: bool,
}

impl TrainBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one transition
    pub fn push(
        &mut self,
        observation: &[f32],
        action: &[f32],
        reward: f32,
        next_observation: &[f32],
        done: bool,
    ) {
        self.observations.extend_from_slice(observation);
        self.actions.extend_from_slice(action);
        self.rewards.push(reward);
        self.next_observations.extend_from_slice(next_observation);
        self.dones.push(done);
    }

    pub fn with_extras(mut self, extras: BatchExtras) -> Self {
        self.extras = extras;
        self
    }

    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    /// Number of transitions
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Check strides against `obs_size` and return the action stride
    pub fn validate(&self, obs_size: usize) -> Result<usize> {
        let n = self.len();
        if self.dones.len() != n {
            return Err(RlError::InvalidBatch(format!(
                "{} rewards but {} dones",
                n,
                self.dones.len()
            )));
        }
        for (label, array) in [
            ("observations", &self.observations),
            ("nextObservations", &self.next_observations),
        ] {
            if array.len() != n * obs_size {
                return Err(RlError::InvalidBatch(format!(
                    "{label} has {} values, expected {} x {obs_size}",
                    array.len(),
                    n
                )));
            }
        }
        if n == 0 {
            return Ok(0);
        }
        if self.actions.is_empty() || self.actions.len() % n != 0 {
            return Err(RlError::InvalidBatch(format!(
                "{} action values do not split into {n} transitions",
                self.actions.len()
            )));
        }
        Ok(self.actions.len() / n)
    }

    pub fn observation(&self, index: usize, obs_size: usize) -> &[f32] {
        &self.observations[index * obs_size..(index + 1) * obs_size]
    }

    pub fn next_observation(&self, index: usize, obs_size: usize) -> &[f32] {
        &self.next_observations[index * obs_size..(index + 1) * obs_size]
    }

    pub fn action(&self, index: usize, stride: usize) -> &[f32] {
        &self.actions[index * stride..(index + 1) * stride]
    }
}
