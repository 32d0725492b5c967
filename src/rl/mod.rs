//! Reinforcement learning training engine
//!
//! Provides:
//! - PPO (clipped-surrogate actor-critic) and DQN behind one [`Algorithm`]
//!   lifecycle: `init → (act → observe)* → save/load → dispose`
//! - Rollout and replay buffers, a linear schedule, and GAE
//! - MLP function approximators with stable parameter names
//! - A byte-exact weight codec and checkpoint files

pub mod algorithm;
pub mod backend;
pub mod batch;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod distribution;
pub mod dqn;
pub mod environment;
pub mod error;
pub mod gae;
pub mod loss;
pub mod network;
pub mod persistence;
pub mod ppo;
pub mod replay;
pub mod schedule;

pub use algorithm::{Algorithm, Diagnostics, Lifecycle};
pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use batch::{
    Action, ActionMetadata, BatchExtras, DistributionParams, Extra, ExtraField, TrainBatch,
};
pub use buffer::{RolloutBuffer, RolloutTransition};
pub use codec::NamedTensor;
pub use config::{DqnConfig, PolicyHead, PpoConfig};
pub use dqn::DqnAlgorithm;
pub use environment::{Environment, StepOutcome};
pub use error::{Result, RlError};
pub use network::{ActorCritic, FunctionApproximator, Mlp, MlpConfig, PolicyNetwork};
pub use persistence::{CheckpointMetadata, load_checkpoint, read_metadata, save_checkpoint};
pub use ppo::PpoAlgorithm;
pub use replay::{ReplayBuffer, ReplayTransition};
pub use schedule::LinearSchedule;
