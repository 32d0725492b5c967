//! Playground RL - PPO and DQN training core
//!
//! This library provides:
//! - Algorithms behind one lifecycle contract (rl module): PPO with a
//!   clipped surrogate objective and DQN with replay and a target network
//! - Rollout and replay buffers, GAE, schedules and a portable weight codec
//!   (rl module)
//! - A small grid-world environment (game module)
//! - Training and evaluation loops (modes module) with rolling statistics
//!   (metrics module)

pub mod game;
pub mod metrics;
pub mod modes;
pub mod rl;
