//! Demo environment for the binary and integration tests
//!
//! A small grid world with walls and a goal, free of any I/O or rendering
//! dependencies.

pub mod action;
pub mod config;
pub mod gridworld;

pub use action::Direction;
pub use config::GridWorldConfig;
pub use gridworld::{GridWorld, Position};
