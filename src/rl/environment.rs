//! Environment interface consumed by the training driver
//!
//! The algorithms never call an environment themselves; this trait only
//! lets [`TrainMode`](crate::modes::TrainMode) run episodes against any
//! discrete-action simulator.

/// Result of one environment step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Observation after the step, flattened
    pub observation: Vec<f32>,
    pub reward: f32,
    /// Episode ended in a terminal state
    pub terminated: bool,
    /// Episode cut off by a step limit
    pub truncated: bool,
}

impl StepOutcome {
    /// Whether the episode is over for either reason
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A resettable, discrete-action simulator
pub trait Environment {
    /// Observation shape; observations are passed around flattened
    fn observation_shape(&self) -> Vec<usize>;

    /// Number of discrete actions
    fn action_size(&self) -> usize;

    /// Start a new episode and return its first observation
    fn reset(&mut self) -> Vec<f32>;

    /// Apply action index `action`
    ///
    /// Indices outside `0..action_size()` are treated as a no-op move.
    fn step(&mut self, action: usize) -> StepOutcome;
}
