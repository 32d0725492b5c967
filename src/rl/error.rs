//! Error taxonomy for the training core
//!
//! Every fallible operation on an algorithm returns [`RlError`]. Errors are
//! local to the call that raised them; no error state is kept between calls.

use thiserror::Error;

/// Errors raised by the training algorithms and the weight codec
#[derive(Debug, Error)]
pub enum RlError {
    /// Operation invoked before `init` or after `dispose`
    #[error("algorithm is not initialized")]
    NotInitialized,

    /// A weight blob lacks a parameter the network expects
    #[error("missing weight: {0}")]
    MissingWeight(String),

    /// A named parameter exists but its shape differs from the network's
    #[error("shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Malformed blob framing or metadata
    #[error("corrupt weights: {0}")]
    CorruptWeights(String),

    /// Batch arrays do not agree with the initialized shapes
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Observation length differs from the initialized shape
    #[error("observation has {found} values, expected {expected}")]
    ObservationSize { expected: usize, found: usize },

    /// Hyperparameters or init arguments out of range
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Tensor data could not be read back to host memory
    #[error("tensor read failed: {0}")]
    Tensor(String),
}

/// Result alias used across the `rl` module
pub type Result<T> = std::result::Result<T, RlError>;
