//! Backend type aliases and device management
//!
//! The algorithms are generic over any `AutodiffBackend`; these aliases pick
//! the CPU NdArray backend used by the binary and the tests.
//!
//! - **TrainingBackend**: Autodiff-enabled NdArray backend (CPU)
//! - **InferenceBackend**: Plain NdArray backend, also the inner backend
//!   that holds DQN target networks
//!
//! # Example
//!
//! ```rust
//! use playground_rl::rl::{PpoAlgorithm, PpoConfig, TrainingBackend, default_device};
//!
//! let ppo = PpoAlgorithm::<TrainingBackend>::new(PpoConfig::default(), default_device());
//! assert_eq!(ppo.rollout_len(), 0);
//! ```

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend used for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend used for gradient-free forward passes
pub type InferenceBackend = NdArray<f32>;

/// Default NdArray device (CPU)
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;

    #[test]
    fn test_default_device_is_usable() {
        let device = default_device();
        let tensor = Tensor::<TrainingBackend, 1>::from_floats([1.0, 2.0], &device);
        assert_eq!(tensor.dims(), [2]);
    }

    #[test]
    fn test_multiple_device_calls() {
        assert_eq!(default_device(), default_device());
    }
}
