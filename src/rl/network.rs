//! Function approximators for PPO and DQN
//!
//! Both algorithms use plain multi-layer perceptrons over flat observation
//! vectors:
//!
//! ```text
//! Input: [batch, obs_size]
//!   ↓ Linear(obs_size → h_0) + ReLU
//!   ↓ ...
//!   ↓ Linear(h_{n-1} → h_n) + ReLU
//!   ↓ Linear(h_n → output)
//! Output: [batch, output]
//! ```
//!
//! Parameters carry stable names (`dense_{i}/kernel`, `dense_{i}/bias`, and
//! `log_std` for Gaussian policies) so weight blobs survive a process
//! restart. Initial weights are drawn from the caller's RNG, uniform in
//! `±1/sqrt(fan_in)`, which keeps `init(seed)` reproducible.

use super::codec::NamedTensor;
use super::error::{Result, RlError};
use burn::{
    module::{Module, Param},
    nn::Linear,
    tensor::{Tensor, TensorData, activation::relu, backend::Backend},
};
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Forward pass plus named weight read/write
///
/// The training core only needs this capability from a network; anything
/// implementing it can be saved and restored through the weight codec.
pub trait FunctionApproximator<B: Backend>: Sized {
    /// Map `[batch, in]` to `[batch, out]`
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Copy every parameter to host memory under its stable name
    fn named_parameters(&self) -> Result<Vec<NamedTensor>>;

    /// Replace parameter values by name
    ///
    /// Parameter ids are kept so optimizer state stays attached. Fails with
    /// [`RlError::MissingWeight`] when a name on either side has no
    /// counterpart, and with [`RlError::ShapeMismatch`] on a shape change.
    fn load_named_parameters(self, params: &[NamedTensor]) -> Result<Self>;
}

/// Layer sizes for an [`Mlp`]
#[derive(Debug, Clone, PartialEq)]
pub struct MlpConfig {
    pub input_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub output_size: usize,
}

impl MlpConfig {
    pub fn new(input_size: usize, hidden_sizes: Vec<usize>, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_sizes,
            output_size,
        }
    }

    /// Build the network with weights drawn from `rng`
    ///
    /// # Example
    ///
    /// ```rust
    /// use playground_rl::rl::{InferenceBackend, MlpConfig, default_device};
    /// use burn::tensor::Tensor;
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    ///
    /// let device = default_device();
    /// let mut rng = StdRng::seed_from_u64(0);
    /// let mlp = MlpConfig::new(5, vec![16], 4).init::<InferenceBackend, _>(&mut rng, &device);
    ///
    /// let out = mlp.forward(Tensor::zeros([3, 5], &device));
    /// assert_eq!(out.dims(), [3, 4]);
    /// ```
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, rng: &mut R, device: &B::Device) -> Mlp<B> {
        let mut sizes = Vec::with_capacity(self.hidden_sizes.len() + 2);
        sizes.push(self.input_size);
        sizes.extend(self.hidden_sizes.iter().copied());
        sizes.push(self.output_size);

        let layers = sizes
            .windows(2)
            .map(|w| seeded_linear(w[0], w[1], rng, device))
            .collect();

        Mlp { layers }
    }
}

/// Multi-layer perceptron with ReLU hidden activations and a linear output
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = relu(x);
            }
        }
        x
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl<B: Backend> FunctionApproximator<B> for Mlp<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        Mlp::forward(self, input)
    }

    fn named_parameters(&self) -> Result<Vec<NamedTensor>> {
        let mut params = Vec::with_capacity(self.layers.len() * 2);
        for (i, layer) in self.layers.iter().enumerate() {
            params.push(NamedTensor::from_tensor(kernel_name(i), layer.weight.val())?);
            if let Some(bias) = &layer.bias {
                params.push(NamedTensor::from_tensor(bias_name(i), bias.val())?);
            }
        }
        Ok(params)
    }

    fn load_named_parameters(self, params: &[NamedTensor]) -> Result<Self> {
        let by_name = index_by_name(params);
        let mut own = HashSet::with_capacity(self.layers.len() * 2);

        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, mut layer) in self.layers.into_iter().enumerate() {
            own.insert(kernel_name(i));
            layer.weight = replace_param(layer.weight, lookup(&by_name, &kernel_name(i))?)?;
            if let Some(bias) = layer.bias.take() {
                own.insert(bias_name(i));
                layer.bias = Some(replace_param(bias, lookup(&by_name, &bias_name(i))?)?);
            }
            layers.push(layer);
        }

        // The blob may not carry parameters this network does not have
        if let Some(extra) = params.iter().find(|p| !own.contains(&p.name)) {
            return Err(RlError::MissingWeight(extra.name.clone()));
        }

        Ok(Self { layers })
    }
}

/// Policy head: an [`Mlp`] producing logits (categorical) or means
/// (Gaussian), plus a learned state-independent `log_std` for Gaussian
/// policies
#[derive(Module, Debug)]
pub struct PolicyNetwork<B: Backend> {
    body: Mlp<B>,
    log_std: Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> PolicyNetwork<B> {
    /// Categorical policy over `action_size` discrete actions
    pub fn categorical(body: Mlp<B>) -> Self {
        Self {
            body,
            log_std: None,
        }
    }

    /// Gaussian policy with `log_std` initialized to zero
    pub fn gaussian(body: Mlp<B>, action_size: usize, device: &B::Device) -> Self {
        let log_std = Param::from_data(TensorData::new(vec![0.0f32; action_size], [action_size]), device);
        Self {
            body,
            log_std: Some(log_std),
        }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.body.forward(input)
    }

    /// Learned log standard deviation, `[action_size]`
    pub fn log_std(&self) -> Option<Tensor<B, 1>> {
        self.log_std.as_ref().map(|p| p.val())
    }

    pub fn is_gaussian(&self) -> bool {
        self.log_std.is_some()
    }
}

impl<B: Backend> FunctionApproximator<B> for PolicyNetwork<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        PolicyNetwork::forward(self, input)
    }

    fn named_parameters(&self) -> Result<Vec<NamedTensor>> {
        let mut params = self.body.named_parameters()?;
        if let Some(log_std) = &self.log_std {
            params.push(NamedTensor::from_tensor(LOG_STD_NAME, log_std.val())?);
        }
        Ok(params)
    }

    fn load_named_parameters(self, params: &[NamedTensor]) -> Result<Self> {
        let (std_params, body_params): (Vec<NamedTensor>, Vec<NamedTensor>) = params
            .iter()
            .cloned()
            .partition(|p| p.name == LOG_STD_NAME);

        let log_std = match self.log_std {
            Some(param) => {
                let entry = std_params
                    .first()
                    .ok_or_else(|| RlError::MissingWeight(LOG_STD_NAME.to_string()))?;
                Some(replace_param(param, entry)?)
            }
            None if !std_params.is_empty() => {
                return Err(RlError::MissingWeight(LOG_STD_NAME.to_string()));
            }
            None => None,
        };

        Ok(Self {
            body: self.body.load_named_parameters(&body_params)?,
            log_std,
        })
    }
}

/// Policy and value networks trained together by one optimizer
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    pub policy: PolicyNetwork<B>,
    pub value: Mlp<B>,
}

impl<B: Backend> ActorCritic<B> {
    pub fn new(policy: PolicyNetwork<B>, value: Mlp<B>) -> Self {
        Self { policy, value }
    }

    /// Policy output `[batch, action_size]` and state values `[batch]`
    pub fn forward(&self, observations: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let policy_out = self.policy.forward(observations.clone());
        let values = self.value.forward(observations).squeeze::<1>(1);
        (policy_out, values)
    }
}

const LOG_STD_NAME: &str = "log_std";

fn kernel_name(layer: usize) -> String {
    format!("dense_{layer}/kernel")
}

fn bias_name(layer: usize) -> String {
    format!("dense_{layer}/bias")
}

fn index_by_name(params: &[NamedTensor]) -> HashMap<&str, &NamedTensor> {
    params.iter().map(|p| (p.name.as_str(), p)).collect()
}

fn lookup<'a>(by_name: &HashMap<&str, &'a NamedTensor>, name: &str) -> Result<&'a NamedTensor> {
    by_name
        .get(name)
        .copied()
        .ok_or_else(|| RlError::MissingWeight(name.to_string()))
}

/// Swap a parameter's value, keeping its id and gradient requirement
fn replace_param<B: Backend, const D: usize>(
    param: Param<Tensor<B, D>>,
    entry: &NamedTensor,
) -> Result<Param<Tensor<B, D>>> {
    let current = param.val();
    let expected = current.dims().to_vec();
    if expected != entry.shape || entry.numel() != Some(entry.values.len()) {
        return Err(RlError::ShapeMismatch {
            name: entry.name.clone(),
            expected,
            found: entry.shape.clone(),
        });
    }

    let device = current.device();
    let require_grad = current.is_require_grad();
    let data = TensorData::new(entry.values.clone(), entry.shape.clone());
    Ok(param.map(|_| Tensor::from_data(data, &device).set_require_grad(require_grad)))
}

fn seeded_linear<B: Backend, R: Rng + ?Sized>(
    d_input: usize,
    d_output: usize,
    rng: &mut R,
    device: &B::Device,
) -> Linear<B> {
    let bound = 1.0 / (d_input.max(1) as f32).sqrt();
    let weight: Vec<f32> = (0..d_input * d_output)
        .map(|_| rng.gen_range(-bound..bound))
        .collect();
    let bias: Vec<f32> = (0..d_output).map(|_| rng.gen_range(-bound..bound)).collect();

    Linear {
        weight: Param::from_data(TensorData::new(weight, [d_input, d_output]), device),
        bias: Some(Param::from_data(TensorData::new(bias, [d_output]), device)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn mlp(seed: u64) -> Mlp<TestBackend> {
        let device = NdArrayDevice::default();
        MlpConfig::new(5, vec![8, 8], 4).init(&mut StdRng::seed_from_u64(seed), &device)
    }

    #[test]
    fn test_forward_shapes() {
        let device = NdArrayDevice::default();
        let network = mlp(0);
        for batch_size in [1, 4, 16] {
            let out = network.forward(Tensor::zeros([batch_size, 5], &device));
            assert_eq!(out.dims(), [batch_size, 4]);
        }
    }

    #[test]
    fn test_parameter_names() {
        let names: Vec<String> = mlp(0)
            .named_parameters()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "dense_0/kernel",
                "dense_0/bias",
                "dense_1/kernel",
                "dense_1/bias",
                "dense_2/kernel",
                "dense_2/bias",
            ]
        );
    }

    #[test]
    fn test_same_seed_same_weights() {
        assert_eq!(
            mlp(3).named_parameters().unwrap(),
            mlp(3).named_parameters().unwrap()
        );
        assert_ne!(
            mlp(3).named_parameters().unwrap(),
            mlp(4).named_parameters().unwrap()
        );
    }

    #[test]
    fn test_load_copies_values() {
        let source = mlp(1).named_parameters().unwrap();
        let loaded = mlp(2).load_named_parameters(&source).unwrap();
        assert_eq!(loaded.named_parameters().unwrap(), source);
    }

    #[test]
    fn test_load_missing_weight() {
        let mut params = mlp(1).named_parameters().unwrap();
        params.retain(|p| p.name != "dense_1/bias");

        match mlp(2).load_named_parameters(&params) {
            Err(RlError::MissingWeight(name)) => assert_eq!(name, "dense_1/bias"),
            other => panic!("expected MissingWeight, got {other:?}"),
        }
    }

    #[test]
    fn test_load_unknown_weight() {
        let mut params = mlp(1).named_parameters().unwrap();
        params.push(NamedTensor::new("dense_9/kernel", vec![1], vec![0.0]));

        assert!(matches!(
            mlp(2).load_named_parameters(&params),
            Err(RlError::MissingWeight(name)) if name == "dense_9/kernel"
        ));
    }

    #[test]
    fn test_load_shape_mismatch() {
        let device = NdArrayDevice::default();
        let wider: Mlp<TestBackend> =
            MlpConfig::new(5, vec![16, 8], 4).init(&mut StdRng::seed_from_u64(0), &device);
        let params = wider.named_parameters().unwrap();

        assert!(matches!(
            mlp(0).load_named_parameters(&params),
            Err(RlError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_load_keeps_require_grad() {
        let device = NdArrayDevice::default();
        let network: Mlp<TestAutodiffBackend> =
            MlpConfig::new(3, vec![4], 2).init(&mut StdRng::seed_from_u64(0), &device);
        let params = network.named_parameters().unwrap();
        let reloaded = network.load_named_parameters(&params).unwrap();

        assert!(reloaded.layers[0].weight.val().is_require_grad());
    }

    #[test]
    fn test_gaussian_policy_names_log_std() {
        let device = NdArrayDevice::default();
        let body = MlpConfig::new(3, vec![4], 2).init(&mut StdRng::seed_from_u64(0), &device);
        let policy = PolicyNetwork::<TestBackend>::gaussian(body, 2, &device);

        let params = policy.named_parameters().unwrap();
        let log_std = params.iter().find(|p| p.name == "log_std").unwrap();
        assert_eq!(log_std.shape, vec![2]);
        assert_eq!(log_std.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_categorical_policy_rejects_log_std() {
        let device = NdArrayDevice::default();
        let body = MlpConfig::new(3, vec![4], 2).init(&mut StdRng::seed_from_u64(0), &device);
        let mut params = body.named_parameters().unwrap();
        params.push(NamedTensor::new("log_std", vec![2], vec![0.0, 0.0]));

        let policy = PolicyNetwork::<TestBackend>::categorical(body);
        assert!(matches!(
            policy.load_named_parameters(&params),
            Err(RlError::MissingWeight(_))
        ));
    }

    #[test]
    fn test_actor_critic_forward_shapes() {
        let device = NdArrayDevice::default();
        let mut rng = StdRng::seed_from_u64(0);
        let policy = PolicyNetwork::categorical(MlpConfig::new(5, vec![8], 4).init(&mut rng, &device));
        let value = MlpConfig::new(5, vec![8], 1).init(&mut rng, &device);
        let network = ActorCritic::<TestBackend>::new(policy, value);

        let (logits, values) = network.forward(Tensor::zeros([6, 5], &device));
        assert_eq!(logits.dims(), [6, 4]);
        assert_eq!(values.dims(), [6]);
    }
}
