//! PPO (Proximal Policy Optimization) algorithm
//!
//! Collects on-policy transitions through `observe` and, once the rollout is
//! long enough (or the caller flushes), runs several epochs of clipped
//! surrogate updates over shuffled minibatches. Action selection samples on
//! the host with the algorithm's own RNG so a seed fixes every decision.

use super::algorithm::{Algorithm, Diagnostics, Lifecycle, check_observation, validate_init_shapes};
use super::batch::{Action, ActionMetadata, DistributionParams, ExtraField, TrainBatch};
use super::buffer::{RolloutBuffer, RolloutTransition};
use super::codec::{self, to_host};
use super::config::{PolicyHead, PpoConfig};
use super::distribution::{
    categorical_log_prob, gaussian_log_prob, sample_categorical, seed_from_str, softmax,
    standard_normal,
};
use super::error::{Result, RlError};
use super::gae::normalize_advantages;
use super::loss;
use super::network::{ActorCritic, FunctionApproximator, MlpConfig, PolicyNetwork};
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{ElementConversion, Int, Tensor, TensorData, backend::AutodiffBackend},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Whether an update keeps going after a minibatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateControl {
    Continue,
    /// Approximate KL exceeded the target; skip every remaining epoch
    Stop,
}

/// Clipped-surrogate actor-critic
///
/// # Type Parameters
///
/// * `B` - Autodiff backend for gradient computation
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::{Algorithm, PpoAlgorithm, PpoConfig, TrainingBackend, default_device};
///
/// let config = PpoConfig {
///     rollout_length: 8,
///     mini_batch_size: 4,
///     hidden_sizes: vec![16],
///     ..Default::default()
/// };
/// let mut ppo = PpoAlgorithm::<TrainingBackend>::new(config, default_device());
/// ppo.init(&[5], 4, "42").unwrap();
///
/// let action = ppo.act(&[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
/// assert!(action.as_discrete().unwrap() < 4);
/// ```
pub struct PpoAlgorithm<B: AutodiffBackend> {
    config: PpoConfig,
    device: B::Device,
    runtime: Option<PpoRuntime<B>>,
    lifecycle: Lifecycle,
    diagnostics: Option<Diagnostics>,
}

/// Everything `init` builds and `dispose` drops
struct PpoRuntime<B: AutodiffBackend> {
    network: ActorCritic<B>,
    optim: OptimizerAdaptor<Adam, ActorCritic<B>, B>,
    buffer: RolloutBuffer,
    /// Metadata of actions not yet matched to observed transitions
    pending: VecDeque<ActionMetadata>,
    last_metadata: Option<ActionMetadata>,
    training_updates: usize,
    rng: StdRng,
    obs_size: usize,
    action_size: usize,
    device: B::Device,
}

/// Host copies of one rollout, indexed by transition
struct RolloutData {
    observations: Vec<f32>,
    actions: Vec<f32>,
    old_log_probs: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
    old_values: Vec<f32>,
}

/// Scalars of the latest minibatch
#[derive(Debug, Default)]
struct MinibatchStats {
    loss: f32,
    policy_loss: f32,
    value_loss: f32,
    entropy: f32,
    approx_kl: f32,
    gradient_steps: usize,
}

impl<B: AutodiffBackend> PpoAlgorithm<B> {
    pub fn new(config: PpoConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            runtime: None,
            lifecycle: Lifecycle::Uninitialized,
            diagnostics: None,
        }
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Transitions buffered toward the next update
    pub fn rollout_len(&self) -> usize {
        self.runtime.as_ref().map_or(0, |rt| rt.buffer.len())
    }

    /// Metadata of the most recent `act`
    pub fn last_action_metadata(&self) -> Option<&ActionMetadata> {
        self.runtime.as_ref().and_then(|rt| rt.last_metadata.as_ref())
    }

    /// Sample an action and return it with what the policy believed
    pub fn act_with_metadata(&mut self, observation: &[f32]) -> Result<ActionMetadata> {
        let rt = self.runtime.as_mut().ok_or(RlError::NotInitialized)?;
        check_observation(observation, rt.obs_size)?;

        let (outputs, values) = rt.infer(observation.to_vec(), 1)?;
        let distribution = rt.distribution(&outputs)?;
        let value = values.first().copied().unwrap_or(0.0);

        let (action, log_prob) = match &distribution {
            DistributionParams::Categorical { probs } => {
                let u = rt.rng.r#gen::<f32>();
                let index = sample_categorical(probs, u);
                (Action::Discrete(index), categorical_log_prob(probs, index))
            }
            DistributionParams::Gaussian { mean, std } => {
                let sampled: Vec<f32> = mean
                    .iter()
                    .zip(std)
                    .map(|(&m, &s)| m + s * standard_normal(&mut rt.rng))
                    .collect();
                let log_prob = gaussian_log_prob(&sampled, mean, std);
                (Action::Continuous(sampled), log_prob)
            }
        };

        let metadata = ActionMetadata {
            action,
            log_prob,
            value,
            distribution,
        };
        rt.pending.push_back(metadata.clone());
        while rt.pending.len() > self.config.rollout_length {
            rt.pending.pop_front();
        }
        rt.last_metadata = Some(metadata.clone());
        Ok(metadata)
    }

    /// Current policy distribution for one observation, without sampling
    pub fn policy_distribution(&self, observation: &[f32]) -> Result<DistributionParams> {
        let rt = self.runtime.as_ref().ok_or(RlError::NotInitialized)?;
        check_observation(observation, rt.obs_size)?;
        let (outputs, _) = rt.infer(observation.to_vec(), 1)?;
        rt.distribution(&outputs)
    }

    fn observe_batch(&mut self, batch: &TrainBatch) -> Result<()> {
        let config = &self.config;
        let rt = self.runtime.as_mut().ok_or(RlError::NotInitialized)?;

        let n = batch.len();
        let stride = batch.validate(rt.obs_size)?;
        if n > 0 {
            rt.check_actions(batch, stride)?;
        }

        // Pending metadata lines up with the last transitions of the batch
        let offset = rt.pending.len() as isize - n as isize;
        let mut recorded: Vec<Option<(f32, f32)>> = (0..n)
            .map(|i| {
                let slot = offset + i as isize;
                if slot < 0 {
                    return None;
                }
                rt.pending
                    .get(slot as usize)
                    .filter(|m| m.action.to_vec() == batch.action(i, stride))
                    .map(|m| (m.log_prob, m.value))
            })
            .collect();

        let needs_eval: Vec<usize> = (0..n)
            .filter(|&i| {
                recorded[i].is_none()
                    && (batch.extras.resolve(ExtraField::LogProb, i).provided().is_none()
                        || batch.extras.resolve(ExtraField::Value, i).provided().is_none())
            })
            .collect();
        if !needs_eval.is_empty() {
            let observations: Vec<f32> = needs_eval
                .iter()
                .flat_map(|&i| batch.observation(i, rt.obs_size).iter().copied())
                .collect();
            let (outputs, values) = rt.infer(observations, needs_eval.len())?;
            let width = rt.output_width();
            for (row, &i) in needs_eval.iter().enumerate() {
                let distribution = rt.distribution(&outputs[row * width..(row + 1) * width])?;
                let log_prob = log_prob_under(&distribution, batch.action(i, stride));
                recorded[i] = Some((log_prob, values[row]));
            }
        }

        for (i, entry) in recorded.into_iter().enumerate() {
            let (log_prob, value) = entry.unwrap_or((0.0, 0.0));
            rt.buffer.push(RolloutTransition {
                observation: batch.observation(i, rt.obs_size).to_vec(),
                action: batch.action(i, stride).to_vec(),
                log_prob: batch.extras.resolve(ExtraField::LogProb, i).or_recorded(|| log_prob),
                reward: batch.rewards[i],
                value: batch.extras.resolve(ExtraField::Value, i).or_recorded(|| value),
                done: batch.dones[i],
                advantage: batch.extras.resolve(ExtraField::Advantage, i).provided(),
                ret: batch.extras.resolve(ExtraField::Return, i).provided(),
            });
        }
        if n > 0 {
            rt.buffer
                .set_bootstrap_observation(batch.next_observation(n - 1, rt.obs_size).to_vec());
        }
        rt.pending.clear();

        let should_train = rt.buffer.len() >= config.rollout_length
            || (batch.flush && !rt.buffer.is_empty());
        if !should_train {
            self.lifecycle = if rt.buffer.is_empty() {
                Lifecycle::Ready
            } else {
                Lifecycle::Collecting
            };
            return Ok(());
        }

        let result = rt.train_from_rollout(config);
        rt.buffer.clear();
        self.lifecycle = Lifecycle::Ready;

        let diagnostics = result?;
        rt.training_updates += 1;
        debug!(
            loss = diagnostics.loss,
            entropy = diagnostics.entropy,
            approx_kl = diagnostics.approx_kl,
            gradient_steps = diagnostics.gradient_steps,
            "PPO update finished"
        );
        self.diagnostics = Some(diagnostics);
        Ok(())
    }
}

impl<B: AutodiffBackend> PpoRuntime<B> {
    fn is_gaussian(&self) -> bool {
        self.network.policy.is_gaussian()
    }

    /// Values per policy output row
    fn output_width(&self) -> usize {
        self.action_size
    }

    /// Values per stored action
    fn action_stride(&self) -> usize {
        if self.is_gaussian() { self.action_size } else { 1 }
    }

    fn check_actions(&self, batch: &TrainBatch, stride: usize) -> Result<()> {
        if stride != self.action_stride() {
            return Err(RlError::InvalidBatch(format!(
                "expected {} action values per transition, found {stride}",
                self.action_stride()
            )));
        }
        if self.is_gaussian() {
            return Ok(());
        }
        if let Some(bad) = batch
            .actions
            .iter()
            .find(|&&a| !(a >= 0.0 && a.fract() == 0.0 && (a as usize) < self.action_size))
        {
            return Err(RlError::InvalidBatch(format!(
                "action {bad} is not an index below {}",
                self.action_size
            )));
        }
        Ok(())
    }

    /// Forward `rows` observations without recording a graph
    fn infer(&self, observations: Vec<f32>, rows: usize) -> Result<(Vec<f32>, Vec<f32>)> {
        let network = self.network.valid();
        let input = Tensor::<B::InnerBackend, 2>::from_data(
            TensorData::new(observations, [rows, self.obs_size]),
            &self.device,
        );
        let (outputs, values) = network.forward(input);
        Ok((to_host(outputs)?, to_host(values)?))
    }

    /// Interpret one policy output row
    fn distribution(&self, row: &[f32]) -> Result<DistributionParams> {
        match self.network.policy.log_std() {
            Some(log_std) => {
                let std = to_host(log_std.exp())?;
                Ok(DistributionParams::Gaussian {
                    mean: row.to_vec(),
                    std,
                })
            }
            None => Ok(DistributionParams::Categorical {
                probs: softmax(row),
            }),
        }
    }

    fn value_of(&self, observation: &[f32]) -> Result<f32> {
        let (_, values) = self.infer(observation.to_vec(), 1)?;
        Ok(values.first().copied().unwrap_or(0.0))
    }

    fn train_from_rollout(&mut self, config: &PpoConfig) -> Result<Diagnostics> {
        if !self.buffer.has_complete_targets() {
            let last_value = match (self.buffer.last(), self.buffer.bootstrap_observation()) {
                (Some(last), Some(next)) if !last.done => self.value_of(next)?,
                _ => 0.0,
            };
            self.buffer
                .fill_missing_targets(config.gamma, config.gae_lambda, last_value);
        }

        let mut data = RolloutData {
            observations: self.buffer.iter().flat_map(|t| t.observation.iter().copied()).collect(),
            actions: self.buffer.iter().flat_map(|t| t.action.iter().copied()).collect(),
            old_log_probs: self.buffer.iter().map(|t| t.log_prob).collect(),
            advantages: self.buffer.iter().map(|t| t.advantage.unwrap_or_default()).collect(),
            returns: self.buffer.iter().map(|t| t.ret.unwrap_or_default()).collect(),
            old_values: self.buffer.iter().map(|t| t.value).collect(),
        };

        if config.normalize_advantages {
            normalize_advantages(&mut data.advantages);
        }
        if config.clip_value_loss {
            let (_, values) = self.infer(data.observations.clone(), self.buffer.len())?;
            data.old_values = values;
        }

        let mut stats = MinibatchStats::default();
        let mut early_stopped = false;
        for epoch in 0..config.epochs {
            if let UpdateControl::Stop = self.run_epoch(config, &data, &mut stats)? {
                warn!(
                    epoch,
                    approx_kl = stats.approx_kl,
                    target_kl = config.target_kl,
                    "approximate KL exceeded target, stopping update"
                );
                early_stopped = true;
                break;
            }
        }

        Ok(Diagnostics {
            loss: stats.loss,
            policy_loss: stats.policy_loss,
            value_loss: stats.value_loss,
            entropy: stats.entropy,
            approx_kl: stats.approx_kl,
            learning_rate: config.learning_rate,
            gradient_steps: stats.gradient_steps,
            early_stopped,
        })
    }

    /// One shuffled pass over the rollout
    fn run_epoch(
        &mut self,
        config: &PpoConfig,
        data: &RolloutData,
        stats: &mut MinibatchStats,
    ) -> Result<UpdateControl> {
        let batches = self.buffer.minibatch_indices(config.mini_batch_size, &mut self.rng);
        let stride = self.action_stride();

        for indices in batches {
            let k = indices.len();
            let obs: Tensor<B, 2> = Tensor::from_data(
                TensorData::new(gather(&data.observations, &indices, self.obs_size), [k, self.obs_size]),
                &self.device,
            );
            let old_log_probs = self.tensor_1d(gather(&data.old_log_probs, &indices, 1));
            let advantages = self.tensor_1d(gather(&data.advantages, &indices, 1));
            let returns = self.tensor_1d(gather(&data.returns, &indices, 1));
            let old_values = self.tensor_1d(gather(&data.old_values, &indices, 1));
            let actions = gather(&data.actions, &indices, stride);

            let (policy_out, values) = self.network.forward(obs);
            let (new_log_probs, entropy) = match self.network.policy.log_std() {
                Some(log_std) => {
                    let actions: Tensor<B, 2> =
                        Tensor::from_data(TensorData::new(actions, [k, stride]), &self.device);
                    (
                        loss::gaussian_log_prob(policy_out, log_std.clone(), actions),
                        loss::gaussian_entropy(log_std),
                    )
                }
                None => {
                    let indices: Vec<i64> = actions.iter().map(|&a| a as i64).collect();
                    let actions: Tensor<B, 1, Int> =
                        Tensor::from_data(TensorData::new(indices, [k]), &self.device);
                    (
                        loss::categorical_log_prob(policy_out.clone(), actions),
                        loss::categorical_entropy(policy_out),
                    )
                }
            };

            let approx_kl = loss::approx_kl(old_log_probs.clone(), new_log_probs.clone().detach());
            let policy_loss =
                loss::clipped_surrogate_loss(new_log_probs, old_log_probs, advantages, config.clip_range);
            let value_loss = loss::value_loss(
                values,
                old_values,
                returns,
                config.clip_value_loss.then_some(config.clip_range),
            );

            let total_loss = policy_loss.clone() + value_loss.clone().mul_scalar(config.value_coeff)
                - entropy.clone().mul_scalar(config.entropy_coeff);

            let grads = GradientsParams::from_grads(total_loss.backward(), &self.network);
            self.network = self
                .optim
                .step(config.learning_rate, self.network.clone(), grads);

            stats.loss = total_loss.into_scalar().elem::<f32>();
            stats.policy_loss = policy_loss.into_scalar().elem::<f32>();
            stats.value_loss = value_loss.into_scalar().elem::<f32>();
            stats.entropy = entropy.into_scalar().elem::<f32>();
            stats.approx_kl = approx_kl.into_scalar().elem::<f32>();
            stats.gradient_steps += 1;

            if config.target_kl > 0.0 && stats.approx_kl > config.target_kl {
                return Ok(UpdateControl::Stop);
            }
        }
        Ok(UpdateControl::Continue)
    }

    fn tensor_1d(&self, values: Vec<f32>) -> Tensor<B, 1> {
        let len = values.len();
        Tensor::from_data(TensorData::new(values, [len]), &self.device)
    }
}

impl<B: AutodiffBackend> Algorithm for PpoAlgorithm<B> {
    fn name(&self) -> &'static str {
        "ppo"
    }

    fn init(&mut self, obs_shape: &[usize], action_size: usize, seed: &str) -> Result<()> {
        self.config.validate().map_err(RlError::InvalidConfig)?;
        let obs_size = validate_init_shapes(obs_shape, action_size)?;

        let mut rng = StdRng::seed_from_u64(seed_from_str(seed));
        let body = MlpConfig::new(obs_size, self.config.hidden_sizes.clone(), action_size)
            .init::<B, _>(&mut rng, &self.device);
        let policy = match self.config.policy_head {
            PolicyHead::Categorical => PolicyNetwork::categorical(body),
            PolicyHead::Gaussian => PolicyNetwork::gaussian(body, action_size, &self.device),
        };
        let value = MlpConfig::new(obs_size, self.config.hidden_sizes.clone(), 1)
            .init::<B, _>(&mut rng, &self.device);

        let grad_clipping = (self.config.max_grad_norm > 0.0)
            .then(|| GradientClippingConfig::Norm(self.config.max_grad_norm));
        let optim = AdamConfig::new().with_grad_clipping(grad_clipping).init();

        self.runtime = Some(PpoRuntime {
            network: ActorCritic::new(policy, value),
            optim,
            buffer: RolloutBuffer::new(),
            pending: VecDeque::new(),
            last_metadata: None,
            training_updates: 0,
            rng,
            obs_size,
            action_size,
            device: self.device.clone(),
        });
        self.lifecycle = Lifecycle::Ready;
        self.diagnostics = None;

        info!(
            ?obs_shape,
            action_size,
            seed,
            head = ?self.config.policy_head,
            "PPO initialized"
        );
        Ok(())
    }

    fn act(&mut self, observation: &[f32]) -> Result<Action> {
        self.act_with_metadata(observation).map(|m| m.action)
    }

    fn observe(&mut self, batch: &TrainBatch) -> Result<()> {
        self.observe_batch(batch)
    }

    fn save(&self) -> Result<Vec<u8>> {
        let rt = self.runtime.as_ref().ok_or(RlError::NotInitialized)?;
        let policy = codec::encode(&rt.network.policy.named_parameters()?)?;
        let value = codec::encode(&rt.network.value.named_parameters()?)?;
        let bytes = codec::encode_segments(&[&policy, &value])?;
        info!(bytes = bytes.len(), "PPO weights saved");
        Ok(bytes)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        let rt = self.runtime.as_mut().ok_or(RlError::NotInitialized)?;
        let segments = codec::decode_segments(bytes, 2)?;
        let policy_params = codec::decode(segments[0])?;
        let value_params = codec::decode(segments[1])?;

        let policy = rt.network.policy.clone().load_named_parameters(&policy_params)?;
        let value = rt.network.value.clone().load_named_parameters(&value_params)?;
        rt.network = ActorCritic::new(policy, value);
        rt.pending.clear();
        rt.last_metadata = None;

        info!(bytes = bytes.len(), "PPO weights loaded");
        Ok(())
    }

    fn dispose(&mut self) {
        self.runtime = None;
        self.lifecycle = Lifecycle::Disposed;
        info!("PPO disposed");
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    fn training_updates(&self) -> usize {
        self.runtime.as_ref().map_or(0, |rt| rt.training_updates)
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

/// Log-probability of a stored action under a host-side distribution
fn log_prob_under(distribution: &DistributionParams, action: &[f32]) -> f32 {
    match distribution {
        DistributionParams::Categorical { probs } => {
            categorical_log_prob(probs, action.first().map_or(0, |&a| a as usize))
        }
        DistributionParams::Gaussian { mean, std } => gaussian_log_prob(action, mean, std),
    }
}

/// Rows `indices` of a flat array with `stride` values per row
fn gather(values: &[f32], indices: &[usize], stride: usize) -> Vec<f32> {
    indices
        .iter()
        .flat_map(|&i| values[i * stride..(i + 1) * stride].iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::batch::BatchExtras;
    use burn::backend::{
        Autodiff,
        ndarray::{NdArray, NdArrayDevice},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    const OBS: [f32; 5] = [0.1, -0.2, 0.3, 0.4, -0.5];

    fn small_config() -> PpoConfig {
        PpoConfig {
            rollout_length: 4,
            mini_batch_size: 2,
            epochs: 1,
            hidden_sizes: vec![8],
            ..Default::default()
        }
    }

    fn create_test_algorithm(config: PpoConfig, seed: &str) -> PpoAlgorithm<TestBackend> {
        let mut ppo = PpoAlgorithm::new(config, NdArrayDevice::default());
        ppo.init(&[5], 4, seed).unwrap();
        ppo
    }

    fn batch_of(n: usize) -> TrainBatch {
        let mut batch = TrainBatch::new();
        for i in 0..n {
            let obs = [i as f32 * 0.1; 5];
            batch.push(&obs, &[(i % 4) as f32], 1.0, &[(i + 1) as f32 * 0.1; 5], i + 1 == n);
        }
        batch
    }

    #[test]
    fn test_act_before_init_fails() {
        let mut ppo = PpoAlgorithm::<TestBackend>::new(small_config(), NdArrayDevice::default());
        assert_eq!(ppo.lifecycle(), Lifecycle::Uninitialized);
        assert!(matches!(ppo.act(&OBS), Err(RlError::NotInitialized)));
        assert!(matches!(ppo.observe(&batch_of(1)), Err(RlError::NotInitialized)));
        assert!(matches!(ppo.save(), Err(RlError::NotInitialized)));
        assert!(matches!(ppo.load(&[]), Err(RlError::NotInitialized)));
    }

    #[test]
    fn test_calls_after_dispose_fail() {
        let mut ppo = create_test_algorithm(small_config(), "0");
        ppo.dispose();
        assert_eq!(ppo.lifecycle(), Lifecycle::Disposed);
        assert!(matches!(ppo.act(&OBS), Err(RlError::NotInitialized)));
        assert!(matches!(ppo.save(), Err(RlError::NotInitialized)));
        assert_eq!(ppo.rollout_len(), 0);
    }

    #[test]
    fn test_act_returns_valid_action_and_metadata() {
        let mut ppo = create_test_algorithm(small_config(), "1");
        let metadata = ppo.act_with_metadata(&OBS).unwrap();

        let index = metadata.action.as_discrete().unwrap();
        assert!(index < 4);
        assert!(metadata.log_prob < 0.0);
        assert!(metadata.value.is_finite());
        match &metadata.distribution {
            DistributionParams::Categorical { probs } => {
                assert_eq!(probs.len(), 4);
                assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
                assert!((probs[index].ln() - metadata.log_prob).abs() < 1e-5);
            }
            other => panic!("expected categorical, got {other:?}"),
        }
        assert_eq!(ppo.last_action_metadata(), Some(&metadata));
    }

    #[test]
    fn test_act_rejects_wrong_observation_size() {
        let mut ppo = create_test_algorithm(small_config(), "1");
        assert!(matches!(
            ppo.act(&[0.0; 3]),
            Err(RlError::ObservationSize { expected: 5, found: 3 })
        ));
    }

    #[test]
    fn test_same_seed_same_actions() {
        let mut a = create_test_algorithm(small_config(), "seed-a");
        let mut b = create_test_algorithm(small_config(), "seed-a");
        for _ in 0..10 {
            assert_eq!(a.act(&OBS).unwrap(), b.act(&OBS).unwrap());
        }
    }

    #[test]
    fn test_rollout_triggers_two_gradient_steps() {
        let mut ppo = create_test_algorithm(small_config(), "2");

        ppo.observe(&batch_of(4)).unwrap();

        let diagnostics = ppo.diagnostics().unwrap();
        assert_eq!(diagnostics.gradient_steps, 2);
        assert!(!diagnostics.early_stopped);
        assert!(diagnostics.loss.is_finite());
        assert_eq!(diagnostics.learning_rate, 3e-4);
        assert_eq!(ppo.rollout_len(), 0);
        assert_eq!(ppo.lifecycle(), Lifecycle::Ready);
    }

    #[test]
    fn test_underfilled_rollout_does_not_train() {
        let mut ppo = create_test_algorithm(small_config(), "3");
        ppo.observe(&batch_of(3)).unwrap();

        assert!(ppo.diagnostics().is_none());
        assert_eq!(ppo.rollout_len(), 3);
        assert_eq!(ppo.lifecycle(), Lifecycle::Collecting);
    }

    #[test]
    fn test_flush_trains_partial_rollout() {
        let mut ppo = create_test_algorithm(small_config(), "4");
        ppo.observe(&batch_of(3).with_flush(true)).unwrap();

        assert_eq!(ppo.diagnostics().unwrap().gradient_steps, 2);
        assert_eq!(ppo.rollout_len(), 0);
    }

    #[test]
    fn test_kl_early_stop_aborts_all_epochs() {
        let config = PpoConfig {
            epochs: 3,
            target_kl: 0.01,
            ..small_config()
        };
        let mut ppo = create_test_algorithm(config, "5");

        // Old log-prob 0 (p = 1) against a near-uniform policy gives KL ≈ ln 4
        let batch = batch_of(4).with_extras(BatchExtras {
            log_probs: Some(vec![0.0; 4]),
            ..Default::default()
        });
        ppo.observe(&batch).unwrap();

        let diagnostics = ppo.diagnostics().unwrap();
        assert_eq!(diagnostics.gradient_steps, 1);
        assert!(diagnostics.early_stopped);
        assert!(diagnostics.approx_kl > 0.01);
        assert_eq!(ppo.rollout_len(), 0);
    }

    #[test]
    fn test_recorded_metadata_used_for_acted_transitions() {
        let config = PpoConfig {
            rollout_length: 8,
            ..small_config()
        };
        let mut ppo = create_test_algorithm(config, "6");
        let metadata = ppo.act_with_metadata(&OBS).unwrap();

        let mut batch = TrainBatch::new();
        batch.push(&OBS, &metadata.action.to_vec(), 0.5, &OBS, false);
        ppo.observe(&batch).unwrap();

        let rt = ppo.runtime.as_ref().unwrap();
        let stored = rt.buffer.get(0).unwrap();
        assert_eq!(stored.log_prob, metadata.log_prob);
        assert_eq!(stored.value, metadata.value);
        assert!(rt.pending.is_empty());
    }

    #[test]
    fn test_finite_extras_override_recorded_values() {
        let config = PpoConfig {
            rollout_length: 8,
            ..small_config()
        };
        let mut ppo = create_test_algorithm(config, "7");
        let batch = batch_of(2).with_extras(BatchExtras {
            log_probs: Some(vec![-0.3, f32::NAN]),
            values: Some(vec![2.0]),
            advantages: Some(vec![1.5, 0.5]),
            ..Default::default()
        });
        ppo.observe(&batch).unwrap();

        let rt = ppo.runtime.as_ref().unwrap();
        let first = rt.buffer.get(0).unwrap();
        let second = rt.buffer.get(1).unwrap();
        assert_eq!(first.log_prob, -0.3);
        assert_eq!(first.value, 2.0);
        assert_eq!(first.advantage, Some(1.5));
        assert!(second.log_prob.is_finite() && second.log_prob < 0.0);
        assert_eq!(second.ret, None);
    }

    #[test]
    fn test_observe_rejects_out_of_range_action() {
        let mut ppo = create_test_algorithm(small_config(), "8");
        let mut batch = TrainBatch::new();
        batch.push(&OBS, &[4.0], 0.0, &OBS, false);
        assert!(matches!(ppo.observe(&batch), Err(RlError::InvalidBatch(_))));
        assert_eq!(ppo.rollout_len(), 0);
    }

    #[test]
    fn test_save_load_reproduces_distribution_and_action() {
        let mut source = create_test_algorithm(small_config(), "9");
        source.observe(&batch_of(4)).unwrap();
        let blob = source.save().unwrap();

        let mut a = create_test_algorithm(small_config(), "10");
        let mut b = create_test_algorithm(small_config(), "10");
        a.load(&blob).unwrap();
        b.load(&blob).unwrap();

        assert_eq!(
            a.policy_distribution(&OBS).unwrap(),
            source.policy_distribution(&OBS).unwrap()
        );
        assert_eq!(a.act(&OBS).unwrap(), b.act(&OBS).unwrap());
    }

    #[test]
    fn test_load_rejects_parameter_name_mismatch() {
        let gaussian = PpoConfig {
            policy_head: PolicyHead::Gaussian,
            ..small_config()
        };
        let source = create_test_algorithm(gaussian, "11");
        let blob = source.save().unwrap();

        let mut target = create_test_algorithm(small_config(), "11");
        assert!(matches!(
            target.load(&blob),
            Err(RlError::MissingWeight(name)) if name == "log_std"
        ));

        let categorical_blob = target.save().unwrap();
        let mut source = source;
        assert!(matches!(source.load(&categorical_blob), Err(RlError::MissingWeight(_))));
    }

    #[test]
    fn test_load_rejects_wider_network() {
        let wider = PpoConfig {
            hidden_sizes: vec![16],
            ..small_config()
        };
        let blob = create_test_algorithm(wider, "12").save().unwrap();

        let mut target = create_test_algorithm(small_config(), "12");
        assert!(matches!(target.load(&blob), Err(RlError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_load_truncated_blob_is_corrupt() {
        let mut ppo = create_test_algorithm(small_config(), "12");
        let blob = ppo.save().unwrap();
        assert!(matches!(
            ppo.load(&blob[..blob.len() / 2]),
            Err(RlError::CorruptWeights(_))
        ));
        assert!(matches!(ppo.load(&[1, 0]), Err(RlError::CorruptWeights(_))));
    }

    #[test]
    fn test_clipped_value_loss_update() {
        let config = PpoConfig {
            clip_value_loss: true,
            epochs: 2,
            ..small_config()
        };
        let mut ppo = create_test_algorithm(config, "13");
        ppo.observe(&batch_of(4)).unwrap();

        let diagnostics = ppo.diagnostics().unwrap();
        assert_eq!(diagnostics.gradient_steps, 4);
        assert!(diagnostics.value_loss.is_finite());
    }

    #[test]
    fn test_gaussian_head_continuous_actions() {
        let config = PpoConfig {
            policy_head: PolicyHead::Gaussian,
            ..small_config()
        };
        let mut ppo = PpoAlgorithm::<TestBackend>::new(config.clone(), NdArrayDevice::default());
        ppo.init(&[5], 2, "14").unwrap();

        let metadata = ppo.act_with_metadata(&OBS).unwrap();
        let action = match &metadata.action {
            Action::Continuous(values) => values.clone(),
            other => panic!("expected continuous action, got {other:?}"),
        };
        assert_eq!(action.len(), 2);
        match &metadata.distribution {
            DistributionParams::Gaussian { std, .. } => assert_eq!(std, &vec![1.0, 1.0]),
            other => panic!("expected gaussian, got {other:?}"),
        }

        let mut batch = TrainBatch::new();
        for _ in 0..4 {
            batch.push(&OBS, &action, 1.0, &OBS, false);
        }
        ppo.observe(&batch).unwrap();
        assert_eq!(ppo.diagnostics().unwrap().gradient_steps, 2);

        let blob = ppo.save().unwrap();
        let mut restored = PpoAlgorithm::<TestBackend>::new(config, NdArrayDevice::default());
        restored.init(&[5], 2, "15").unwrap();
        restored.load(&blob).unwrap();
        assert_eq!(
            restored.policy_distribution(&OBS).unwrap(),
            ppo.policy_distribution(&OBS).unwrap()
        );
    }

    #[test]
    fn test_gaussian_head_rejects_scalar_actions() {
        let config = PpoConfig {
            policy_head: PolicyHead::Gaussian,
            ..small_config()
        };
        let mut ppo = PpoAlgorithm::<TestBackend>::new(config, NdArrayDevice::default());
        ppo.init(&[5], 2, "16").unwrap();

        let mut batch = TrainBatch::new();
        batch.push(&OBS, &[0.5], 0.0, &OBS, false);
        assert!(matches!(ppo.observe(&batch), Err(RlError::InvalidBatch(_))));
    }

    #[test]
    fn test_reinit_after_dispose() {
        let mut ppo = create_test_algorithm(small_config(), "17");
        ppo.dispose();
        ppo.init(&[5], 4, "17").unwrap();
        assert_eq!(ppo.lifecycle(), Lifecycle::Ready);
        assert!(ppo.act(&OBS).is_ok());
    }
}
