//! DQN (Deep Q-Network) algorithm
//!
//! Off-policy value learning with an experience replay buffer, a hard-synced
//! target network and epsilon-greedy exploration. The target network lives on
//! the inner (non-autodiff) backend since it never needs gradients.

use super::algorithm::{Algorithm, Diagnostics, Lifecycle, check_observation, validate_init_shapes};
use super::batch::{Action, TrainBatch};
use super::codec::{self, to_host};
use super::config::DqnConfig;
use super::distribution::seed_from_str;
use super::error::{Result, RlError};
use super::network::{FunctionApproximator, Mlp, MlpConfig};
use super::replay::{ReplayBuffer, ReplayTransition};
use super::schedule::LinearSchedule;
use burn::{
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{ElementConversion, Tensor, TensorData, backend::AutodiffBackend},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Vanilla DQN with a hard-synced target network
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::{Algorithm, DqnAlgorithm, DqnConfig, TrainingBackend, default_device};
///
/// let config = DqnConfig {
///     min_buffer_before_training: 4,
///     batch_size: 2,
///     hidden_sizes: vec![16],
///     ..Default::default()
/// };
/// let mut dqn = DqnAlgorithm::<TrainingBackend>::new(config, default_device());
/// dqn.init(&[3], 2, "7").unwrap();
///
/// assert_eq!(dqn.epsilon(), 1.0);
/// assert!(dqn.act(&[0.0, 0.5, 1.0]).unwrap().as_discrete().unwrap() < 2);
/// ```
pub struct DqnAlgorithm<B: AutodiffBackend> {
    config: DqnConfig,
    device: B::Device,
    runtime: Option<DqnRuntime<B>>,
    lifecycle: Lifecycle,
    diagnostics: Option<Diagnostics>,
}

struct DqnRuntime<B: AutodiffBackend> {
    online: Mlp<B>,
    target: Mlp<B::InnerBackend>,
    optim: OptimizerAdaptor<Adam, Mlp<B>, B>,
    replay: ReplayBuffer,
    epsilon: LinearSchedule,
    /// Cumulative transitions observed since `init`
    step_count: u64,
    training_updates: usize,
    rng: StdRng,
    obs_size: usize,
    action_size: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> DqnAlgorithm<B> {
    pub fn new(config: DqnConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            runtime: None,
            lifecycle: Lifecycle::Uninitialized,
            diagnostics: None,
        }
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    /// Current exploration rate, or the schedule start before `init`
    pub fn epsilon(&self) -> f32 {
        self.runtime
            .as_ref()
            .map_or(self.config.epsilon_start, |rt| rt.epsilon.value(rt.step_count))
    }

    pub fn step_count(&self) -> u64 {
        self.runtime.as_ref().map_or(0, |rt| rt.step_count)
    }

    pub fn replay_len(&self) -> usize {
        self.runtime.as_ref().map_or(0, |rt| rt.replay.len())
    }

    /// Whether every target parameter equals its online counterpart exactly
    pub fn target_matches_online(&self) -> Result<bool> {
        let rt = self.runtime.as_ref().ok_or(RlError::NotInitialized)?;
        Ok(rt.online.named_parameters()? == rt.target.named_parameters()?)
    }

    /// Online Q-values for one observation
    pub fn q_values(&self, observation: &[f32]) -> Result<Vec<f32>> {
        let rt = self.runtime.as_ref().ok_or(RlError::NotInitialized)?;
        check_observation(observation, rt.obs_size)?;
        rt.q_values(observation)
    }

    fn observe_batch(&mut self, batch: &TrainBatch) -> Result<()> {
        let config = &self.config;
        let rt = self.runtime.as_mut().ok_or(RlError::NotInitialized)?;

        let n = batch.len();
        let stride = batch.validate(rt.obs_size)?;
        if n > 0 && stride != 1 {
            return Err(RlError::InvalidBatch(format!(
                "expected one action index per transition, found {stride}"
            )));
        }
        let actions = batch
            .actions
            .iter()
            .map(|&a| {
                if a >= 0.0 && a.fract() == 0.0 && (a as usize) < rt.action_size {
                    Ok(a as usize)
                } else {
                    Err(RlError::InvalidBatch(format!(
                        "action {a} is not an index below {}",
                        rt.action_size
                    )))
                }
            })
            .collect::<Result<Vec<usize>>>()?;

        for (i, action) in actions.into_iter().enumerate() {
            rt.replay.add(ReplayTransition {
                observation: batch.observation(i, rt.obs_size).to_vec(),
                action,
                reward: batch.rewards[i],
                next_observation: batch.next_observation(i, rt.obs_size).to_vec(),
                done: batch.dones[i],
            });
        }

        let previous = rt.step_count;
        rt.step_count += n as u64;

        if n > 0 && rt.replay.len() >= config.min_buffer_before_training && !rt.replay.is_empty() {
            let loss = rt.train_step(config)?;
            rt.training_updates += 1;
            debug!(loss, updates = rt.training_updates, "DQN update finished");
            self.diagnostics = Some(Diagnostics {
                loss,
                value_loss: loss,
                learning_rate: config.learning_rate,
                gradient_steps: 1,
                ..Default::default()
            });
        }

        let frequency = config.target_update_frequency;
        if previous / frequency < rt.step_count / frequency {
            rt.target = rt.online.valid();
            debug!(step = rt.step_count, "target network synced");
        }

        self.lifecycle = if rt.replay.len() < config.min_buffer_before_training {
            Lifecycle::Collecting
        } else {
            Lifecycle::Ready
        };
        Ok(())
    }
}

impl<B: AutodiffBackend> DqnRuntime<B> {
    fn q_values(&self, observation: &[f32]) -> Result<Vec<f32>> {
        let input = Tensor::<B::InnerBackend, 2>::from_data(
            TensorData::new(observation.to_vec(), [1, self.obs_size]),
            &self.device,
        );
        to_host(self.online.valid().forward(input))
    }

    /// One gradient step on a uniformly sampled replay minibatch
    fn train_step(&mut self, config: &DqnConfig) -> Result<f32> {
        let (observations, next_observations, actions, rewards, dones) = {
            let samples = self.replay.sample(config.batch_size, &mut self.rng);
            (
                samples.iter().flat_map(|t| t.observation.iter().copied()).collect::<Vec<f32>>(),
                samples.iter().flat_map(|t| t.next_observation.iter().copied()).collect::<Vec<f32>>(),
                samples.iter().map(|t| t.action).collect::<Vec<usize>>(),
                samples.iter().map(|t| t.reward).collect::<Vec<f32>>(),
                samples.iter().map(|t| t.done).collect::<Vec<bool>>(),
            )
        };
        let k = actions.len();

        // target = r + γ · max_a' Q_target(s', a') · (1 - done)
        let next_q = to_host(self.target.forward(Tensor::<B::InnerBackend, 2>::from_data(
            TensorData::new(next_observations, [k, self.obs_size]),
            &self.device,
        )))?;
        let targets: Vec<f32> = next_q
            .chunks(self.action_size)
            .zip(rewards.iter().zip(&dones))
            .map(|(row, (&reward, &done))| {
                let max_next = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                if done { reward } else { reward + config.gamma * max_next }
            })
            .collect();

        let mut mask = vec![0.0f32; k * self.action_size];
        for (row, &action) in actions.iter().enumerate() {
            mask[row * self.action_size + action] = 1.0;
        }

        let obs: Tensor<B, 2> = Tensor::from_data(
            TensorData::new(observations, [k, self.obs_size]),
            &self.device,
        );
        let mask: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(mask, [k, self.action_size]), &self.device);
        let targets: Tensor<B, 1> = Tensor::from_data(TensorData::new(targets, [k]), &self.device);

        let selected = (self.online.forward(obs) * mask).sum_dim(1).squeeze::<1>(1);
        let diff = selected - targets;
        let loss = (diff.clone() * diff).mean();

        let grads = GradientsParams::from_grads(loss.backward(), &self.online);
        self.online = self
            .optim
            .step(config.learning_rate, self.online.clone(), grads);

        Ok(loss.into_scalar().elem::<f32>())
    }
}

impl<B: AutodiffBackend> Algorithm for DqnAlgorithm<B> {
    fn name(&self) -> &'static str {
        "dqn"
    }

    fn init(&mut self, obs_shape: &[usize], action_size: usize, seed: &str) -> Result<()> {
        self.config.validate().map_err(RlError::InvalidConfig)?;
        let obs_size = validate_init_shapes(obs_shape, action_size)?;

        let mut rng = StdRng::seed_from_u64(seed_from_str(seed));
        let online = MlpConfig::new(obs_size, self.config.hidden_sizes.clone(), action_size)
            .init::<B, _>(&mut rng, &self.device);
        let target = online.valid();

        self.runtime = Some(DqnRuntime {
            online,
            target,
            optim: AdamConfig::new().init(),
            replay: ReplayBuffer::new(self.config.buffer_size),
            epsilon: LinearSchedule::new(
                self.config.epsilon_start,
                self.config.epsilon_final,
                self.config.epsilon_decay_steps,
            ),
            step_count: 0,
            training_updates: 0,
            rng,
            obs_size,
            action_size,
            device: self.device.clone(),
        });
        self.lifecycle = Lifecycle::Ready;
        self.diagnostics = None;

        info!(?obs_shape, action_size, seed, "DQN initialized");
        Ok(())
    }

    /// Epsilon-greedy over the online network's Q-values
    fn act(&mut self, observation: &[f32]) -> Result<Action> {
        let rt = self.runtime.as_mut().ok_or(RlError::NotInitialized)?;
        check_observation(observation, rt.obs_size)?;

        let epsilon = rt.epsilon.value(rt.step_count);
        if rt.rng.r#gen::<f32>() < epsilon {
            return Ok(Action::Discrete(rt.rng.gen_range(0..rt.action_size)));
        }
        Ok(Action::Discrete(argmax(&rt.q_values(observation)?)))
    }

    fn observe(&mut self, batch: &TrainBatch) -> Result<()> {
        self.observe_batch(batch)
    }

    fn save(&self) -> Result<Vec<u8>> {
        let rt = self.runtime.as_ref().ok_or(RlError::NotInitialized)?;
        let bytes = codec::encode(&rt.online.named_parameters()?)?;
        info!(bytes = bytes.len(), "DQN weights saved");
        Ok(bytes)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        let rt = self.runtime.as_mut().ok_or(RlError::NotInitialized)?;
        let params = codec::decode(bytes)?;
        rt.online = rt.online.clone().load_named_parameters(&params)?;
        rt.target = rt.online.valid();
        info!(bytes = bytes.len(), "DQN weights loaded");
        Ok(())
    }

    fn dispose(&mut self) {
        self.runtime = None;
        self.lifecycle = Lifecycle::Disposed;
        info!("DQN disposed");
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

/// Index of the largest value, first on ties
fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value { (i, v) } else { (best, best_value) }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{
        Autodiff,
        ndarray::{NdArray, NdArrayDevice},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    const OBS: [f32; 3] = [0.2, -0.4, 0.6];

    fn scenario_config() -> DqnConfig {
        DqnConfig {
            buffer_size: 10,
            min_buffer_before_training: 5,
            batch_size: 2,
            target_update_frequency: 8,
            hidden_sizes: vec![8],
            ..Default::default()
        }
    }

    fn create_test_algorithm(config: DqnConfig, seed: &str) -> DqnAlgorithm<TestBackend> {
        let mut dqn = DqnAlgorithm::new(config, NdArrayDevice::default());
        dqn.init(&[3], 2, seed).unwrap();
        dqn
    }

    fn single(i: usize) -> TrainBatch {
        let mut batch = TrainBatch::new();
        let x = i as f32 * 0.1;
        batch.push(&[x, -x, 1.0], &[(i % 2) as f32], 1.0, &[x + 0.1, -x, 1.0], i % 3 == 2);
        batch
    }

    #[test]
    fn test_calls_before_init_fail() {
        let mut dqn = DqnAlgorithm::<TestBackend>::new(scenario_config(), NdArrayDevice::default());
        assert!(matches!(dqn.act(&OBS), Err(RlError::NotInitialized)));
        assert!(matches!(dqn.observe(&single(0)), Err(RlError::NotInitialized)));
        assert!(matches!(dqn.save(), Err(RlError::NotInitialized)));
        assert!(matches!(dqn.load(&[]), Err(RlError::NotInitialized)));
    }

    #[test]
    fn test_calls_after_dispose_fail() {
        let mut dqn = create_test_algorithm(scenario_config(), "0");
        dqn.observe(&single(0)).unwrap();
        dqn.dispose();

        assert_eq!(dqn.lifecycle(), Lifecycle::Disposed);
        assert_eq!(dqn.replay_len(), 0);
        assert!(matches!(dqn.act(&OBS), Err(RlError::NotInitialized)));
        assert!(matches!(dqn.observe(&single(1)), Err(RlError::NotInitialized)));
    }

    #[test]
    fn test_target_synced_at_init() {
        let dqn = create_test_algorithm(scenario_config(), "1");
        assert!(dqn.target_matches_online().unwrap());
    }

    #[test]
    fn test_warmup_then_single_update() {
        let mut dqn = create_test_algorithm(scenario_config(), "2");

        for i in 0..4 {
            dqn.observe(&single(i)).unwrap();
            assert_eq!(dqn.training_updates(), 0);
            assert_eq!(dqn.lifecycle(), Lifecycle::Collecting);
        }
        assert!(dqn.diagnostics().is_none());

        dqn.observe(&single(4)).unwrap();
        assert_eq!(dqn.training_updates(), 1);
        assert_eq!(dqn.replay_len(), 5);
        assert_eq!(dqn.step_count(), 5);

        let diagnostics = dqn.diagnostics().unwrap();
        assert_eq!(diagnostics.gradient_steps, 1);
        assert!(diagnostics.loss.is_finite());
    }

    #[test]
    fn test_empty_batch_does_not_train() {
        let mut dqn = create_test_algorithm(scenario_config(), "2");
        for i in 0..5 {
            dqn.observe(&single(i)).unwrap();
        }
        assert_eq!(dqn.training_updates(), 1);

        dqn.observe(&TrainBatch::new()).unwrap();
        assert_eq!(dqn.training_updates(), 1);
        assert_eq!(dqn.step_count(), 5);
        assert_eq!(dqn.replay_len(), 5);
    }

    #[test]
    fn test_target_equals_online_after_update_frequency() {
        let mut dqn = create_test_algorithm(scenario_config(), "3");

        for i in 0..7 {
            dqn.observe(&single(i)).unwrap();
        }
        // Online has trained since init, target has not synced yet
        assert!(!dqn.target_matches_online().unwrap());

        dqn.observe(&single(7)).unwrap();
        assert_eq!(dqn.step_count(), 8);
        assert!(dqn.target_matches_online().unwrap());
    }

    #[test]
    fn test_sync_when_batch_crosses_multiple() {
        let config = DqnConfig {
            target_update_frequency: 3,
            min_buffer_before_training: 1,
            ..scenario_config()
        };
        let mut dqn = create_test_algorithm(config, "4");

        let mut batch = TrainBatch::new();
        for i in 0..4 {
            batch.push(&[i as f32, 0.0, 0.0], &[1.0], 0.5, &[0.0, 0.0, 0.0], false);
        }
        dqn.observe(&batch).unwrap();

        assert_eq!(dqn.step_count(), 4);
        assert!(dqn.target_matches_online().unwrap());
    }

    #[test]
    fn test_epsilon_decays_with_step_count() {
        let config = DqnConfig {
            epsilon_start: 1.0,
            epsilon_final: 0.1,
            epsilon_decay_steps: 10,
            min_buffer_before_training: 10,
            ..scenario_config()
        };
        let mut dqn = create_test_algorithm(config, "5");
        assert_eq!(dqn.epsilon(), 1.0);

        for i in 0..5 {
            dqn.observe(&single(i)).unwrap();
        }
        assert!((dqn.epsilon() - 0.55).abs() < 1e-6);

        for i in 5..15 {
            dqn.observe(&single(i)).unwrap();
        }
        assert_eq!(dqn.epsilon(), 0.1);
    }

    #[test]
    fn test_greedy_action_is_argmax() {
        let config = DqnConfig {
            epsilon_start: 0.0,
            epsilon_final: 0.0,
            ..scenario_config()
        };
        let mut dqn = create_test_algorithm(config, "6");
        let q = dqn.q_values(&OBS).unwrap();
        let action = dqn.act(&OBS).unwrap().as_discrete().unwrap();
        assert_eq!(action, argmax(&q));
    }

    #[test]
    fn test_random_actions_in_range() {
        let mut dqn = create_test_algorithm(scenario_config(), "7");
        for _ in 0..50 {
            assert!(dqn.act(&OBS).unwrap().as_discrete().unwrap() < 2);
        }
    }

    #[test]
    fn test_save_load_same_greedy_action() {
        let greedy = DqnConfig {
            epsilon_start: 0.0,
            epsilon_final: 0.0,
            min_buffer_before_training: 1,
            ..scenario_config()
        };
        let mut source = create_test_algorithm(greedy.clone(), "8");
        for i in 0..6 {
            source.observe(&single(i)).unwrap();
        }
        let blob = source.save().unwrap();

        let mut restored = create_test_algorithm(greedy, "9");
        restored.load(&blob).unwrap();

        assert_eq!(restored.q_values(&OBS).unwrap(), source.q_values(&OBS).unwrap());
        assert_eq!(restored.act(&OBS).unwrap(), source.act(&OBS).unwrap());
        assert!(restored.target_matches_online().unwrap());
    }

    #[test]
    fn test_load_rejects_other_architecture() {
        let blob = create_test_algorithm(scenario_config(), "10").save().unwrap();
        let deeper = DqnConfig {
            hidden_sizes: vec![8, 8],
            ..scenario_config()
        };
        let mut target = DqnAlgorithm::<TestBackend>::new(deeper, NdArrayDevice::default());
        target.init(&[3], 2, "10").unwrap();

        // dense_1 exists with another shape, so the first failure is a shape check
        assert!(matches!(
            target.load(&blob),
            Err(RlError::ShapeMismatch { .. } | RlError::MissingWeight(_))
        ));

        let mut params = codec::decode(&blob).unwrap();
        params.retain(|p| p.name != "dense_1/bias");
        let partial = codec::encode(&params).unwrap();
        let mut same = create_test_algorithm(scenario_config(), "10");
        assert!(matches!(
            same.load(&partial),
            Err(RlError::MissingWeight(name)) if name == "dense_1/bias"
        ));
    }

    #[test]
    fn test_observe_rejects_bad_actions() {
        let mut dqn = create_test_algorithm(scenario_config(), "11");
        let mut batch = TrainBatch::new();
        batch.push(&OBS, &[2.0], 0.0, &OBS, false);
        assert!(matches!(dqn.observe(&batch), Err(RlError::InvalidBatch(_))));

        let mut batch = TrainBatch::new();
        batch.push(&OBS, &[0.5], 0.0, &OBS, false);
        assert!(matches!(dqn.observe(&batch), Err(RlError::InvalidBatch(_))));
        assert_eq!(dqn.replay_len(), 0);
    }

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[0.5, 2.0, 2.0, -1.0]), 1);
        assert_eq!(argmax(&[3.0]), 0);
    }
}
