//! Generalized Advantage Estimation and advantage normalization
//!
//! ```text
//! δ_t = r_t + γ V(s_{t+1}) (1 - done_t) - V(s_t)
//! Â_t = δ_t + γλ (1 - done_t) Â_{t+1}
//! R_t = Â_t + V(s_t)
//! ```
//!
//! PPO uses these when a caller hands over transitions without precomputed
//! advantages or returns.

/// Floor added to the variance before the square root
pub const NORMALIZE_EPSILON: f32 = 1e-8;

/// Compute GAE advantages and returns for one ordered rollout
///
/// # Arguments
///
/// * `rewards` - Rewards `[T]`
/// * `values` - Value estimates `V(s_t)` `[T]`
/// * `dones` - Terminal flags `[T]`
/// * `last_value` - `V(s_T)` used to bootstrap the final transition
/// * `gamma` - Discount factor
/// * `gae_lambda` - Bias/variance trade-off λ
///
/// # Returns
///
/// `(advantages, returns)`, both of length `T`
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len().min(values.len()).min(dones.len());
    let mut advantages = vec![0.0f32; n];
    let mut returns = vec![0.0f32; n];

    let mut gae = 0.0f32;
    let mut next_value = last_value;

    for t in (0..n).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        gae = delta + gamma * gae_lambda * not_done * gae;

        advantages[t] = gae;
        returns[t] = gae + values[t];
        next_value = values[t];
    }

    (advantages, returns)
}

/// Normalize advantages in place to zero mean and unit variance
///
/// Uses the population variance: `(a - mean) / sqrt(var + 1e-8)`. Empty
/// slices are left untouched.
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.is_empty() {
        return;
    }
    let n = advantages.len() as f32;
    let mean = advantages.iter().sum::<f32>() / n;
    let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;
    let denom = (variance + NORMALIZE_EPSILON).sqrt();

    for a in advantages.iter_mut() {
        *a = (*a - mean) / denom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_step_terminal() {
        let (adv, ret) = compute_gae(&[1.0], &[0.5], &[true], 10.0, 0.99, 0.95);
        // Terminal: bootstrap value is masked out
        assert!((adv[0] - 0.5).abs() < 1e-6);
        assert!((ret[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bootstraps_from_last_value() {
        let (adv, _) = compute_gae(&[0.0], &[0.0], &[false], 1.0, 0.5, 1.0);
        assert!((adv[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_lambda_zero_is_td_error() {
        let rewards = [1.0, 1.0, 1.0];
        let values = [0.5, 0.5, 0.5];
        let dones = [false, false, false];
        let (adv, _) = compute_gae(&rewards, &values, &dones, 0.5, 0.9, 0.0);
        for a in adv {
            assert!((a - (1.0 + 0.9 * 0.5 - 0.5)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_episode_boundary_stops_accumulation() {
        let rewards = [1.0, 100.0];
        let values = [0.0, 0.0];
        let dones = [true, false];
        let (adv, _) = compute_gae(&rewards, &values, &dones, 0.0, 0.99, 0.95);
        assert!((adv[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_mean_zero_std_one() {
        let mut advantages = vec![1.0, 2.0, 3.0, 4.0, 10.0, -3.0];
        normalize_advantages(&mut advantages);

        let n = advantages.len() as f32;
        let mean = advantages.iter().sum::<f32>() / n;
        let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;

        assert!(mean.abs() < 1e-5);
        assert!((variance.sqrt() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_constant_batch_stays_finite() {
        let mut advantages = vec![2.0; 5];
        normalize_advantages(&mut advantages);
        assert!(advantages.iter().all(|a| a.is_finite() && a.abs() < 1e-3));
    }

    #[test]
    fn test_normalize_empty() {
        let mut advantages: Vec<f32> = Vec::new();
        normalize_advantages(&mut advantages);
        assert!(advantages.is_empty());
    }
}
