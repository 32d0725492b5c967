//! PPO loss terms on tensors
//!
//! All functions return 1-element tensors suitable for `backward`.

use burn::tensor::{
    Int, Tensor,
    activation::{log_softmax, softmax},
    backend::Backend,
};

/// `0.5 * ln(2π)`
const HALF_LN_2PI: f32 = 0.918_938_5;

/// Clipped surrogate loss
///
/// ```text
/// ratio = exp(new - old)
/// L = -mean(min(ratio * A, clip(ratio, 1 - ε, 1 + ε) * A))
/// ```
pub fn clipped_surrogate_loss<B: Backend>(
    new_log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_range: f32,
) -> Tensor<B, 1> {
    let ratio = (new_log_probs - old_log_probs).exp();
    let clipped_ratio = ratio.clone().clamp(1.0 - clip_range, 1.0 + clip_range);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped_ratio * advantages;

    surr1.min_pair(surr2).mean().neg()
}

/// Value regression loss, optionally clipped around the pre-update values
///
/// With `clip = Some(ε)`:
///
/// ```text
/// v_clip = v_old + clip(v - v_old, -ε, ε)
/// L = mean(max((R - v)², (R - v_clip)²))
/// ```
///
/// Otherwise plain `mean((R - v)²)`.
pub fn value_loss<B: Backend>(
    values: Tensor<B, 1>,
    old_values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    clip: Option<f32>,
) -> Tensor<B, 1> {
    match clip {
        Some(clip) => {
            let values_clipped =
                old_values.clone() + (values.clone() - old_values).clamp(-clip, clip);
            let unclipped = (returns.clone() - values).powf_scalar(2.0);
            let clipped = (returns - values_clipped).powf_scalar(2.0);
            unclipped.max_pair(clipped).mean()
        }
        None => (returns - values).powf_scalar(2.0).mean(),
    }
}

/// Log-probabilities of `actions` under categorical `logits`
pub fn categorical_log_prob<B: Backend>(
    logits: Tensor<B, 2>,
    actions: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    log_softmax(logits, 1)
        .gather(1, actions.unsqueeze_dim(1))
        .squeeze::<1>(1)
}

/// `mean(-Σ p log p)` over the action dimension
pub fn categorical_entropy<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1> {
    let probs = softmax(logits.clone(), 1);
    let log_probs = log_softmax(logits, 1);
    (probs * log_probs).sum_dim(1).neg().mean()
}

/// Diagonal Gaussian log-density summed over action dimensions
///
/// `log_std` is state-independent, `[action_size]`.
pub fn gaussian_log_prob<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 1>,
    actions: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch_size, _] = mean.dims();
    let log_std = log_std.unsqueeze::<2>().repeat_dim(0, batch_size);
    let z = (actions - mean) / log_std.clone().exp();

    (z.powf_scalar(2.0).mul_scalar(-0.5) - log_std)
        .sub_scalar(HALF_LN_2PI)
        .sum_dim(1)
        .squeeze::<1>(1)
}

/// Entropy of a diagonal Gaussian: `Σ (log σ + 0.5 (1 + ln 2π))`
pub fn gaussian_entropy<B: Backend>(log_std: Tensor<B, 1>) -> Tensor<B, 1> {
    log_std.add_scalar(0.5 + HALF_LN_2PI).sum()
}

/// `mean(old - new)`
pub fn approx_kl<B: Backend>(old_log_probs: Tensor<B, 1>, new_log_probs: Tensor<B, 1>) -> Tensor<B, 1> {
    (old_log_probs - new_log_probs).mean()
}
