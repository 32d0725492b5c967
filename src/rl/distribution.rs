//! Host-side action distributions
//!
//! Action selection reads the policy output back to host memory and samples
//! there with the algorithm's own RNG, so a seed fully determines the actions
//! taken.

use rand::Rng;

/// Floor applied to softmax denominators and to probabilities before `ln`
pub const PROB_EPSILON: f32 = 1e-8;

const LN_SQRT_2PI: f32 = 0.918_938_5;

/// Numerically stable softmax
///
/// Subtracts the maximum logit before exponentiating and floors the
/// denominator at [`PROB_EPSILON`].
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum = exps.iter().sum::<f32>().max(PROB_EPSILON);
    exps.into_iter().map(|e| e / sum).collect()
}

/// Cumulative-threshold sampling from a categorical distribution
///
/// Returns the first index whose cumulative probability reaches `u`, or the
/// last index when rounding leaves a remainder.
pub fn sample_categorical(probs: &[f32], u: f32) -> usize {
    let mut cumulative = 0.0;
    for (idx, &p) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= u {
            return idx;
        }
    }
    probs.len().saturating_sub(1)
}

/// `ln(max(p, ε))`
pub fn categorical_log_prob(probs: &[f32], action: usize) -> f32 {
    probs
        .get(action)
        .copied()
        .unwrap_or(0.0)
        .max(PROB_EPSILON)
        .ln()
}

/// One standard-normal draw (Box–Muller)
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f32 = rng.r#gen::<f32>().max(1e-10);
    let u2: f32 = rng.r#gen::<f32>();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Diagonal Gaussian log-density summed over dimensions
pub fn gaussian_log_prob(action: &[f32], mean: &[f32], std: &[f32]) -> f32 {
    action
        .iter()
        .zip(mean)
        .zip(std)
        .map(|((&a, &m), &s)| {
            let s = s.max(PROB_EPSILON);
            let z = (a - m) / s;
            -0.5 * z * z - s.ln() - LN_SQRT_2PI
        })
        .sum()
}

/// Map a seed string to a `u64`
///
/// Decimal strings parse directly; anything else is hashed with 64-bit
/// FNV-1a so the same string always yields the same seed.
pub fn seed_from_str(seed: &str) -> u64 {
    if let Ok(value) = seed.trim().parse::<u64>() {
        return value;
    }
    seed.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
