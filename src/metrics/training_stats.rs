//! Rolling training statistics
//!
//! Tracks episode outcomes reported by the driver loop and the diagnostics
//! of each training update, smoothed over a fixed window.

use crate::rl::Diagnostics;
use std::collections::VecDeque;

/// Fixed-size window of recent values
#[derive(Debug, Clone)]
struct RollingWindow {
    values: VecDeque<f32>,
    capacity: usize,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Mean of the window, 0.0 when empty
    fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

/// Training statistics tracker with rolling averages
///
/// # Example
///
/// ```rust
/// use playground_rl::metrics::TrainingStats;
/// use playground_rl::rl::Diagnostics;
///
/// let mut stats = TrainingStats::new(100);
/// stats.record_episode(0.8, 21, true);
/// stats.record_update(&Diagnostics { loss: 0.3, entropy: 1.2, ..Default::default() });
///
/// assert_eq!(stats.total_episodes(), 1);
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    rewards: RollingWindow,
    lengths: RollingWindow,
    /// 1.0 for episodes that ended by success, 0.0 otherwise
    successes: RollingWindow,
    losses: RollingWindow,
    entropies: RollingWindow,
    approx_kls: RollingWindow,

    total_episodes: usize,
    total_steps: usize,
    total_updates: usize,
    early_stops: usize,
    window_size: usize,
}

impl TrainingStats {
    /// Create a tracker keeping the last `window_size` values of each metric
    pub fn new(window_size: usize) -> Self {
        Self {
            rewards: RollingWindow::new(window_size),
            lengths: RollingWindow::new(window_size),
            successes: RollingWindow::new(window_size),
            losses: RollingWindow::new(window_size),
            entropies: RollingWindow::new(window_size),
            approx_kls: RollingWindow::new(window_size),
            total_episodes: 0,
            total_steps: 0,
            total_updates: 0,
            early_stops: 0,
            window_size,
        }
    }

    /// Record a finished episode
    pub fn record_episode(&mut self, reward: f32, length: usize, success: bool) {
        self.rewards.push(reward);
        self.lengths.push(length as f32);
        self.successes.push(if success { 1.0 } else { 0.0 });
        self.total_episodes += 1;
        self.total_steps += length;
    }

    /// Record the diagnostics of one training update
    pub fn record_update(&mut self, diagnostics: &Diagnostics) {
        self.losses.push(diagnostics.loss);
        self.entropies.push(diagnostics.entropy);
        self.approx_kls.push(diagnostics.approx_kl);
        self.total_updates += 1;
        if diagnostics.early_stopped {
            self.early_stops += 1;
        }
    }

    pub fn mean_episode_reward(&self) -> f32 {
        self.rewards.mean()
    }

    pub fn mean_episode_length(&self) -> f32 {
        self.lengths.mean()
    }

    /// Fraction of recent episodes that ended by success
    pub fn success_rate(&self) -> f32 {
        self.successes.mean()
    }

    pub fn mean_loss(&self) -> f32 {
        self.losses.mean()
    }

    pub fn mean_entropy(&self) -> f32 {
        self.entropies.mean()
    }

    pub fn mean_approx_kl(&self) -> f32 {
        self.approx_kls.mean()
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Updates cut short by the KL threshold
    pub fn early_stops(&self) -> usize {
        self.early_stops
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary of the current statistics
    pub fn format_summary(&self) -> String {
        format!(
            "Episodes: {} | Steps: {} | Reward: {:.2} | Success: {:.0}% | Len: {:.1} | Updates: {} | Loss: {:.4} | Entropy: {:.4} | KL: {:.4}",
            self.total_episodes,
            self.total_steps,
            self.mean_episode_reward(),
            self.success_rate() * 100.0,
            self.mean_episode_length(),
            self.total_updates,
            self.mean_loss(),
            self.mean_entropy(),
            self.mean_approx_kl(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics(loss: f32, entropy: f32) -> Diagnostics {
        Diagnostics {
            loss,
            entropy,
            ..Default::default()
        }
    }

    #[test]
    fn test_new() {
        let stats = TrainingStats::new(100);
        assert_eq!(stats.window_size(), 100);
        assert_eq!(stats.total_episodes(), 0);
        assert_eq!(stats.total_updates(), 0);
    }

    #[test]
    fn test_record_episode() {
        let mut stats = TrainingStats::new(100);
        stats.record_episode(10.0, 50, true);

        assert_eq!(stats.total_episodes(), 1);
        assert_eq!(stats.total_steps(), 50);
        assert!((stats.mean_episode_reward() - 10.0).abs() < 1e-5);
        assert!((stats.mean_episode_length() - 50.0).abs() < 1e-5);
        assert_eq!(stats.success_rate(), 1.0);
    }

    #[test]
    fn test_rolling_average_evicts_oldest() {
        let mut stats = TrainingStats::new(3);
        stats.record_episode(1.0, 10, false);
        stats.record_episode(2.0, 20, false);
        stats.record_episode(3.0, 30, true);
        assert!((stats.mean_episode_reward() - 2.0).abs() < 1e-5);

        stats.record_episode(4.0, 40, true);
        assert_eq!(stats.total_episodes(), 4);
        assert!((stats.mean_episode_reward() - 3.0).abs() < 1e-5);
        assert!((stats.success_rate() - 2.0 / 3.0).abs() < 1e-5);
        assert_eq!(stats.total_steps(), 100);
    }

    #[test]
    fn test_record_update_counts_early_stops() {
        let mut stats = TrainingStats::new(2);
        stats.record_update(&diagnostics(0.1, 0.9));
        stats.record_update(&Diagnostics {
            early_stopped: true,
            ..diagnostics(0.2, 0.8)
        });
        stats.record_update(&diagnostics(0.3, 0.7));

        assert_eq!(stats.total_updates(), 3);
        assert_eq!(stats.early_stops(), 1);
        assert!((stats.mean_loss() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_format_summary() {
        let mut stats = TrainingStats::new(100);
        stats.record_episode(15.5, 150, true);
        stats.record_update(&diagnostics(0.02, 0.8));

        let summary = stats.format_summary();
        assert!(summary.contains("Episodes: 1"));
        assert!(summary.contains("Steps: 150"));
        assert!(summary.contains("Reward: 15.50"));
        assert!(summary.contains("Success: 100%"));
        assert!(summary.contains("Updates: 1"));
        assert!(summary.contains("Loss: 0.0200"));
        assert!(summary.contains("Entropy: 0.8000"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = TrainingStats::new(10);
        assert_eq!(stats.mean_episode_reward(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.mean_loss(), 0.0);
    }
}
