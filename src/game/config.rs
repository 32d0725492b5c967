use serde::{Deserialize, Serialize};

/// Configuration for the grid world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridWorldConfig {
    /// Side length of the square grid, border included
    pub grid_size: usize,
    /// Steps before an episode is truncated
    pub max_steps: usize,
    /// Add the three vertical interior walls
    pub interior_walls: bool,

    // Rewards
    /// Reward for reaching the goal
    pub goal_reward: f32,
    /// Penalty for each step (encourages efficiency)
    pub step_penalty: f32,
    /// Penalty for walking into a wall, which also ends the episode
    pub obstacle_penalty: f32,
}

impl Default for GridWorldConfig {
    fn default() -> Self {
        Self {
            grid_size: 25,
            max_steps: 100,
            interior_walls: true,
            goal_reward: 1.0,
            step_penalty: -0.01,
            obstacle_penalty: -1.0,
        }
    }
}

impl GridWorldConfig {
    /// Create a new configuration with custom grid size
    pub fn new(grid_size: usize) -> Self {
        Self {
            grid_size,
            ..Default::default()
        }
    }

    /// Create a small open grid for testing
    pub fn small() -> Self {
        Self {
            grid_size: 5,
            max_steps: 20,
            interior_walls: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.grid_size < 4 {
            return Err(format!(
                "grid size must be at least 4, got {}",
                self.grid_size
            ));
        }
        if self.max_steps == 0 {
            return Err("max steps must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridWorldConfig::default();
        assert_eq!(config.grid_size, 25);
        assert_eq!(config.max_steps, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_config() {
        let config = GridWorldConfig::new(15);
        assert_eq!(config.grid_size, 15);
        assert!(config.interior_walls);
    }

    #[test]
    fn test_too_small_grid_rejected() {
        assert!(GridWorldConfig::new(3).validate().is_err());
    }
}
