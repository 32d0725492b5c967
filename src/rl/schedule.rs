//! Step-indexed interpolation schedules

use serde::{Deserialize, Serialize};

/// Linear interpolation from `start` to `final_value` over `decay_steps`
///
/// Pure and deterministic: `value(0) == start`, `value(step) == final_value`
/// for every `step >= decay_steps`, linear in between. Used for the DQN
/// exploration rate.
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::LinearSchedule;
///
/// let schedule = LinearSchedule::new(1.0, 0.05, 1000);
/// assert_eq!(schedule.value(0), 1.0);
/// assert_eq!(schedule.value(1000), 0.05);
/// assert_eq!(schedule.value(5000), 0.05);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSchedule {
    start: f32,
    final_value: f32,
    decay_steps: u64,
}

impl LinearSchedule {
    pub fn new(start: f32, final_value: f32, decay_steps: u64) -> Self {
        Self {
            start,
            final_value,
            decay_steps,
        }
    }

    /// Value of the schedule at `step`
    pub fn value(&self, step: u64) -> f32 {
        if step >= self.decay_steps {
            return self.final_value;
        }
        let fraction = step as f64 / self.decay_steps as f64;
        let start = self.start as f64;
        (start + (self.final_value as f64 - start) * fraction) as f32
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn final_value(&self) -> f32 {
        self.final_value
    }

    pub fn decay_steps(&self) -> u64 {
        self.decay_steps
    }
}
