use super::{action::Direction, config::GridWorldConfig};
use crate::rl::{Environment, StepOutcome};
use std::collections::HashSet;
use std::fmt;

/// A cell on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`
    pub fn distance_to(&self, other: Position) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Square grid with walls, a fixed start and a fixed goal
///
/// Observation: `[agent_x, agent_y, goal_x, goal_y, distance_to_goal]`.
/// Walking into a wall keeps the agent in place, pays the obstacle penalty
/// and ends the episode; reaching the goal pays the goal reward and ends it;
/// every other step pays the step penalty. Episodes are truncated after
/// `max_steps`.
pub struct GridWorld {
    config: GridWorldConfig,
    walls: HashSet<Position>,
    agent: Position,
    goal: Position,
    steps: usize,
}

impl GridWorld {
    /// Create a grid world; call [`Environment::reset`] before stepping
    pub fn new(config: GridWorldConfig) -> Self {
        let size = config.grid_size as i32;
        let mut walls = HashSet::new();

        // Border
        for i in 0..size {
            walls.insert(Position::new(i, 0));
            walls.insert(Position::new(i, size - 1));
            walls.insert(Position::new(0, i));
            walls.insert(Position::new(size - 1, i));
        }

        if config.interior_walls {
            // Three vertical walls; on the 25x25 grid they sit at x = 6, 12, 18
            let spans = [
                (size / 4, 2, 2 + size / 2),
                (size / 2, 3, 3 + size * 2 / 5),
                (size * 3 / 4, 2, 2 + size / 2),
            ];
            for (x, y_start, y_end) in spans {
                for y in y_start..y_end.min(size - 1) {
                    walls.insert(Position::new(x, y));
                }
            }
        }

        let start = Position::new(1, 1);
        let goal = Position::new(size - 2, size - 2);
        walls.remove(&start);
        walls.remove(&goal);

        Self {
            config,
            walls,
            agent: start,
            goal,
            steps: 0,
        }
    }

    pub fn agent(&self) -> Position {
        self.agent
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_wall(&self, pos: Position) -> bool {
        self.walls.contains(&pos)
    }

    fn observation(&self) -> Vec<f32> {
        vec![
            self.agent.x as f32,
            self.agent.y as f32,
            self.goal.x as f32,
            self.goal.y as f32,
            self.agent.distance_to(self.goal),
        ]
    }
}

impl Environment for GridWorld {
    fn observation_shape(&self) -> Vec<usize> {
        vec![5]
    }

    fn action_size(&self) -> usize {
        Direction::ALL.len()
    }

    fn reset(&mut self) -> Vec<f32> {
        self.agent = Position::new(1, 1);
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: usize) -> StepOutcome {
        let previous = self.agent;
        if let Some(direction) = Direction::from_index(action) {
            let (dx, dy) = direction.delta();
            let max = self.config.grid_size as i32 - 1;
            self.agent = Position::new(
                (self.agent.x + dx).clamp(0, max),
                (self.agent.y + dy).clamp(0, max),
            );
        }

        let hit_wall = self.is_wall(self.agent);
        if hit_wall {
            self.agent = previous;
        }
        let reached_goal = self.agent == self.goal;

        let reward = if hit_wall {
            self.config.obstacle_penalty
        } else if reached_goal {
            self.config.goal_reward
        } else {
            self.config.step_penalty
        };

        self.steps += 1;
        StepOutcome {
            observation: self.observation(),
            reward,
            terminated: hit_wall || reached_goal,
            truncated: self.steps >= self.config.max_steps,
        }
    }
}

impl fmt::Display for GridWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.config.grid_size as i32;
        for y in 0..size {
            let row: String = (0..size)
                .map(|x| {
                    let pos = Position::new(x, y);
                    if pos == self.agent {
                        'A'
                    } else if pos == self.goal {
                        'G'
                    } else if self.is_wall(pos) {
                        '#'
                    } else {
                        '.'
                    }
                })
                .collect();
            writeln!(f, "{row}")?;
        }
        Ok(())
    }
}
