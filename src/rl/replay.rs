//! Fixed-capacity experience replay for DQN
//!
//! A ring buffer: once full, each insertion overwrites the oldest entry.
//! Sampling is uniform with replacement over occupied slots and draws from a
//! caller-supplied random source so runs are reproducible.

use rand::Rng;

/// One off-policy transition
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayTransition {
    pub observation: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_observation: Vec<f32>,
    pub done: bool,
}

/// Circular store of [`ReplayTransition`]s
///
/// # Example
///
/// ```rust
/// use playground_rl::rl::{ReplayBuffer, ReplayTransition};
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut buffer = ReplayBuffer::new(2);
/// for i in 0..3 {
///     buffer.add(ReplayTransition {
///         observation: vec![i as f32],
///         action: 0,
///         reward: 0.0,
///         next_observation: vec![0.0],
///         done: false,
///     });
/// }
/// assert_eq!(buffer.len(), 2);
///
/// let mut rng = StdRng::seed_from_u64(0);
/// assert_eq!(buffer.sample(5, &mut rng).len(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    slots: Vec<ReplayTransition>,
    capacity: usize,
    /// Next slot to overwrite once the buffer is full
    cursor: usize,
}

impl ReplayBuffer {
    /// Create an empty buffer; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity.min(4096)),
            capacity,
            cursor: 0,
        }
    }

    /// Insert at the ring cursor, evicting the oldest entry when full
    pub fn add(&mut self, transition: ReplayTransition) {
        if self.slots.len() < self.capacity {
            self.slots.push(transition);
        } else {
            self.slots[self.cursor] = transition;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Draw `n` transitions independently and uniformly, with replacement
    ///
    /// Returns an empty vector when the buffer is empty.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<&ReplayTransition> {
        if self.slots.is_empty() {
            return Vec::new();
        }
        (0..n)
            .map(|_| &self.slots[rng.gen_range(0..self.slots.len())])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Occupied slots from oldest to newest insertion
    pub fn iter(&self) -> impl Iterator<Item = &ReplayTransition> {
        let split = if self.is_full() { self.cursor } else { 0 };
        self.slots[split..].iter().chain(self.slots[..split].iter())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }
}
