//! Rolling statistics reported by the training and evaluation loops

pub mod training_stats;

pub use training_stats::TrainingStats;
