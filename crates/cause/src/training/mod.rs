//! Training pipeline: hyperparameters, running statistics, the metrics sink,
//! checkpointing, and the loop that ties them together.

pub mod checkpoint;
pub mod config;
pub mod metrics;
pub mod stats;
pub mod trainer;
