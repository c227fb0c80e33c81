//! Causal Prod2Vec: joint user/product embeddings trained against a
//! treatment/control balance regularizer.
//!
//! The product catalog is doubled at startup (the "2i" scheme) so every
//! product has a shadow identity in the upper half of the id range. Training
//! pulls the two identities together with a counterfactual distance penalty
//! while fitting a logistic click model on the observed interactions.
//!
//! # Key types
//!
//! - [`Trainer`]: the training loop state machine
//! - [`Model`]: the contract the loop drives; [`Prod2VecLearner`] is the burn
//!   implementation
//! - [`TrainingConfig`]: immutable hyperparameters
//! - [`Catalog`] / [`treatment_ids`]: treatment/control assignment
//! - [`bootstrap`] / [`final_evaluation`]: held-out evaluation

pub mod data;
pub mod error;
pub mod eval;
pub mod mocks;
pub mod model;
pub mod training;
pub mod treatment;

pub use data::{
    load_interactions, training_source, BatchSource, DatasetPaths, EvalSet, Interaction,
    PrefetchStream, TrainStream,
};
pub use error::TrainError;
pub use eval::bootstrap::{bootstrap, BootstrapTrial};
pub use eval::summary::{BootstrapSummary, HeldOutMetrics, MetricSummary};
pub use eval::{final_evaluation, run_bootstrap_passes, BootstrapReport};
pub use model::learner::{load_model, Prod2VecLearner};
pub use model::prod2vec::{CausalProd2Vec, CausalProd2VecConfig};
pub use model::{Batch, LossComponents, Model};
pub use training::checkpoint::{latest_checkpoint, read_meta, CheckpointMeta, Checkpointer};
pub use training::config::{CfDistance, TrainingConfig};
pub use training::trainer::{Termination, TrainOutcome, Trainer, TrainerState};
pub use treatment::{shift_to_counterpart, treatment_id, treatment_ids, Catalog};
