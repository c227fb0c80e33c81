use std::path::{Path, PathBuf};

/// Errors surfaced by the training pipeline.
///
/// Stream exhaustion is not represented here: it is the `Ok(None)` sentinel
/// returned by [`crate::BatchSource::next_batch`].
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Invalid hyperparameters or a dataset that does not fit the catalog.
    /// Raised before the loop starts running.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A product id outside `[0, num_products)` reached treatment assignment.
    #[error("Product id {id} is outside the catalog of {num_products} products")]
    ProductOutOfRange { id: u32, num_products: u32 },

    /// Forward/backward or validation inference failed. No checkpoint is
    /// written for the failing step.
    #[error(
        "Computation failed at step {step} (last checkpoint: {}): {reason:#}",
        display_checkpoint(last_checkpoint.as_deref())
    )]
    Computation {
        step: usize,
        last_checkpoint: Option<PathBuf>,
        reason: anyhow::Error,
    },

    /// The training stream failed to produce a batch.
    #[error("Data stream failed at step {step}: {reason:#}")]
    Data { step: usize, reason: anyhow::Error },

    /// A checkpoint or metrics artifact could not be written.
    ///
    /// Never retried: the run aborts at the failed write.
    #[error("Failed to write {}: {reason:#}", path.display())]
    Resource { path: PathBuf, reason: anyhow::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn display_checkpoint(path: Option<&Path>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "none".to_string(),
    }
}

impl TrainError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error was raised before training started.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
