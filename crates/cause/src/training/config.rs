use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Distance between a product embedding and its treatment-id embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CfDistance {
    /// Sum of absolute differences.
    #[default]
    L1,
    /// Euclidean norm of the difference.
    L2,
}

impl fmt::Display for CfDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfDistance::L1 => write!(f, "l1"),
            CfDistance::L2 => write!(f, "l2"),
        }
    }
}

impl FromStr for CfDistance {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l1" => Ok(CfDistance::L1),
            "l2" => Ok(CfDistance::L2),
            other => Err(TrainError::config(format!(
                "unknown cf_distance '{other}' (expected l1 or l2)"
            ))),
        }
    }
}

/// Hyperparameters for a training run. Built once, then passed by reference.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Directory holding the dataset files.
    #[config(default = "String::from(\"data\")")]
    pub data_dir: String,
    /// Dataset file prefix, e.g. `user_prod_dict.skew.`.
    #[config(default = "String::from(\"user_prod_dict.skew.\")")]
    pub data_set: String,
    /// Dataset file suffix naming the adaptation scheme.
    #[config(default = "String::from(\"adapt_2i\")")]
    pub adapt_stat: String,
    /// Products before the 2i doubling.
    #[config(default = 9724)]
    pub num_products: usize,
    #[config(default = 610)]
    pub num_users: usize,
    /// Prefix of checkpoint directory names.
    #[config(default = "String::from(\"cp2v\")")]
    pub model_name: String,
    /// Root for checkpoints, metrics and results.
    #[config(default = "String::from(\"./tmp/tensorboard\")")]
    pub logging_dir: String,
    #[config(default = 0.8)]
    pub learning_rate: f64,
    /// Weight of the embedding L2 penalty.
    #[config(default = 0.5)]
    pub l2_pen: f64,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 512)]
    pub batch_size: usize,
    /// Steps between progress reports and validation runs.
    #[config(default = 40)]
    pub report_interval: usize,
    #[config(default = false)]
    pub early_stopping_enabled: bool,
    /// Trailing validation window compared against the latest value.
    #[config(default = 200)]
    pub early_stopping_patience: usize,
    /// Steps before early stopping is considered. `None` means the patience.
    pub early_stopping_min_steps: Option<usize>,
    #[config(default = 123)]
    pub seed: u64,
    #[config(default = 10)]
    pub embedding_size: usize,
    /// Weight of the counterfactual balance term.
    #[config(default = 0.5)]
    pub cf_pen: f64,
    #[config(default = "CfDistance::L1")]
    pub cf_distance: CfDistance,
    /// Reshuffle the training set every epoch.
    #[config(default = true)]
    pub shuffle: bool,
    /// Batches buffered by the loader thread. 0 loads inline.
    #[config(default = 2)]
    pub prefetch_batches: usize,
    /// Whether dataset files start with a header row.
    #[config(default = true)]
    pub has_header: bool,
    #[config(default = 30)]
    pub bootstrap_trials: usize,
    #[config(default = 10_000)]
    pub bootstrap_sample_size: usize,
}

impl TrainingConfig {
    /// Step threshold after which early stopping may fire.
    pub fn early_stopping_min_steps(&self) -> usize {
        self.early_stopping_min_steps
            .unwrap_or(self.early_stopping_patience)
    }

    /// Reject hyperparameters the loop cannot run with.
    pub fn validate(&self) -> Result<(), TrainError> {
        let positive = [
            ("batch_size", self.batch_size),
            ("report_interval", self.report_interval),
            ("num_epochs", self.num_epochs),
            ("num_products", self.num_products),
            ("num_users", self.num_users),
            ("embedding_size", self.embedding_size),
            ("bootstrap_sample_size", self.bootstrap_sample_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(TrainError::config(format!("{name} must be > 0")));
            }
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainError::config(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        for (name, value) in [("l2_pen", self.l2_pen), ("cf_pen", self.cf_pen)] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrainError::config(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if self.model_name.is_empty() {
            return Err(TrainError::config("model_name must not be empty"));
        }
        Ok(())
    }
}
