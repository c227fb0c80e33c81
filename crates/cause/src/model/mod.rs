//! The model contract driven by the training loop, and its burn implementation.
//!
//! The loop only sees [`Model`]: one optimizer step per batch, inference-mode
//! losses, probabilities for held-out scoring, and an opaque save. The burn
//! module, loss functions, and optimizer wiring live in the submodules.

pub mod learner;
pub mod loss;
pub mod prod2vec;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Interaction;
use crate::error::TrainError;
use crate::treatment::{treatment_ids, Catalog};

/// One step's worth of interactions with their treatment ids attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub users: Vec<u32>,
    pub products: Vec<u32>,
    /// Parallel to `products`: the treatment-half identity each product is
    /// balanced against.
    pub treatment_ids: Vec<u32>,
    pub labels: Vec<f32>,
}

impl Batch {
    /// Build a batch, assigning treatment ids from the catalog.
    pub fn from_records(records: &[Interaction], catalog: &Catalog) -> Result<Self, TrainError> {
        let products: Vec<u32> = records.iter().map(|r| r.product).collect();
        let treatment_ids = treatment_ids(&products, catalog)?;
        Ok(Self {
            users: records.iter().map(|r| r.user).collect(),
            products,
            treatment_ids,
            labels: records.iter().map(|r| r.label).collect(),
        })
    }

    /// Build a batch whose treatment slot holds the original product ids.
    ///
    /// The balance term vanishes, leaving the factual losses. Used for the
    /// final test-set evaluation.
    pub fn factual(records: &[Interaction]) -> Self {
        let products: Vec<u32> = records.iter().map(|r| r.product).collect();
        Self {
            users: records.iter().map(|r| r.user).collect(),
            treatment_ids: products.clone(),
            products,
            labels: records.iter().map(|r| r.label).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The three loss components reported per step: the optimized total, the
/// squared error of the predicted probability, and the classification log loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossComponents {
    pub total: f64,
    pub mse: f64,
    pub log_loss: f64,
}

impl LossComponents {
    pub fn new(total: f64, mse: f64, log_loss: f64) -> Self {
        Self { total, mse, log_loss }
    }

    pub fn is_finite(&self) -> bool {
        self.total.is_finite() && self.mse.is_finite() && self.log_loss.is_finite()
    }
}

/// What the training loop needs from a model.
///
/// `train_step` is the only mutating operation; every read (`infer`,
/// `predict`, `save`) takes `&self`, so evaluation can never observe a
/// half-applied update.
pub trait Model {
    /// Forward + backward + parameter update on one batch.
    fn train_step(&mut self, batch: &Batch) -> anyhow::Result<LossComponents>;

    /// Losses on a batch in inference mode, without updating parameters.
    fn infer(&self, batch: &Batch) -> anyhow::Result<LossComponents>;

    /// Predicted interaction probabilities for parallel user/product ids.
    fn predict(&self, users: &[u32], products: &[u32]) -> anyhow::Result<Vec<f64>>;

    /// Number of trainable scalars.
    fn num_params(&self) -> usize;

    /// Persist parameters into `dir`, overwriting any previous payload there.
    fn save(&self, dir: &Path) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_assigns_treatment_ids() {
        let catalog = Catalog::doubled(3, 5).unwrap();
        let records = vec![
            Interaction::new(0, 1, 1.0),
            Interaction::new(2, 7, 0.0),
        ];
        let batch = Batch::from_records(&records, &catalog).unwrap();
        assert_eq!(batch.products, vec![1, 7]);
        assert_eq!(batch.treatment_ids, vec![6, 7]);
        assert_eq!(batch.users, vec![0, 2]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_factual_batch_reuses_products() {
        let records = vec![Interaction::new(0, 1, 1.0), Interaction::new(1, 3, 0.0)];
        let batch = Batch::factual(&records);
        assert_eq!(batch.treatment_ids, batch.products);
    }

    #[test]
    fn test_batch_rejects_out_of_catalog_product() {
        let catalog = Catalog::doubled(3, 5).unwrap();
        let records = vec![Interaction::new(0, 10, 1.0)];
        assert!(Batch::from_records(&records, &catalog).is_err());
    }
}
