//! Deterministic [`Model`] for exercising the training loop and evaluators
//! without tensors.

use std::cell::RefCell;
use std::path::Path;

use crate::model::{Batch, LossComponents, Model};

/// A model whose losses and predictions follow a fixed script.
///
/// - `train_step` returns losses derived from the batch and the step count,
///   so identical batch streams give identical losses.
/// - `infer` returns the scripted validation losses in order, repeating the
///   last one once the script runs out. Every batch it sees is recorded.
/// - `predict` returns one probability for control-half products and another
///   for treatment-half products.
#[derive(Debug)]
pub struct ScriptedModel {
    steps: usize,
    validation_losses: Vec<f64>,
    inferred: RefCell<Vec<Batch>>,
    fail_train_at: Option<usize>,
    fail_infer_at: Option<usize>,
    threshold: u32,
    control_prob: f64,
    treatment_prob: f64,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            steps: 0,
            validation_losses: Vec::new(),
            inferred: RefCell::new(Vec::new()),
            fail_train_at: None,
            fail_infer_at: None,
            threshold: u32::MAX,
            control_prob: 0.5,
            treatment_prob: 0.5,
        }
    }

    /// Validation totals returned by successive `infer` calls.
    pub fn with_validation_losses(mut self, losses: Vec<f64>) -> Self {
        self.validation_losses = losses;
        self
    }

    /// Fail the `n`th training step (1-based).
    pub fn failing_train_at(mut self, n: usize) -> Self {
        self.fail_train_at = Some(n);
        self
    }

    /// Fail the `n`th inference call (1-based).
    pub fn failing_infer_at(mut self, n: usize) -> Self {
        self.fail_infer_at = Some(n);
        self
    }

    /// Predict `control` below `threshold` and `treatment` at or above it.
    pub fn with_predictions(mut self, threshold: u32, control: f64, treatment: f64) -> Self {
        self.threshold = threshold;
        self.control_prob = control;
        self.treatment_prob = treatment;
        self
    }

    /// Training steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Inference calls made so far.
    pub fn validations(&self) -> usize {
        self.inferred.borrow().len()
    }

    /// Batches passed to `infer`, in call order.
    pub fn inferred_batches(&self) -> Vec<Batch> {
        self.inferred.borrow().clone()
    }
}

impl Model for ScriptedModel {
    fn train_step(&mut self, batch: &Batch) -> anyhow::Result<LossComponents> {
        self.steps += 1;
        if self.fail_train_at == Some(self.steps) {
            anyhow::bail!("scripted failure at step {}", self.steps);
        }
        let label_mean =
            batch.labels.iter().map(|&l| l as f64).sum::<f64>() / batch.len().max(1) as f64;
        let product_sum: u64 = batch.products.iter().map(|&p| p as u64).sum();
        let total = label_mean + 1.0 / self.steps as f64 + (product_sum % 7) as f64 * 0.01;
        Ok(LossComponents::new(total, total / 2.0, total * 0.8))
    }

    fn infer(&self, batch: &Batch) -> anyhow::Result<LossComponents> {
        self.inferred.borrow_mut().push(batch.clone());
        let n = self.validations();
        if self.fail_infer_at == Some(n) {
            anyhow::bail!("scripted inference failure on call {n}");
        }
        let total = self
            .validation_losses
            .get(n - 1)
            .or(self.validation_losses.last())
            .copied()
            .unwrap_or(1.0);
        Ok(LossComponents::new(total, total / 2.0, total))
    }

    fn predict(&self, users: &[u32], products: &[u32]) -> anyhow::Result<Vec<f64>> {
        if users.len() != products.len() {
            anyhow::bail!("users and products differ in length");
        }
        Ok(products
            .iter()
            .map(|&p| {
                if p >= self.threshold {
                    self.treatment_prob
                } else {
                    self.control_prob
                }
            })
            .collect())
    }

    fn num_params(&self) -> usize {
        42
    }

    fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let json = serde_json::json!({ "steps": self.steps });
        std::fs::write(dir.join("scripted.json"), json.to_string())?;
        Ok(())
    }
}
