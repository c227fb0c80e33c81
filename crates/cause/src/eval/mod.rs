//! Held-out evaluation after training: one deterministic pass over the full
//! test set, and the two bootstrap passes (original and shifted product ids).

pub mod bootstrap;
pub mod summary;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{EvalSet, Interaction};
use crate::eval::bootstrap::{bootstrap, BootstrapTrial};
use crate::eval::summary::BootstrapSummary;
use crate::model::{Batch, LossComponents, Model};
use crate::treatment::Catalog;

/// Score the whole test set once, with the original product ids in the
/// treatment slot.
pub fn final_evaluation<M: Model + ?Sized>(
    model: &M,
    records: &[Interaction],
) -> anyhow::Result<LossComponents> {
    if records.is_empty() {
        anyhow::bail!("test set is empty");
    }
    let losses = model.infer(&Batch::factual(records))?;
    tracing::info!(
        records = records.len(),
        total = losses.total,
        mse = losses.mse,
        log_loss = losses.log_loss,
        "Test loss"
    );
    Ok(losses)
}

/// Trials from both bootstrap passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub original: Vec<BootstrapTrial>,
    pub shifted: Vec<BootstrapTrial>,
}

impl BootstrapReport {
    pub fn original_summary(&self) -> Option<BootstrapSummary> {
        BootstrapSummary::from_trials(&self.original)
    }

    pub fn shifted_summary(&self) -> Option<BootstrapSummary> {
        BootstrapSummary::from_trials(&self.shifted)
    }
}

/// Bootstrap the held-out set as-is, then again with every product shifted
/// into the complementary half of the catalog.
pub fn run_bootstrap_passes<M, R>(
    model: &M,
    set: &EvalSet,
    catalog: &Catalog,
    trials: usize,
    sample_size: usize,
    rng: &mut R,
) -> anyhow::Result<BootstrapReport>
where
    M: Model + ?Sized,
    R: Rng,
{
    tracing::info!(trials, sample_size, "Bootstrap pass: original products");
    let original = bootstrap(model, set, trials, sample_size, rng)?;

    let shifted_set = set.shifted(catalog)?;
    tracing::info!(trials, sample_size, "Bootstrap pass: shifted products");
    let shifted = bootstrap(model, &shifted_set, trials, sample_size, rng)?;

    let report = BootstrapReport { original, shifted };
    if let Some(s) = report.original_summary() {
        s.log("original");
    }
    if let Some(s) = report.shifted_summary() {
        s.log("shifted");
    }
    Ok(report)
}
