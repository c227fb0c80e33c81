//! Result types written to `{logging_dir}/results.json`.

use std::path::Path;

use cause::{BootstrapReport, BootstrapSummary, LossComponents, Termination, TrainingConfig};
use serde::{Deserialize, Serialize};

/// Everything a `train` or `evaluate` run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Hyperparameters the run used.
    pub config: TrainingConfig,
    /// Checkpoint directory the evaluated model came from.
    pub checkpoint: String,
    /// Present for `train` runs only.
    pub training: Option<TrainingSummary>,
    /// Single pass over the full test set.
    pub test: LossComponents,
    /// Bootstrap over the original product ids.
    pub bootstrap_original: Option<BootstrapSummary>,
    /// Bootstrap over ids shifted into the complementary half.
    pub bootstrap_shifted: Option<BootstrapSummary>,
    /// Per-trial metrics behind both summaries.
    pub trials: BootstrapReport,
}

/// How the training loop ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub termination: Termination,
    pub steps: usize,
    pub validation_history: Vec<f64>,
    /// `(step, loss)` of the lowest validation total.
    pub best_validation: Option<(usize, f64)>,
    pub elapsed_secs: f64,
}

impl RunResult {
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote run results");
        Ok(())
    }

    pub fn read_json(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        serde_json::from_reader(file)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
    }

    /// Human-readable report on stdout.
    pub fn print(&self) {
        println!("\n--- Causal Prod2Vec Results ---");
        println!("Checkpoint: {}", self.checkpoint);
        if let Some(t) = &self.training {
            println!("Termination: {:?} after {} steps ({:.1}s)", t.termination, t.steps, t.elapsed_secs);
            if let Some((step, loss)) = t.best_validation {
                println!("Best validation loss: {loss:.5} at step {step}");
            }
        }
        println!(
            "Test loss (total, MSE, NLL): {:.5}, {:.5}, {:.5}",
            self.test.total, self.test.mse, self.test.log_loss
        );
        for (label, summary) in [
            ("original", &self.bootstrap_original),
            ("shifted", &self.bootstrap_shifted),
        ] {
            if let Some(s) = summary {
                println!(
                    "Bootstrap {label:>8} ({} trials): MSE {:.5} ± {:.5} [{:.5}, {:.5}]  NLL {:.5} ± {:.5} [{:.5}, {:.5}]",
                    s.trials,
                    s.model_mse.mean,
                    s.model_mse.std,
                    s.model_mse.lower,
                    s.model_mse.upper,
                    s.model_log_loss.mean,
                    s.model_log_loss.std,
                    s.model_log_loss.lower,
                    s.model_log_loss.upper,
                );
                println!(
                    "          baseline: MSE {:.5}  NLL {:.5}",
                    s.baseline_mse.mean, s.baseline_log_loss.mean
                );
            }
        }
    }
}
