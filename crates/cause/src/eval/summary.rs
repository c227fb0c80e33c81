//! Held-out metrics and summary statistics over bootstrap trials.

use serde::{Deserialize, Serialize};

use crate::eval::bootstrap::BootstrapTrial;
use crate::model::loss::LOG_EPS;

/// Squared error and log loss of a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeldOutMetrics {
    pub mse: f64,
    pub log_loss: f64,
}

impl HeldOutMetrics {
    pub fn compute(predictions: &[f64], labels: &[f32]) -> Self {
        Self {
            mse: mean_squared_error(predictions, labels),
            log_loss: log_loss(predictions, labels),
        }
    }
}

/// Mean of `(p - y)^2`. Zero for empty input.
pub fn mean_squared_error(predictions: &[f64], labels: &[f32]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(&p, &y)| (p - y as f64).powi(2))
        .sum();
    sum / predictions.len() as f64
}

/// Binary cross-entropy with the same clipping as the training loss.
pub fn log_loss(predictions: &[f64], labels: &[f32]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let y = y as f64;
            y * (p + LOG_EPS).ln() + (1.0 - y) * (1.0 - p + LOG_EPS).ln()
        })
        .sum();
    -sum / predictions.len() as f64
}

/// Mean, standard deviation, and the 2.5/97.5 percentiles of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
}

impl MetricSummary {
    /// `None` for an empty sequence.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            mean,
            std: var.sqrt(),
            lower: percentile(&sorted, 2.5),
            upper: percentile(&sorted, 97.5),
        })
    }
}

/// Linear-interpolated percentile of an ascending, non-empty slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Per-metric summaries of one bootstrap pass, for the model and the
/// baseline-rate predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub trials: usize,
    pub model_mse: MetricSummary,
    pub model_log_loss: MetricSummary,
    pub baseline_mse: MetricSummary,
    pub baseline_log_loss: MetricSummary,
}

impl BootstrapSummary {
    pub fn from_trials(trials: &[BootstrapTrial]) -> Option<Self> {
        let column = |f: fn(&BootstrapTrial) -> f64| -> Vec<f64> { trials.iter().map(f).collect() };
        Some(Self {
            trials: trials.len(),
            model_mse: MetricSummary::from_values(&column(|t| t.model.mse))?,
            model_log_loss: MetricSummary::from_values(&column(|t| t.model.log_loss))?,
            baseline_mse: MetricSummary::from_values(&column(|t| t.baseline.mse))?,
            baseline_log_loss: MetricSummary::from_values(&column(|t| t.baseline.log_loss))?,
        })
    }

    /// Log the summary under `label`.
    pub fn log(&self, label: &str) {
        tracing::info!(
            pass = label,
            trials = self.trials,
            mse = format!("{:.5} ± {:.5}", self.model_mse.mean, self.model_mse.std),
            mse_ci = format!("[{:.5}, {:.5}]", self.model_mse.lower, self.model_mse.upper),
            log_loss = format!("{:.5} ± {:.5}", self.model_log_loss.mean, self.model_log_loss.std),
            log_loss_ci = format!(
                "[{:.5}, {:.5}]",
                self.model_log_loss.lower, self.model_log_loss.upper
            ),
            baseline_mse = format!("{:.5}", self.baseline_mse.mean),
            baseline_log_loss = format!("{:.5}", self.baseline_log_loss.mean),
            "Bootstrap summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_and_log_loss() {
        let preds = [0.5, 0.5];
        let labels = [1.0, 0.0];
        assert!((mean_squared_error(&preds, &labels) - 0.25).abs() < 1e-12);
        assert!((log_loss(&preds, &labels) - 2.0_f64.ln()).abs() < 1e-6);
        assert_eq!(mean_squared_error(&[], &[]), 0.0);
    }

    #[test]
    fn test_log_loss_is_finite_at_extremes() {
        let loss = log_loss(&[0.0, 1.0], &[1.0, 0.0]);
        assert!(loss.is_finite());
        assert!(loss > 15.0, "got {loss}");
    }

    #[test]
    fn test_metric_summary() {
        let s = MetricSummary::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((s.mean - 3.0).abs() < 1e-12);
        assert!((s.std - 2.0_f64.sqrt()).abs() < 1e-12);
        // rank = 0.025 * 4 = 0.1
        assert!((s.lower - 1.1).abs() < 1e-12, "got {}", s.lower);
        assert!((s.upper - 4.9).abs() < 1e-12, "got {}", s.upper);
        assert!(MetricSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_single_value_summary() {
        let s = MetricSummary::from_values(&[0.3]).unwrap();
        assert_eq!(s.std, 0.0);
        assert_eq!(s.lower, 0.3);
        assert_eq!(s.upper, 0.3);
    }

    #[test]
    fn test_bootstrap_summary_columns() {
        let trial = |m: f64, b: f64| BootstrapTrial {
            model: HeldOutMetrics { mse: m, log_loss: 2.0 * m },
            baseline: HeldOutMetrics { mse: b, log_loss: 2.0 * b },
        };
        let summary = BootstrapSummary::from_trials(&[trial(0.1, 0.3), trial(0.3, 0.5)]).unwrap();
        assert_eq!(summary.trials, 2);
        assert!((summary.model_mse.mean - 0.2).abs() < 1e-12);
        assert!((summary.model_log_loss.mean - 0.4).abs() < 1e-12);
        assert!((summary.baseline_mse.mean - 0.4).abs() < 1e-12);
        assert!(BootstrapSummary::from_trials(&[]).is_none());
    }
}
