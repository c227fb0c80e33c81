use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::EvalSet;
use crate::eval::summary::HeldOutMetrics;
use crate::model::Model;

/// Metrics from one resample: the model's predictions and the constant
/// baseline-rate predictor on the same rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapTrial {
    pub model: HeldOutMetrics,
    pub baseline: HeldOutMetrics,
}

/// Resample `set` with replacement `trials` times and score each resample.
///
/// Returns one entry per trial, in order. Summary statistics are left to
/// [`crate::BootstrapSummary`].
pub fn bootstrap<M, R>(
    model: &M,
    set: &EvalSet,
    trials: usize,
    sample_size: usize,
    rng: &mut R,
) -> anyhow::Result<Vec<BootstrapTrial>>
where
    M: Model + ?Sized,
    R: Rng,
{
    if set.is_empty() {
        anyhow::bail!("cannot bootstrap an empty held-out set");
    }
    if sample_size == 0 {
        anyhow::bail!("bootstrap sample size must be > 0");
    }

    let pb = ProgressBar::new(trials as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) Bootstrap")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut out = Vec::with_capacity(trials);
    let mut indices = vec![0usize; sample_size];
    for trial in 0..trials {
        for idx in indices.iter_mut() {
            *idx = rng.gen_range(0..set.len());
        }
        let sample = set.select(&indices);
        let predictions = model
            .predict(&sample.users, &sample.products)
            .map_err(|e| anyhow::anyhow!("Bootstrap trial {trial} failed: {e:#}"))?;
        let baseline: Vec<f64> = sample.baseline.iter().map(|&b| b as f64).collect();

        out.push(BootstrapTrial {
            model: HeldOutMetrics::compute(&predictions, &sample.labels),
            baseline: HeldOutMetrics::compute(&baseline, &sample.labels),
        });
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Interaction;
    use crate::mocks::ScriptedModel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn eval_set() -> EvalSet {
        let records: Vec<Interaction> = (0..20)
            .map(|i| Interaction::new(i % 4, i % 5, (i % 2) as f32))
            .collect();
        EvalSet::from_records(&records)
    }

    #[test]
    fn test_one_entry_per_trial() {
        let model = ScriptedModel::new();
        let mut rng = StdRng::seed_from_u64(1);
        let trials = bootstrap(&model, &eval_set(), 7, 50, &mut rng).unwrap();
        assert_eq!(trials.len(), 7);
    }

    #[test]
    fn test_seeded_resampling_is_reproducible() {
        let model = ScriptedModel::new().with_predictions(3, 0.2, 0.9);
        let a = bootstrap(&model, &eval_set(), 5, 30, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = bootstrap(&model, &eval_set(), 5, 30, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_half_predictor_matches_baseline() {
        // Labels alternate 0/1, so the baseline rate is exactly 0.5.
        let model = ScriptedModel::new();
        let mut rng = StdRng::seed_from_u64(3);
        for trial in bootstrap(&model, &eval_set(), 4, 40, &mut rng).unwrap() {
            assert!((trial.model.mse - trial.baseline.mse).abs() < 1e-12);
            assert!((trial.model.mse - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rejects_empty_inputs() {
        let model = ScriptedModel::new();
        let mut rng = StdRng::seed_from_u64(0);
        let empty = EvalSet::from_records(&[]);
        assert!(bootstrap(&model, &empty, 3, 10, &mut rng).is_err());
        assert!(bootstrap(&model, &eval_set(), 3, 0, &mut rng).is_err());
    }
}
