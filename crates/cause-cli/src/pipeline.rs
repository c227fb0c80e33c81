//! Subcommand implementations: train, evaluate, inspect.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use rand::rngs::StdRng;
use rand::SeedableRng;

use cause::data::baseline_rate;
use cause::{
    final_evaluation, latest_checkpoint, load_interactions, load_model, run_bootstrap_passes,
    training_source, Catalog, DatasetPaths, EvalSet, Interaction, Model, Prod2VecLearner,
    Trainer, TrainingConfig,
};

use crate::config::{build_training_config, load_train_toml, CliOverrides, TrainToml};
use crate::results::{RunResult, TrainingSummary};

type TrainBackend = Autodiff<NdArray<f32>>;

/// Name of the results file under the logging directory.
const RESULTS_FILE: &str = "results.json";

/// Arguments shared by every subcommand.
#[derive(Debug)]
pub struct CommonArgs {
    /// Optional TOML config; defaults apply when absent.
    pub config: Option<PathBuf>,
    pub overrides: CliOverrides,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Debug)]
pub struct EvaluateArgs {
    pub common: CommonArgs,
    /// Checkpoint directory; the latest one under the logging dir when absent.
    pub checkpoint: Option<PathBuf>,
}

fn resolve_config(args: &CommonArgs) -> anyhow::Result<TrainingConfig> {
    let file = match &args.config {
        Some(path) => load_train_toml(path)?,
        None => TrainToml::default(),
    };
    build_training_config(&file, &args.overrides)
}

/// The three splits, checked against the catalog.
struct Splits {
    train: Vec<Interaction>,
    valid: Vec<Interaction>,
    test: Vec<Interaction>,
}

fn load_splits(config: &TrainingConfig, catalog: &Catalog) -> anyhow::Result<Splits> {
    let paths = DatasetPaths::from_config(config);
    let train = load_interactions(&paths.train, config.has_header)?;
    let valid = load_interactions(&paths.valid, config.has_header)?;
    let test = load_interactions(&paths.test, config.has_header)?;
    catalog.validate_records(&train, "train")?;
    catalog.validate_records(&valid, "validation")?;
    catalog.validate_records(&test, "test")?;
    catalog.validate_control_half(&test, "test")?;
    Ok(Splits { train, valid, test })
}

/// Final evaluation plus both bootstrap passes on the test set.
fn evaluate_model<M: Model + ?Sized>(
    model: &M,
    config: &TrainingConfig,
    catalog: &Catalog,
    test: &[Interaction],
    checkpoint: &Path,
    training: Option<TrainingSummary>,
) -> anyhow::Result<RunResult> {
    let test_losses = final_evaluation(model, test)?;

    let set = EvalSet::from_records(test);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let trials = run_bootstrap_passes(
        model,
        &set,
        catalog,
        config.bootstrap_trials,
        config.bootstrap_sample_size,
        &mut rng,
    )?;

    Ok(RunResult {
        config: config.clone(),
        checkpoint: checkpoint.display().to_string(),
        training,
        test: test_losses,
        bootstrap_original: trials.original_summary(),
        bootstrap_shifted: trials.shifted_summary(),
        trials,
    })
}

/// Train a model, then evaluate it and write `results.json`.
pub fn run_train(args: CommonArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Config and data
    let config = resolve_config(&args)?;
    let catalog = Catalog::doubled(config.num_users, config.num_products)?;
    let splits = load_splits(&config, &catalog)?;

    // 2. Model and loop
    let device = Default::default();
    let mut learner = Prod2VecLearner::<TrainBackend>::new(&config, &catalog, &device);
    let mut trainer = Trainer::new(&config, catalog, &splits.valid)?;
    let mut source = training_source(splits.train, &config)?;
    let outcome = trainer.run(&mut learner, source.as_mut())?;
    drop(source);

    let training = TrainingSummary {
        termination: outcome.termination,
        steps: outcome.steps,
        best_validation: outcome
            .reports
            .iter()
            .map(|r| (r.step, r.validation.total))
            .min_by(|a, b| a.1.total_cmp(&b.1)),
        validation_history: outcome.validation_history.values().to_vec(),
        elapsed_secs: start.elapsed().as_secs_f64(),
    };

    // 3. Evaluation
    let result = evaluate_model(
        &learner,
        &config,
        &catalog,
        &splits.test,
        &outcome.final_checkpoint,
        Some(training),
    )?;
    result.write_json(&Path::new(&config.logging_dir).join(RESULTS_FILE))?;
    result.print();
    Ok(())
}

/// Evaluate a saved checkpoint on the test set.
pub fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args.common)?;
    let catalog = Catalog::doubled(config.num_users, config.num_products)?;
    let checkpoint = match args.checkpoint {
        Some(dir) => dir,
        None => latest_checkpoint(Path::new(&config.logging_dir))?,
    };

    let paths = DatasetPaths::from_config(&config);
    let test = load_interactions(&paths.test, config.has_header)?;
    catalog.validate_records(&test, "test")?;
    catalog.validate_control_half(&test, "test")?;

    let device = Default::default();
    let learner = load_model::<TrainBackend>(&checkpoint, &config, &catalog, &device)?;
    let result = evaluate_model(&learner, &config, &catalog, &test, &checkpoint, None)?;
    result.write_json(&Path::new(&config.logging_dir).join(RESULTS_FILE))?;
    result.print();
    Ok(())
}

/// Per-split dataset statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStats {
    pub records: usize,
    pub users: usize,
    pub products: usize,
    pub baseline_rate: f32,
    /// Fraction of records whose product lies in the treatment half.
    pub treatment_share: f64,
}

impl SplitStats {
    pub fn compute(records: &[Interaction], catalog: &Catalog) -> Self {
        let users: HashSet<u32> = records.iter().map(|r| r.user).collect();
        let products: HashSet<u32> = records.iter().map(|r| r.product).collect();
        let treated = records
            .iter()
            .filter(|r| catalog.is_treatment(r.product))
            .count();
        Self {
            records: records.len(),
            users: users.len(),
            products: products.len(),
            baseline_rate: baseline_rate(records),
            treatment_share: if records.is_empty() {
                0.0
            } else {
                treated as f64 / records.len() as f64
            },
        }
    }
}

/// Print record counts, baseline rates, and treatment shares per split.
pub fn run_inspect(args: CommonArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let catalog = Catalog::doubled(config.num_users, config.num_products)?;
    let splits = load_splits(&config, &catalog)?;

    println!("--- Dataset Summary ---");
    println!(
        "Catalog: {} users, {} products ({} after doubling, threshold {})",
        catalog.num_users(),
        config.num_products,
        catalog.num_products(),
        catalog.threshold()
    );
    for (name, records) in [
        ("train", &splits.train),
        ("valid", &splits.valid),
        ("test", &splits.test),
    ] {
        let s = SplitStats::compute(records, &catalog);
        println!(
            "{name:>5}: {} records, {} users, {} products, rate {:.4}, treatment {:.1}%",
            s.records,
            s.users,
            s.products,
            s.baseline_rate,
            s.treatment_share * 100.0
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_stats() {
        let catalog = Catalog::doubled(3, 4).unwrap();
        let records = vec![
            Interaction::new(0, 1, 1.0),
            Interaction::new(1, 5, 0.0),
            Interaction::new(1, 1, 1.0),
            Interaction::new(2, 6, 0.0),
        ];
        let s = SplitStats::compute(&records, &catalog);
        assert_eq!(s.records, 4);
        assert_eq!(s.users, 3);
        assert_eq!(s.products, 3);
        assert!((s.baseline_rate - 0.5).abs() < 1e-6);
        assert!((s.treatment_share - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_split_stats_empty() {
        let catalog = Catalog::doubled(3, 4).unwrap();
        let s = SplitStats::compute(&[], &catalog);
        assert_eq!(s.records, 0);
        assert_eq!(s.treatment_share, 0.0);
    }
}
