//! TOML config loading for the training CLI.
//!
//! Deserializes `configs/train.toml`, whose `[data]`, `[model]`, `[training]`
//! and `[eval]` sections all hold optional overrides, then merges it with
//! CLI flags.

use std::path::Path;

use cause::{CfDistance, TrainingConfig};
use serde::Deserialize;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainToml {
    #[serde(default)]
    pub data: DataOverrides,
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub eval: EvalOverrides,
}

/// Dataset location and catalog sizes.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataOverrides {
    pub data_dir: Option<String>,
    pub data_set: Option<String>,
    pub adapt_stat: Option<String>,
    /// Products before the 2i doubling.
    pub num_products: Option<usize>,
    pub num_users: Option<usize>,
    pub has_header: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverrides {
    pub embedding_size: Option<usize>,
    pub l2_pen: Option<f64>,
    pub cf_pen: Option<f64>,
    pub cf_distance: Option<CfDistance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingOverrides {
    pub model_name: Option<String>,
    pub logging_dir: Option<String>,
    pub learning_rate: Option<f64>,
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub report_interval: Option<usize>,
    pub early_stopping_enabled: Option<bool>,
    pub early_stopping_patience: Option<usize>,
    pub early_stopping_min_steps: Option<usize>,
    pub seed: Option<u64>,
    pub shuffle: Option<bool>,
    pub prefetch_batches: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvalOverrides {
    pub bootstrap_trials: Option<usize>,
    pub bootstrap_sample_size: Option<usize>,
}

/// Flags that override both the defaults and the TOML file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub data_dir: Option<String>,
    pub logging_dir: Option<String>,
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub seed: Option<u64>,
    pub cf_distance: Option<CfDistance>,
    pub early_stopping: bool,
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

macro_rules! apply {
    ($config:ident, $section:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(v) = $section.$field.clone() {
                $config.$field = v;
            }
        )+
    };
}

/// Build a `TrainingConfig` from defaults, TOML overrides, and CLI flags.
///
/// Priority chain: `TrainingConfig::new()` defaults < TOML values < CLI flags.
pub fn build_training_config(
    file: &TrainToml,
    cli: &CliOverrides,
) -> anyhow::Result<TrainingConfig> {
    let mut config = TrainingConfig::new();

    apply!(config, file.data, data_dir, data_set, adapt_stat, num_products, num_users, has_header);
    apply!(config, file.model, embedding_size, l2_pen, cf_pen, cf_distance);
    apply!(
        config,
        file.training,
        model_name,
        logging_dir,
        learning_rate,
        num_epochs,
        batch_size,
        report_interval,
        early_stopping_enabled,
        early_stopping_patience,
        seed,
        shuffle,
        prefetch_batches,
    );
    if file.training.early_stopping_min_steps.is_some() {
        config.early_stopping_min_steps = file.training.early_stopping_min_steps;
    }
    apply!(config, file.eval, bootstrap_trials, bootstrap_sample_size);

    apply!(config, cli, data_dir, logging_dir, num_epochs, batch_size, learning_rate, seed, cf_distance);
    if cli.early_stopping {
        config.early_stopping_enabled = true;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_train_toml() {
        let toml_str = r#"
[data]
data_dir = "movielens"
num_products = 100
num_users = 20
has_header = false

[model]
embedding_size = 16
cf_distance = "l2"

[training]
learning_rate = 0.1
batch_size = 64
early_stopping_enabled = true
early_stopping_min_steps = 500

[eval]
bootstrap_trials = 5
"#;
        let file: TrainToml = toml::from_str(toml_str).unwrap();
        assert_eq!(file.data.data_dir.as_deref(), Some("movielens"));
        assert_eq!(file.model.cf_distance, Some(CfDistance::L2));
        assert_eq!(file.training.early_stopping_min_steps, Some(500));
        assert_eq!(file.eval.bootstrap_trials, Some(5));

        let config = build_training_config(&file, &CliOverrides::default()).unwrap();
        assert_eq!(config.data_dir, "movielens");
        assert_eq!(config.num_products, 100);
        assert!(!config.has_header);
        assert_eq!(config.embedding_size, 16);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.early_stopping_min_steps(), 500);
        assert_eq!(config.bootstrap_trials, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.report_interval, 40);
        assert_eq!(config.bootstrap_sample_size, 10_000);
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let file: TrainToml = toml::from_str("").unwrap();
        let config = build_training_config(&file, &CliOverrides::default()).unwrap();
        assert_eq!(config.num_products, 9724);
        assert_eq!(config.model_name, "cp2v");
        assert!(config.early_stopping_min_steps.is_none());
    }

    #[test]
    fn test_cli_overrides_toml() {
        let file: TrainToml = toml::from_str(
            r#"
[training]
batch_size = 64
seed = 1
"#,
        )
        .unwrap();
        let cli = CliOverrides {
            batch_size: Some(128),
            early_stopping: true,
            ..Default::default()
        };
        let config = build_training_config(&file, &cli).unwrap();
        assert_eq!(config.batch_size, 128, "CLI should win over TOML");
        assert_eq!(config.seed, 1, "TOML should win over defaults");
        assert!(config.early_stopping_enabled);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result: Result<TrainToml, _> = toml::from_str("[training]\nbatchsize = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file: TrainToml = toml::from_str("[training]\nbatch_size = 0\n").unwrap();
        let err = build_training_config(&file, &CliOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("batch_size"), "got: {err}");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_train_toml(Path::new("/nonexistent/train.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_repo_train_toml_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/train.toml");
        let file = load_train_toml(&path).unwrap();
        assert!(build_training_config(&file, &CliOverrides::default()).is_ok());
    }
}
