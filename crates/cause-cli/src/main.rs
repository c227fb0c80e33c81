mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use cause::CfDistance;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::CliOverrides;
use pipeline::{CommonArgs, EvaluateArgs};

/// cause-train: Causal Prod2Vec training and held-out evaluation.
#[derive(Parser)]
#[command(name = "cause-train", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Config file plus the flags that override it.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to a training config TOML file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the dataset directory.
    #[arg(long)]
    data_dir: Option<String>,
    /// Override the checkpoint/metrics/results directory.
    #[arg(long)]
    logging_dir: Option<String>,
    /// Override the number of training epochs.
    #[arg(long)]
    num_epochs: Option<usize>,
    /// Override the mini-batch size.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Override the SGD learning rate.
    #[arg(long)]
    learning_rate: Option<f64>,
    /// Override the RNG seed for shuffling, init, and bootstrap.
    #[arg(long)]
    seed: Option<u64>,
    /// Override the counterfactual distance (l1 or l2).
    #[arg(long)]
    cf_distance: Option<CfDistance>,
    /// Enable validation-driven early stopping.
    #[arg(long)]
    early_stopping: bool,
}

impl From<ConfigArgs> for CommonArgs {
    fn from(args: ConfigArgs) -> Self {
        CommonArgs {
            config: args.config,
            overrides: CliOverrides {
                data_dir: args.data_dir,
                logging_dir: args.logging_dir,
                num_epochs: args.num_epochs,
                batch_size: args.batch_size,
                learning_rate: args.learning_rate,
                seed: args.seed,
                cf_distance: args.cf_distance,
                early_stopping: args.early_stopping,
            },
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Train a model, evaluate it on the test set, and write results.json.
    Train {
        #[command(flatten)]
        args: ConfigArgs,
    },
    /// Evaluate a saved checkpoint on the test set.
    Evaluate {
        #[command(flatten)]
        args: ConfigArgs,
        /// Checkpoint directory. Defaults to the latest under the logging dir.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
    /// Print per-split dataset statistics.
    Inspect {
        #[command(flatten)]
        args: ConfigArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train { args } => pipeline::run_train(args.into()),
        Command::Evaluate { args, checkpoint } => pipeline::run_evaluate(EvaluateArgs {
            common: args.into(),
            checkpoint,
        }),
        Command::Inspect { args } => pipeline::run_inspect(args.into()),
    }
}
