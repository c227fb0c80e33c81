//! The training loop.
//!
//! ```text
//! Init -> Running -> { StoppedEarly | EpochsExhausted } -> Finalizing -> Done
//! ```
//!
//! Each step pulls a batch, attaches treatment ids, and runs one optimizer
//! step. Every `report_interval` steps the running statistics are flushed,
//! the fixed validation batch is scored, and early stopping is evaluated.
//! Both terminal transitions save a final checkpoint; any step or
//! validation failure aborts without one.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{BatchSource, Interaction};
use crate::error::TrainError;
use crate::model::{Batch, LossComponents, Model};
use crate::training::checkpoint::Checkpointer;
use crate::training::config::TrainingConfig;
use crate::training::metrics::{IntervalReport, MetricsHistory, MetricsWriter};
use crate::training::stats::{should_stop_early, RunningStats, ValidationHistory};
use crate::treatment::Catalog;

/// Name of the metrics file under the logging directory.
pub const METRICS_FILE: &str = "metrics.csv";

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Init,
    Running,
    StoppedEarly,
    EpochsExhausted,
    Finalizing,
    Done,
}

/// Why the loop left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    StoppedEarly,
    EpochsExhausted,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub termination: Termination,
    pub steps: usize,
    pub final_checkpoint: PathBuf,
    pub validation_history: ValidationHistory,
    pub reports: Vec<IntervalReport>,
}

/// Orchestration state for one run. Holds no model parameters.
pub struct Trainer {
    catalog: Catalog,
    report_interval: usize,
    early_stopping_enabled: bool,
    early_stopping_min_steps: usize,
    early_stopping_patience: usize,
    validation: Batch,
    state: TrainerState,
    step: usize,
    stats: RunningStats,
    history: ValidationHistory,
    metrics: MetricsHistory,
    checkpointer: Checkpointer,
    writer: Option<MetricsWriter>,
}

impl Trainer {
    /// Validate the configuration and the validation set, then open the
    /// metrics sink.
    pub fn new(
        config: &TrainingConfig,
        catalog: Catalog,
        validation: &[Interaction],
    ) -> Result<Self, TrainError> {
        config.validate()?;
        if validation.is_empty() {
            return Err(TrainError::config("validation set is empty"));
        }
        catalog.validate_records(validation, "validation")?;
        let validation = Batch::from_records(validation, &catalog)?;

        let logging_dir = Path::new(&config.logging_dir);
        let writer = MetricsWriter::create(&logging_dir.join(METRICS_FILE))?;

        tracing::info!(
            num_users = catalog.num_users(),
            num_products = catalog.num_products(),
            validation_records = validation.len(),
            report_interval = config.report_interval,
            early_stopping = config.early_stopping_enabled,
            "Trainer initialized"
        );

        Ok(Self {
            catalog,
            report_interval: config.report_interval,
            early_stopping_enabled: config.early_stopping_enabled,
            early_stopping_min_steps: config.early_stopping_min_steps(),
            early_stopping_patience: config.early_stopping_patience,
            validation,
            state: TrainerState::Init,
            step: 0,
            stats: RunningStats::new(),
            history: ValidationHistory::new(),
            metrics: MetricsHistory::new(),
            checkpointer: Checkpointer::new(&config.logging_dir, &config.model_name),
            writer: Some(writer),
        })
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Steps completed so far.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn validation_history(&self) -> &ValidationHistory {
        &self.history
    }

    fn computation(&self, step: usize, reason: anyhow::Error) -> TrainError {
        TrainError::Computation {
            step,
            last_checkpoint: self.checkpointer.last_saved().map(Path::to_path_buf),
            reason,
        }
    }

    /// Drive `model` over `source` until exhaustion or early stop.
    pub fn run<M, S>(&mut self, model: &mut M, source: &mut S) -> Result<TrainOutcome, TrainError>
    where
        M: Model + ?Sized,
        S: BatchSource + ?Sized,
    {
        if self.state != TrainerState::Init {
            return Err(TrainError::config("trainer has already run"));
        }
        self.state = TrainerState::Running;
        let mut timer = Instant::now();

        let termination = loop {
            let records = match source.next_batch() {
                Ok(Some(records)) => records,
                Ok(None) => {
                    self.state = TrainerState::EpochsExhausted;
                    tracing::info!(step = self.step, "Training epochs exhausted");
                    break Termination::EpochsExhausted;
                }
                Err(reason) => {
                    return Err(TrainError::Data {
                        step: self.step + 1,
                        reason,
                    })
                }
            };

            let batch = Batch::from_records(&records, &self.catalog)?;
            let losses = model
                .train_step(&batch)
                .map_err(|e| self.computation(self.step + 1, e))?;
            if !losses.is_finite() {
                return Err(self.computation(
                    self.step + 1,
                    anyhow::anyhow!("non-finite training loss {losses:?}"),
                ));
            }
            self.stats.update(&losses);
            self.step += 1;

            if self.step % self.report_interval != 0 {
                continue;
            }

            let train = self.stats.flush(self.step, self.report_interval);
            let elapsed_secs = timer.elapsed().as_secs_f64();
            timer = Instant::now();
            log_losses("Training loss", self.step, &train, Some(elapsed_secs));

            let validation = model
                .infer(&self.validation)
                .map_err(|e| self.computation(self.step, e))?;
            if !validation.is_finite() {
                return Err(self.computation(
                    self.step,
                    anyhow::anyhow!("non-finite validation loss {validation:?}"),
                ));
            }
            log_losses("Validation loss", self.step, &validation, None);
            self.history.push(validation.total);

            let report = IntervalReport {
                step: self.step,
                train,
                validation,
                elapsed_secs,
            };
            if let Some(writer) = self.writer.as_mut() {
                writer.write(&report)?;
            }
            self.metrics.push(report);

            if should_stop_early(
                &self.history,
                self.step,
                self.early_stopping_enabled,
                self.early_stopping_min_steps,
                self.early_stopping_patience,
            ) {
                self.state = TrainerState::StoppedEarly;
                tracing::info!(
                    step = self.step,
                    validation_loss = validation.total,
                    patience = self.early_stopping_patience,
                    "Early stopping: validation loss above trailing mean"
                );
                self.checkpointer.save(model, self.step)?;
                break Termination::StoppedEarly;
            }
        };

        self.state = TrainerState::Finalizing;
        let final_checkpoint = self.checkpointer.save(model, self.step)?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        self.state = TrainerState::Done;

        if let Some((best_step, best_loss)) = self.metrics.best_validation() {
            tracing::info!(best_step, best_loss, "Best validation loss");
        }
        tracing::info!(
            steps = self.step,
            termination = ?termination,
            checkpoint = %final_checkpoint.display(),
            "Training finished"
        );

        Ok(TrainOutcome {
            termination,
            steps: self.step,
            final_checkpoint,
            validation_history: self.history.clone(),
            reports: std::mem::take(&mut self.metrics).into_reports(),
        })
    }
}

fn log_losses(label: &str, step: usize, losses: &LossComponents, elapsed_secs: Option<f64>) {
    match elapsed_secs {
        Some(elapsed) => tracing::info!(
            step,
            total = losses.total,
            mse = losses.mse,
            log_loss = losses.log_loss,
            elapsed_secs = format!("{elapsed:.2}"),
            "{label}"
        ),
        None => tracing::info!(
            step,
            total = losses.total,
            mse = losses.mse,
            log_loss = losses.log_loss,
            "{label}"
        ),
    }
}
