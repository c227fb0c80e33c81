//! Interaction data: CSV loading, the epoch-bounded training stream, and the
//! fixed held-out sets used for validation and evaluation.
//!
//! Training batches are pulled through [`BatchSource`]; `Ok(None)` marks the
//! end of the final epoch. [`PrefetchStream`] moves any source onto a worker
//! thread without changing the order batches are delivered in.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread::JoinHandle;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;

use crate::error::TrainError;
use crate::training::config::TrainingConfig;
use crate::treatment::{shift_to_counterpart, Catalog};

/// A single (user, product, label) observation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Interaction {
    pub user: u32,
    pub product: u32,
    /// Implicit feedback: 0/1 or a real-valued rate.
    pub label: f32,
}

impl Interaction {
    pub fn new(user: u32, product: u32, label: f32) -> Self {
        Self { user, product, label }
    }
}

/// Locations of the train/test/validation files for a configured dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub train: PathBuf,
    pub test: PathBuf,
    pub valid: PathBuf,
}

impl DatasetPaths {
    /// `{data_dir}/{data_set}{split}.{adapt_stat}.csv` for each split.
    pub fn from_config(config: &TrainingConfig) -> Self {
        let split = |name: &str| {
            Path::new(&config.data_dir).join(format!(
                "{}{name}.{}.csv",
                config.data_set, config.adapt_stat
            ))
        };
        Self {
            train: split("train"),
            test: split("test"),
            valid: split("valid"),
        }
    }
}

/// Read `user_id,product_id,label` rows from a delimited file.
pub fn load_interactions(path: &Path, has_header: bool) -> anyhow::Result<Vec<Interaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| anyhow::anyhow!("Failed to open dataset {}: {e}", path.display()))?;

    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<(u32, u32, f32)>().enumerate() {
        let (user, product, label) = result
            .map_err(|e| anyhow::anyhow!("{} row {row}: {e}", path.display()))?;
        records.push(Interaction::new(user, product, label));
    }

    tracing::info!(path = %path.display(), records = records.len(), "Loaded interactions");
    Ok(records)
}

/// Mean label of a set of interactions; 0 for an empty set.
pub fn baseline_rate(records: &[Interaction]) -> f32 {
    if records.is_empty() {
        return 0.0;
    }
    let sum: f64 = records.iter().map(|r| r.label as f64).sum();
    (sum / records.len() as f64) as f32
}

/// A fixed held-out set in columnar form.
///
/// `baseline` is the set's empirical rate broadcast to the label length, so
/// resampling keeps it aligned with the labels.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSet {
    pub users: Vec<u32>,
    pub products: Vec<u32>,
    pub labels: Vec<f32>,
    pub baseline: Vec<f32>,
}

impl EvalSet {
    pub fn from_records(records: &[Interaction]) -> Self {
        let rate = baseline_rate(records);
        Self {
            users: records.iter().map(|r| r.user).collect(),
            products: records.iter().map(|r| r.product).collect(),
            labels: records.iter().map(|r| r.label).collect(),
            baseline: vec![rate; records.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The same set with every product shifted into the complementary half.
    pub fn shifted(&self, catalog: &Catalog) -> Result<Self, TrainError> {
        Ok(Self {
            products: shift_to_counterpart(&self.products, catalog)?,
            ..self.clone()
        })
    }

    /// Gather the rows at `indices` (repeats allowed).
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            users: indices.iter().map(|&i| self.users[i]).collect(),
            products: indices.iter().map(|&i| self.products[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            baseline: indices.iter().map(|&i| self.baseline[i]).collect(),
        }
    }
}

/// A source of training batches.
///
/// `Ok(None)` signals that every epoch has been consumed. Errors are fatal to
/// the training loop.
pub trait BatchSource {
    fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Interaction>>>;
}

/// Epoch-bounded batch stream over an in-memory training set.
///
/// Batches never span an epoch boundary: the last batch of each epoch holds
/// the remainder. With `shuffle`, the visiting order is redrawn at the start of
/// every epoch from a seeded RNG.
pub struct TrainStream {
    records: Vec<Interaction>,
    order: Vec<usize>,
    batch_size: usize,
    num_epochs: usize,
    epoch: usize,
    position: usize,
    shuffle: bool,
    rng: StdRng,
}

impl TrainStream {
    pub fn new(
        records: Vec<Interaction>,
        batch_size: usize,
        num_epochs: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self, TrainError> {
        if batch_size == 0 {
            return Err(TrainError::config("batch_size must be > 0"));
        }
        if records.is_empty() {
            return Err(TrainError::config("training set is empty"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..records.len()).collect();
        if shuffle {
            order.shuffle(&mut rng);
        }
        Ok(Self {
            records,
            order,
            batch_size,
            num_epochs,
            epoch: 0,
            position: 0,
            shuffle,
            rng,
        })
    }

    /// Zero-based index of the epoch currently being served.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Batches per epoch: `ceil(len / batch_size)`.
    pub fn batches_per_epoch(&self) -> usize {
        self.records.len().div_ceil(self.batch_size)
    }
}

impl BatchSource for TrainStream {
    fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Interaction>>> {
        if self.epoch >= self.num_epochs {
            return Ok(None);
        }
        if self.position >= self.order.len() {
            self.epoch += 1;
            if self.epoch >= self.num_epochs {
                tracing::debug!(epochs = self.num_epochs, "Training stream exhausted");
                return Ok(None);
            }
            self.position = 0;
            if self.shuffle {
                self.order.shuffle(&mut self.rng);
            }
        }

        let end = (self.position + self.batch_size).min(self.order.len());
        let batch = self.order[self.position..end]
            .iter()
            .map(|&i| self.records[i])
            .collect();
        self.position = end;
        Ok(Some(batch))
    }
}

/// Open the training stream for `records`, on a loader thread when
/// `prefetch_batches > 0`.
pub fn training_source(
    records: Vec<Interaction>,
    config: &TrainingConfig,
) -> Result<Box<dyn BatchSource>, TrainError> {
    let stream = TrainStream::new(
        records,
        config.batch_size,
        config.num_epochs,
        config.shuffle,
        config.seed,
    )?;
    tracing::info!(
        batches_per_epoch = stream.batches_per_epoch(),
        epochs = config.num_epochs,
        prefetch = config.prefetch_batches,
        "Opened training stream"
    );
    if config.prefetch_batches == 0 {
        Ok(Box::new(stream))
    } else {
        Ok(Box::new(PrefetchStream::spawn(stream, config.prefetch_batches)))
    }
}

enum Prefetched {
    Batch(Vec<Interaction>),
    Err(String),
}

/// Runs a [`BatchSource`] on a worker thread, buffering up to `depth` batches.
///
/// Delivery order is exactly the wrapped source's order. The stream ends when
/// the worker's source is exhausted. A worker error or panic is returned once
/// and then the stream reports exhaustion.
pub struct PrefetchStream {
    rx: Option<Receiver<Prefetched>>,
    worker: Option<JoinHandle<()>>,
}

impl PrefetchStream {
    pub fn spawn<S>(mut source: S, depth: usize) -> Self
    where
        S: BatchSource + Send + 'static,
    {
        let (tx, rx) = sync_channel::<Prefetched>(depth.max(1));
        let worker = std::thread::spawn(move || loop {
            let msg = match source.next_batch() {
                Ok(Some(batch)) => Prefetched::Batch(batch),
                Ok(None) => break,
                Err(e) => Prefetched::Err(format!("{e:#}")),
            };
            let is_err = matches!(msg, Prefetched::Err(_));
            if tx.send(msg).is_err() || is_err {
                break; // receiver dropped, or error delivered
            }
        });
        Self {
            rx: Some(rx),
            worker: Some(worker),
        }
    }

    fn finish(&mut self) {
        // Dropping the receiver unblocks a worker waiting on a full channel.
        self.rx.take();
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }
}

impl BatchSource for PrefetchStream {
    fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Interaction>>> {
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(Prefetched::Batch(batch)) => Ok(Some(batch)),
            Ok(Prefetched::Err(e)) => {
                self.finish();
                Err(anyhow::anyhow!("Prefetch worker failed: {e}"))
            }
            Err(_) => {
                // Disconnected: either clean exhaustion or the worker died.
                self.rx.take();
                match self.worker.take().map(JoinHandle::join) {
                    Some(Err(payload)) => Err(anyhow::anyhow!(
                        "Prefetch worker panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                    _ => Ok(None),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

impl Drop for PrefetchStream {
    fn drop(&mut self) {
        self.finish();
    }
}
