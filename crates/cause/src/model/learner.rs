//! burn-backed [`Model`]: a [`CausalProd2Vec`] module paired with an SGD
//! optimizer.

use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;

use crate::model::prod2vec::{
    ids_to_tensor, BatchTensors, CausalProd2Vec, CausalProd2VecConfig, LossTensors, LossWeights,
};
use crate::model::{Batch, LossComponents, Model};
use crate::training::config::TrainingConfig;
use crate::treatment::Catalog;

/// Owns the trainable module and its optimizer state.
pub struct Prod2VecLearner<B: AutodiffBackend> {
    model: CausalProd2Vec<B>,
    optimizer: OptimizerAdaptor<Sgd<B::InnerBackend>, CausalProd2Vec<B>, B>,
    weights: LossWeights,
    learning_rate: f64,
    device: B::Device,
}

fn model_config(config: &TrainingConfig, catalog: &Catalog) -> CausalProd2VecConfig {
    CausalProd2VecConfig::new(catalog.num_users() as usize, catalog.num_products() as usize)
        .with_embedding_size(config.embedding_size)
}

fn scalars<B: Backend>(out: LossTensors<B>) -> LossComponents {
    LossComponents::new(
        out.total.into_scalar().elem(),
        out.mse.into_scalar().elem(),
        out.log_loss.into_scalar().elem(),
    )
}

impl<B: AutodiffBackend> Prod2VecLearner<B> {
    /// Seed the backend and initialize a fresh model over the doubled catalog.
    pub fn new(config: &TrainingConfig, catalog: &Catalog, device: &B::Device) -> Self {
        B::seed(config.seed);
        let model = model_config(config, catalog).init::<B>(device);
        Self::with_model(model, config, device)
    }

    /// Wrap an existing module with a fresh optimizer.
    pub fn with_model(model: CausalProd2Vec<B>, config: &TrainingConfig, device: &B::Device) -> Self {
        tracing::info!(
            num_params = model.num_params(),
            embedding_size = config.embedding_size,
            cf_distance = %config.cf_distance,
            "Initialized CausalProd2Vec"
        );
        Self {
            model,
            optimizer: SgdConfig::new().init(),
            weights: LossWeights {
                l2_pen: config.l2_pen,
                cf_pen: config.cf_pen,
                cf_distance: config.cf_distance,
            },
            learning_rate: config.learning_rate,
            device: device.clone(),
        }
    }

    /// The underlying module.
    pub fn model(&self) -> &CausalProd2Vec<B> {
        &self.model
    }
}

impl<B: AutodiffBackend> Model for Prod2VecLearner<B> {
    fn train_step(&mut self, batch: &Batch) -> anyhow::Result<LossComponents> {
        if batch.is_empty() {
            anyhow::bail!("empty batch");
        }
        let out = self
            .model
            .losses(BatchTensors::new(batch, &self.device), &self.weights);

        let mse: f64 = out.mse.into_scalar().elem();
        let log_loss: f64 = out.log_loss.into_scalar().elem();
        let total: f64 = out.total.clone().into_scalar().elem();
        let losses = LossComponents::new(total, mse, log_loss);
        if !losses.is_finite() {
            anyhow::bail!("non-finite loss: total={total} mse={mse} log_loss={log_loss}");
        }

        let grads = GradientsParams::from_grads(out.total.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);
        Ok(losses)
    }

    fn infer(&self, batch: &Batch) -> anyhow::Result<LossComponents> {
        if batch.is_empty() {
            anyhow::bail!("empty batch");
        }
        let model = self.model.valid();
        let losses = scalars(model.losses(BatchTensors::new(batch, &self.device), &self.weights));
        if !losses.is_finite() {
            anyhow::bail!(
                "non-finite inference loss: total={} mse={} log_loss={}",
                losses.total,
                losses.mse,
                losses.log_loss
            );
        }
        Ok(losses)
    }

    fn predict(&self, users: &[u32], products: &[u32]) -> anyhow::Result<Vec<f64>> {
        if users.len() != products.len() {
            anyhow::bail!(
                "users ({}) and products ({}) differ in length",
                users.len(),
                products.len()
            );
        }
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.valid();
        let probs = model.predict(
            ids_to_tensor(users, &self.device),
            ids_to_tensor(products, &self.device),
        );
        probs
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .map_err(|e| anyhow::anyhow!("Failed to read predictions: {e:?}"))
    }

    fn num_params(&self) -> usize {
        self.model.num_params()
    }

    fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {e}", dir.display()))?;
        recorder
            .record(self.optimizer.to_record(), dir.join("optimizer"))
            .map_err(|e| anyhow::anyhow!("Failed to save optimizer to {}: {e}", dir.display()))?;
        Ok(())
    }
}

/// Restore a learner from a checkpoint directory written by [`Model::save`].
///
/// Creates a fresh model from the config, then loads the saved weights on
/// top. The optimizer starts fresh.
pub fn load_model<B: AutodiffBackend>(
    dir: &Path,
    config: &TrainingConfig,
    catalog: &Catalog,
    device: &B::Device,
) -> anyhow::Result<Prod2VecLearner<B>> {
    let model = model_config(config, catalog)
        .init::<B>(device)
        .load_file(
            dir.join("model"),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", dir.display()))?;
    tracing::info!(path = %dir.display(), "Loaded model checkpoint");
    Ok(Prod2VecLearner::with_model(model, config, device))
}
