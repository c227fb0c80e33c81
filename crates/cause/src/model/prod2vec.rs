use burn::module::Param;
use burn::prelude::*;
use burn::tensor::{Distribution, TensorData};

use crate::model::loss::{counterfactual_distance, l2_penalty, log_loss, mse_loss};
use crate::model::Batch;
use crate::training::config::CfDistance;

/// Configuration for the CausalProd2Vec embedding model.
///
/// ```text
/// user u, product p, treatment id t
///   logit = <E_u[u], E_p[p]> + b_u[u] + b_p[p] + alpha
///   pred  = sigmoid(logit)
///   cf    = dist(E_p[p], E_p[t])
/// ```
#[derive(Config, Debug)]
pub struct CausalProd2VecConfig {
    /// Number of users.
    pub num_users: usize,
    /// Product count after the 2i doubling.
    pub num_products: usize,
    /// Embedding dimension shared by users and products.
    #[config(default = 10)]
    pub embedding_size: usize,
}

/// Joint user/product embedding model with per-id biases.
#[derive(Module, Debug)]
pub struct CausalProd2Vec<B: Backend> {
    /// User embeddings, shape (num_users, d).
    user_embeddings: Param<Tensor<B, 2>>,
    /// Product embeddings over the doubled catalog, shape (num_products, d).
    product_embeddings: Param<Tensor<B, 2>>,
    /// Per-user bias, shape (num_users,).
    user_bias: Param<Tensor<B, 1>>,
    /// Per-product bias, shape (num_products,).
    product_bias: Param<Tensor<B, 1>>,
    /// Global offset, shape (1,).
    alpha: Param<Tensor<B, 1>>,
}

impl CausalProd2VecConfig {
    /// Initialize the model.
    ///
    /// Embeddings are drawn from Normal(0, 1/sqrt(d)); biases and the global
    /// offset start at zero.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CausalProd2Vec<B> {
        let std_dev = 1.0 / (self.embedding_size as f64).sqrt();
        let init = |rows: usize| {
            Param::from_tensor(Tensor::random(
                [rows, self.embedding_size],
                Distribution::Normal(0.0, std_dev),
                device,
            ))
        };
        CausalProd2Vec {
            user_embeddings: init(self.num_users),
            product_embeddings: init(self.num_products),
            user_bias: Param::from_tensor(Tensor::zeros([self.num_users], device)),
            product_bias: Param::from_tensor(Tensor::zeros([self.num_products], device)),
            alpha: Param::from_tensor(Tensor::zeros([1], device)),
        }
    }
}

/// Penalty weights applied on top of the log loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    pub l2_pen: f64,
    pub cf_pen: f64,
    pub cf_distance: CfDistance,
}

/// A [`Batch`] moved onto a device.
pub struct BatchTensors<B: Backend> {
    pub users: Tensor<B, 1, Int>,
    pub products: Tensor<B, 1, Int>,
    pub treatment_ids: Tensor<B, 1, Int>,
    pub labels: Tensor<B, 1>,
}

pub(crate) fn ids_to_tensor<B: Backend>(ids: &[u32], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
    Tensor::from_data(TensorData::new(data, [ids.len()]), device)
}

impl<B: Backend> BatchTensors<B> {
    pub fn new(batch: &Batch, device: &B::Device) -> Self {
        Self {
            users: ids_to_tensor(&batch.users, device),
            products: ids_to_tensor(&batch.products, device),
            treatment_ids: ids_to_tensor(&batch.treatment_ids, device),
            labels: Tensor::from_data(
                TensorData::new(batch.labels.clone(), [batch.len()]),
                device,
            ),
        }
    }
}

/// Scalar loss tensors for one forward pass.
pub struct LossTensors<B: Backend> {
    pub total: Tensor<B, 1>,
    pub mse: Tensor<B, 1>,
    pub log_loss: Tensor<B, 1>,
}

impl<B: Backend> CausalProd2Vec<B> {
    /// Raw logits for parallel user/product ids.
    ///
    /// Input shapes: `(batch,)` each. Output shape: `(batch,)`.
    pub fn forward(&self, users: Tensor<B, 1, Int>, products: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let u = self.user_embeddings.val().select(0, users.clone());
        let p = self.product_embeddings.val().select(0, products.clone());
        self.logits(u, p, users, products)
    }

    /// Predicted interaction probabilities, shape `(batch,)`.
    pub fn predict(&self, users: Tensor<B, 1, Int>, products: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        burn::tensor::activation::sigmoid(self.forward(users, products))
    }

    fn logits(
        &self,
        u: Tensor<B, 2>,
        p: Tensor<B, 2>,
        users: Tensor<B, 1, Int>,
        products: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let dot: Tensor<B, 1> = (u * p).sum_dim(1).squeeze::<1>(1);
        let ub = self.user_bias.val().select(0, users);
        let pb = self.product_bias.val().select(0, products);
        dot + ub + pb + self.alpha.val()
    }

    /// Forward pass producing every loss component.
    pub fn losses(&self, inputs: BatchTensors<B>, weights: &LossWeights) -> LossTensors<B> {
        let u = self.user_embeddings.val().select(0, inputs.users.clone());
        let p = self.product_embeddings.val().select(0, inputs.products.clone());
        let t = self.product_embeddings.val().select(0, inputs.treatment_ids);

        let logits = self.logits(u.clone(), p.clone(), inputs.users, inputs.products);
        let pred = burn::tensor::activation::sigmoid(logits);

        let log = log_loss(pred.clone(), inputs.labels.clone());
        let mse = mse_loss(pred, inputs.labels);
        let cf = counterfactual_distance(p.clone(), t, weights.cf_distance);
        let reg = l2_penalty(u, p);

        let total = log.clone() + reg.mul_scalar(weights.l2_pen) + cf.mul_scalar(weights.cf_pen);
        LossTensors {
            total,
            mse,
            log_loss: log,
        }
    }
}
