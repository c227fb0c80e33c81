//! Loss terms for Causal Prod2Vec.
//!
//! All functions are generic over `B: Backend` and return scalar tensors of
//! shape `(1,)`. Probabilities are clipped with the same epsilon on both sides
//! of the log loss.

use burn::prelude::*;

use crate::training::config::CfDistance;

/// Epsilon added inside the logarithms of [`log_loss`].
pub const LOG_EPS: f64 = 1e-7;

/// Smoothing added under the square root of the L2 distance so the gradient
/// stays finite when the two embeddings coincide.
const L2_EPS: f64 = 1e-12;

/// Binary cross-entropy on probabilities.
///
/// `-mean(y * ln(p + eps) + (1 - y) * ln(1 - p + eps))`
pub fn log_loss<B: Backend>(pred: Tensor<B, 1>, labels: Tensor<B, 1>) -> Tensor<B, 1> {
    let pos = labels.clone() * pred.clone().add_scalar(LOG_EPS).log();
    let neg = labels.neg().add_scalar(1.0) * pred.neg().add_scalar(1.0 + LOG_EPS).log();
    (pos + neg).mean().neg()
}

/// Mean squared error between predicted probabilities and labels.
pub fn mse_loss<B: Backend>(pred: Tensor<B, 1>, labels: Tensor<B, 1>) -> Tensor<B, 1> {
    (pred - labels).powf_scalar(2.0).mean()
}

/// Mean per-row distance between factual and counterfactual embeddings.
///
/// # Arguments
/// - `factual`: shape `(batch, d)`: embeddings of the observed products
/// - `counterfactual`: shape `(batch, d)`: embeddings at the treatment ids
pub fn counterfactual_distance<B: Backend>(
    factual: Tensor<B, 2>,
    counterfactual: Tensor<B, 2>,
    metric: CfDistance,
) -> Tensor<B, 1> {
    let diff = factual - counterfactual;
    let per_row = match metric {
        CfDistance::L1 => diff.abs().sum_dim(1),
        CfDistance::L2 => diff.powf_scalar(2.0).sum_dim(1).add_scalar(L2_EPS).sqrt(),
    };
    per_row.mean()
}

/// Weight penalty on the embeddings touched by a batch:
/// `0.5 * (sum(u^2) + sum(p^2)) / batch`.
pub fn l2_penalty<B: Backend>(users: Tensor<B, 2>, products: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch_size, _d] = users.dims();
    let sq = users.powf_scalar(2.0).sum() + products.powf_scalar(2.0).sum();
    sq.mul_scalar(0.5 / batch_size.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn vec1(values: &[f32]) -> Tensor<TestBackend, 1> {
        Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), &Default::default())
    }

    fn mat(values: &[f32], rows: usize, cols: usize) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(values.to_vec(), [rows, cols]), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_log_loss_confident_correct() {
        let loss = scalar(log_loss(vec1(&[0.999, 0.001]), vec1(&[1.0, 0.0])));
        assert!(loss < 0.01, "Confident correct predictions should be near zero, got {loss}");
    }

    #[test]
    fn test_log_loss_uninformative() {
        let loss = scalar(log_loss(vec1(&[0.5, 0.5]), vec1(&[1.0, 0.0])));
        let expected = 2.0_f32.ln();
        assert!((loss - expected).abs() < 1e-4, "expected ln 2, got {loss}");
    }

    #[test]
    fn test_log_loss_clipped_at_extremes() {
        let loss = scalar(log_loss(vec1(&[0.0]), vec1(&[1.0])));
        assert!(loss.is_finite(), "eps must keep the loss finite, got {loss}");
        assert!(loss > 10.0, "Confidently wrong prediction should be costly, got {loss}");
    }

    #[test]
    fn test_mse_loss() {
        let loss = scalar(mse_loss(vec1(&[0.5, 1.0, 0.0]), vec1(&[1.0, 1.0, 1.0])));
        // (0.25 + 0 + 1) / 3
        assert!((loss - 1.25 / 3.0).abs() < 1e-6, "got {loss}");
    }

    #[test]
    fn test_cf_distance_zero_for_identical_rows() {
        let a = mat(&[1.0, -2.0, 0.5, 3.0], 2, 2);
        let l1 = scalar(counterfactual_distance(a.clone(), a.clone(), CfDistance::L1));
        let l2 = scalar(counterfactual_distance(a.clone(), a, CfDistance::L2));
        assert!(l1.abs() < 1e-6, "got {l1}");
        assert!(l2 < 1e-5, "got {l2}");
    }

    #[test]
    fn test_cf_distance_values() {
        let a = mat(&[0.0, 0.0, 1.0, 1.0], 2, 2);
        let b = mat(&[3.0, 4.0, 1.0, 1.0], 2, 2);
        // Row 0: L1 = 7, L2 = 5; row 1: 0
        let l1 = scalar(counterfactual_distance(a.clone(), b.clone(), CfDistance::L1));
        let l2 = scalar(counterfactual_distance(a, b, CfDistance::L2));
        assert!((l1 - 3.5).abs() < 1e-5, "L1 mean should be 3.5, got {l1}");
        assert!((l2 - 2.5).abs() < 1e-4, "L2 mean should be 2.5, got {l2}");
    }

    #[test]
    fn test_l2_penalty() {
        let u = mat(&[1.0, 1.0, 0.0, 2.0], 2, 2);
        let p = mat(&[0.0, 0.0, 1.0, 0.0], 2, 2);
        // 0.5 * (6 + 1) / 2
        let pen = scalar(l2_penalty(u, p));
        assert!((pen - 1.75).abs() < 1e-6, "got {pen}");
    }
}
