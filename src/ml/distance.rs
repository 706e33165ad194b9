// ============================================================
// Layer 5 — Embedding Distances
// ============================================================
// Row-wise L2 distances between two embedding matrices. The
// selection policies run on the host over plain f32 slices, so a
// helper extracts the distance tensor into a Vec as well.
//
// Reference: Burn Book §3 (Tensor ops)

use burn::prelude::*;

use crate::domain::error::TrainingError;

/// Row-wise Euclidean distance between `a` and `b`, both of shape
/// [n, d]. Returns a tensor of shape [n].
pub fn pairwise_l2<B: Backend>(
    a: Tensor<B, 2>,
    b: Tensor<B, 2>,
) -> Result<Tensor<B, 1>, TrainingError> {
    let dims_a = a.dims();
    let dims_b = b.dims();
    if dims_a != dims_b {
        return Err(TrainingError::precondition(format!(
            "distance operands disagree on shape: {dims_a:?} vs {dims_b:?}",
        )));
    }

    let squared = (a - b).powf_scalar(2.0).sum_dim(1);
    // clamp keeps the gradient of sqrt finite at identical rows
    Ok(squared.clamp_min(1e-12).sqrt().flatten(0, 1))
}

/// Pull a distance tensor back to the host for the selection step.
pub fn to_host<B: Backend>(distances: Tensor<B, 1>) -> Result<Vec<f32>, TrainingError> {
    distances
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| TrainingError::precondition(format!("distance readback failed: {e:?}")))
}
