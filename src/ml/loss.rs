// ============================================================
// Layer 5 — Triplet Margin Loss
// ============================================================
// loss = mean( relu( d(a,p)² − d(a,n)² + margin ) )
//
// Squared distances keep the gradient smooth near zero and match
// the selection policies, which compare unsquared distances but
// use the same margin. The mean runs over the SELECTED triplets
// only; the caller guarantees the inputs are non-empty.
//
// Reference: Schroff et al. (2015) - FaceNet paper

use burn::{prelude::*, tensor::activation};

/// Triplet margin loss over selected embeddings, each [m, d].
/// Returns a scalar tensor of shape [1].
pub fn triplet_margin_loss<B: Backend>(
    anchors: Tensor<B, 2>,
    positives: Tensor<B, 2>,
    negatives: Tensor<B, 2>,
    margin: f32,
) -> Tensor<B, 1> {
    let pos_sq = (anchors.clone() - positives).powf_scalar(2.0).sum_dim(1);
    let neg_sq = (anchors - negatives).powf_scalar(2.0).sum_dim(1);
    let violations = activation::relu(pos_sq - neg_sq + margin);
    violations.mean()
}
