// ============================================================
// Layer 3 — Verification Report
// ============================================================
// The statistics returned by the external pairwise verification
// collaborator. The training loop treats validation as advisory:
// it records the best distance threshold into the checkpoint and
// logs the rest, but a failed validation never aborts training.
//
// The report is pure data so the domain and infra layers can log
// it without importing any ml code.

use serde::{Deserialize, Serialize};

/// A batch of image pairs with same-identity labels, used by the
/// verification benchmark. `a[i]` and `b[i]` form pair i;
/// `same_identity[i]` says whether they show the same person.
#[derive(Debug, Clone)]
pub struct PairBatch {
    pub a: super::triplet::ImageBatch,
    pub b: super::triplet::ImageBatch,
    pub same_identity: Vec<bool>,
}

/// Aggregate statistics from one verification pass over held-out
/// image pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Fraction of pairs classified correctly at the best threshold
    pub accuracy: f64,
    /// Precision at the best threshold
    pub precision: f64,
    /// Recall at the best threshold
    pub recall: f64,
    /// Area under the ROC curve over the threshold sweep
    pub roc_auc: f64,
    /// The distance threshold that maximised accuracy — persisted
    /// into the checkpoint for later inference
    pub best_distance_threshold: f64,
    /// True accept rate at the accuracy-maximising threshold
    pub tar: f64,
    /// False accept rate at that same threshold
    pub far: f64,
}
