// ============================================================
// Layer 5 — Verification Benchmark
// ============================================================
// Face verification over held-out pairs: embed both sides of
// every pair, compute the L2 distance, and sweep a distance
// threshold. A pair is predicted "same identity" when its
// distance falls below the threshold.
//
// Reported metrics at the best (accuracy-maximising) threshold:
//   accuracy, precision, recall, TAR (true accept rate) and
//   FAR (false accept rate), plus ROC AUC over the whole sweep.
//
// Evaluation runs on the inference model (no autodiff), so the
// caller passes `model.valid()` during training.
//
// Reference: Huang et al. (2008) - LFW verification protocol

use burn::prelude::*;

use crate::domain::error::TrainingError;
use crate::domain::verification::{PairBatch, ValidationReport};
use crate::ml::distance::{pairwise_l2, to_host};
use crate::ml::model::{EmbedOutcome, Embedder};

/// Threshold sweep resolution: 0.0 to 4.0 in steps of 0.01, which
/// covers the full distance range of unit-norm embeddings (max 2.0)
/// with headroom.
const THRESHOLD_STEPS: usize = 400;
const THRESHOLD_MAX: f64 = 4.0;

// ─── VerificationBenchmark ────────────────────────────────────────────────────
/// Any collaborator that can score an embedder. The training loop
/// treats its result as advisory: a failure is logged, never fatal.
pub trait VerificationBenchmark<B: Backend> {
    fn evaluate<M: Embedder<B>>(
        &self,
        model: &M,
        device: &B::Device,
    ) -> Result<ValidationReport, TrainingError>;
}

// ─── PairVerifier ─────────────────────────────────────────────────────────────
/// Evaluates an embedder against a fixed set of labelled pairs.
pub struct PairVerifier {
    pairs: PairBatch,
}

impl PairVerifier {
    pub fn new(pairs: PairBatch) -> Result<Self, TrainingError> {
        if pairs.a.len != pairs.b.len || pairs.a.len != pairs.same_identity.len() {
            return Err(TrainingError::precondition(
                "verification pairs disagree on length".to_string(),
            ));
        }
        if pairs.same_identity.is_empty() {
            return Err(TrainingError::precondition(
                "verification requires at least one pair".to_string(),
            ));
        }
        Ok(Self { pairs })
    }
}

impl<B: Backend> VerificationBenchmark<B> for PairVerifier {
    /// Embed both sides of every pair and score the verifier.
    fn evaluate<M: Embedder<B>>(
        &self,
        model: &M,
        device: &B::Device,
    ) -> Result<ValidationReport, TrainingError> {
        let a = image_tensor::<B>(&self.pairs.a, device)?;
        let b = image_tensor::<B>(&self.pairs.b, device)?;

        let embed = |images: Tensor<B, 4>| -> Result<Tensor<B, 2>, TrainingError> {
            match model.embed(images) {
                EmbedOutcome::Embeddings(e) => Ok(e),
                EmbedOutcome::Exhausted => Err(TrainingError::precondition(
                    "device exhausted during verification".to_string(),
                )),
            }
        };

        let distances = to_host(pairwise_l2(embed(a)?, embed(b)?)?)?;
        Ok(score(&distances, &self.pairs.same_identity))
    }
}

/// Build a [n, C, H, W] tensor from one side of the pair batch.
fn image_tensor<B: Backend>(
    images: &crate::domain::triplet::ImageBatch,
    device: &B::Device,
) -> Result<Tensor<B, 4>, TrainingError> {
    if images.is_empty() {
        return Err(TrainingError::precondition(
            "cannot embed an empty pair side".to_string(),
        ));
    }
    Ok(
        Tensor::<B, 1>::from_floats(images.data.as_slice(), device).reshape([
            images.len,
            images.channels,
            images.height,
            images.width,
        ]),
    )
}

/// Sweep thresholds over host-side distances and assemble a report.
fn score(distances: &[f32], same_identity: &[bool]) -> ValidationReport {
    let total = distances.len() as f64;
    let positives = same_identity.iter().filter(|&&s| s).count() as f64;
    let negatives = total - positives;

    let mut best_accuracy = 0.0;
    let mut best = ValidationReport::default();
    // (FAR, TAR) points for the ROC curve, collected in sweep order
    let mut roc = Vec::with_capacity(THRESHOLD_STEPS + 1);

    for step in 0..=THRESHOLD_STEPS {
        let threshold = THRESHOLD_MAX * step as f64 / THRESHOLD_STEPS as f64;

        let mut true_accepts = 0.0;
        let mut false_accepts = 0.0;
        for (&d, &same) in distances.iter().zip(same_identity) {
            let accepted = (d as f64) < threshold;
            match (accepted, same) {
                (true, true) => true_accepts += 1.0,
                (true, false) => false_accepts += 1.0,
                _ => {}
            }
        }

        let true_rejects = negatives - false_accepts;
        let accuracy = (true_accepts + true_rejects) / total;
        let tar = if positives > 0.0 { true_accepts / positives } else { 0.0 };
        let far = if negatives > 0.0 { false_accepts / negatives } else { 0.0 };
        roc.push((far, tar));

        if accuracy > best_accuracy {
            let accepted = true_accepts + false_accepts;
            best_accuracy = accuracy;
            best = ValidationReport {
                accuracy,
                precision: if accepted > 0.0 { true_accepts / accepted } else { 0.0 },
                recall: tar,
                roc_auc: 0.0,
                best_distance_threshold: threshold,
                tar,
                far,
            };
        }
    }

    // Trapezoidal ROC AUC; FAR is non-decreasing along the sweep
    let mut auc = 0.0;
    for window in roc.windows(2) {
        let (far0, tar0) = window[0];
        let (far1, tar1) = window[1];
        auc += (far1 - far0) * (tar0 + tar1) / 2.0;
    }
    best.roc_auc = auc;
    best
}
