// ============================================================
// Layer 3 — Triplet Selection
// ============================================================
// Decides which candidate triplets in a batch are informative
// enough to contribute gradient signal.
//
// Two policies, both keyed on the margin:
//
//   Semi-hard: (neg_dist - pos_dist < margin) AND (pos_dist < neg_dist)
//     The negative is already farther than the positive (the
//     triplet is not hopeless) but still inside the margin (there
//     is still signal). Skips both trivially-satisfied and
//     catastrophically-hard triplets, which stabilises convergence.
//
//   Hard: (neg_dist - pos_dist < margin)
//     A superset of semi-hard — also keeps triplets where the
//     negative is closer than the positive. More signal per batch,
//     more variance.
//
// Both comparisons are STRICT: a triplet sitting exactly on the
// margin boundary is excluded. The boundary tests below pin this.
//
// An empty result is a normal outcome: the caller skips the batch
// (no backward pass, no optimizer step).
//
// Reference: Schroff et al. (2015) - FaceNet, section 3.2

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::TrainingError;
use crate::domain::triplet::TripletMask;

/// Which selection predicate to apply to a batch of distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    SemiHard,
    Hard,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::SemiHard => write!(f, "semihard"),
            SelectionPolicy::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semihard" | "semi-hard" | "semi_hard" => Ok(SelectionPolicy::SemiHard),
            "hard" => Ok(SelectionPolicy::Hard),
            other => Err(TrainingError::precondition(format!(
                "unknown selection policy '{other}' (expected 'semihard' or 'hard')",
            ))),
        }
    }
}

/// Apply the selection policy to index-aligned distance vectors.
///
/// `pos_dists[i]` is the anchor↔positive distance of triplet i,
/// `neg_dists[i]` the anchor↔negative distance. Both must have the
/// same length; a mismatch is a fatal precondition failure.
pub fn select_triplets(
    pos_dists: &[f32],
    neg_dists: &[f32],
    margin: f32,
    policy: SelectionPolicy,
) -> Result<TripletMask, TrainingError> {
    if pos_dists.len() != neg_dists.len() {
        return Err(TrainingError::precondition(format!(
            "distance vectors disagree on length: {} positive vs {} negative",
            pos_dists.len(),
            neg_dists.len(),
        )));
    }

    let indices = pos_dists
        .iter()
        .zip(neg_dists.iter())
        .enumerate()
        .filter(|(_, (&pos, &neg))| match policy {
            SelectionPolicy::SemiHard => neg - pos < margin && pos < neg,
            SelectionPolicy::Hard => neg - pos < margin,
        })
        .map(|(i, _)| i)
        .collect();

    Ok(TripletMask::new(indices))
}
