// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure mode in the system is one of these variants, and
// the variant decides its handling:
//
//   ResourceExhaustion — transient. The executor handles it by
//                        migrating to the fallback device; callers
//                        only ever see it in logs.
//   DoubleExhaustion   — fatal. The fallback tier also ran out and
//                        no lower tier exists. Capacity planning
//                        problem, not a logic bug.
//   Precondition       — fatal, never retried (shape mismatches,
//                        empty parameter sets, bad CLI choices).
//   CheckpointNotFound — non-fatal on resume: train from scratch
//                        with a warning.
//   CheckpointCorrupt  — fatal: ambiguous state must never be
//                        silently accepted.
//
// "No valid triplets in a batch" is deliberately NOT here — an
// empty mask is an expected, frequent outcome represented as a
// status value, not an error.
//
// Reference: Rust Book §9 (Error Handling)

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::execution::ExecutionState;

/// The error type shared by the domain, data, ml, and infra layers.
/// The application layer wraps these in anyhow for reporting.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// The active device ran out of resources during a forward pass.
    /// Recovered automatically by migrating to the fallback tier.
    #[error("resource exhaustion on {state} device at batch {batch_index}")]
    ResourceExhaustion {
        state: ExecutionState,
        batch_index: usize,
    },

    /// The fallback device also exhausted — no further tier exists.
    #[error("fallback device exhausted at batch {batch_index}: no lower execution tier exists")]
    DoubleExhaustion { batch_index: usize },

    /// An invariant the caller was required to uphold does not hold.
    #[error("precondition violated: {message}")]
    Precondition { message: String },

    /// No checkpoint exists at the given path.
    #[error("no checkpoint found at {path:?}")]
    CheckpointNotFound { path: PathBuf },

    /// A checkpoint exists but cannot be trusted.
    #[error("checkpoint at {path:?} is corrupt: {reason}")]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// Device migration started but could not complete. The model
    /// and optimizer may disagree on placement — terminal.
    #[error("device migration to {target} failed: {reason}")]
    MigrationFailed {
        target: ExecutionState,
        reason: String,
    },

    /// Filesystem trouble while writing logs or checkpoints.
    #[error("storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TrainingError {
    pub fn precondition(message: impl Into<String>) -> Self {
        TrainingError::Precondition { message: message.into() }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainingError::Storage { path: path.into(), source }
    }
}
