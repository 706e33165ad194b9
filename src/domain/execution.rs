// ============================================================
// Layer 3 — Execution State and Run Tags
// ============================================================
// Small pure enums that the rest of the system keys on:
//
//   ExecutionState — which device tier currently holds the model
//                    and optimizer. Mutated only by the resilient
//                    executor, read by the epoch trainer to decide
//                    whether a migrate-back is needed.
//
//   OptimizerKind  — the four supported optimizers, selected by
//                    name on the command line.
//
//   Architecture   — the embedding network variants. The tag is
//                    stored in every checkpoint so evaluation can
//                    rebuild the exact same model.
//
// Reference: Rust Book §6 (Enums and Pattern Matching)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::TrainingError;

/// Which device tier the model and optimizer currently live on.
/// The optimizer's accumulators always reside on the same tier as
/// the model weights — the executor never straddles the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    /// The fast, resource-constrained accelerator
    Fast,
    /// The slow, unconstrained fallback device
    Fallback,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Fast => write!(f, "fast"),
            ExecutionState::Fallback => write!(f, "fallback"),
        }
    }
}

/// The optimizer families the trainer can drive. Each maps onto a
/// burn optimizer config in the application layer; this enum keeps
/// the name → config decision out of the ml code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adagrad,
    RmsProp,
    Adam,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::Adagrad => write!(f, "adagrad"),
            OptimizerKind::RmsProp => write!(f, "rmsprop"),
            OptimizerKind::Adam => write!(f, "adam"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adagrad" => Ok(OptimizerKind::Adagrad),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            "adam" => Ok(OptimizerKind::Adam),
            other => Err(TrainingError::precondition(format!(
                "unknown optimizer '{other}' (expected sgd, adagrad, rmsprop or adam)",
            ))),
        }
    }
}

/// The embedding network variants shipped with the crate. Any type
/// implementing the ml layer's Embedder trait is interchangeable
/// with these; the tag only selects among the built-in family and
/// labels checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Single hidden layer — fast to train, for smoke runs
    Compact,
    /// Two hidden layers — the default
    Standard,
    /// Two wide hidden layers — highest capacity
    Wide,
}

impl Architecture {
    /// Hidden layer widths between the flattened input and the
    /// embedding projection.
    pub fn hidden_dims(&self) -> &'static [usize] {
        match self {
            Architecture::Compact => &[256],
            Architecture::Standard => &[512, 256],
            Architecture::Wide => &[1024, 512],
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Compact => write!(f, "compact"),
            Architecture::Standard => write!(f, "standard"),
            Architecture::Wide => write!(f, "wide"),
        }
    }
}

impl FromStr for Architecture {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(Architecture::Compact),
            "standard" => Ok(Architecture::Standard),
            "wide" => Ok(Architecture::Wide),
            other => Err(TrainingError::precondition(format!(
                "unknown architecture '{other}' (expected compact, standard or wide)",
            ))),
        }
    }
}
