// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Architecture, optimizer, and selection policy stay plain
// strings here; the application layer parses them into domain
// enums so bad values fail with a domain error, not a clap one.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::evaluate_use_case::EvaluateConfig;
use crate::application::train_use_case::TrainConfig;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a face embedding model with triplet loss
    Train(TrainArgs),

    /// Run the verification benchmark against a checkpoint
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory to save training checkpoints
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Directory for the tab-separated training logs
    #[arg(long, default_value = "logs")]
    pub log_dir: String,

    /// Directory for optimizer spills during device migration
    #[arg(long, default_value = "spill")]
    pub spill_dir: String,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Candidate triplets processed together in one forward pass
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Width of the embedding vectors the model produces
    #[arg(long, default_value_t = 128)]
    pub embedding_dim: usize,

    /// Input image side length in pixels (images are square)
    #[arg(long, default_value_t = 64)]
    pub image_size: usize,

    /// Colour channels per image (3 for RGB)
    #[arg(long, default_value_t = 3)]
    pub channels: usize,

    /// Model architecture: compact, standard, or wide
    #[arg(long, default_value = "standard")]
    pub architecture: String,

    /// Optimizer: sgd, adagrad, rmsprop, or adam
    #[arg(long, default_value = "adam")]
    pub optimizer: String,

    /// How fast the model learns — too high causes instability,
    /// too low causes slow convergence
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Triplet margin, shared by the loss and the selection policies
    #[arg(long, default_value_t = 0.2)]
    pub margin: f32,

    /// Triplet selection policy: semihard or hard
    #[arg(long, default_value = "semihard")]
    pub selection: String,

    /// Run verification every N epochs (always on the final epoch)
    #[arg(long, default_value_t = 5)]
    pub validation_interval: usize,

    /// Number of synthetic identities in the generated dataset
    #[arg(long, default_value_t = 32)]
    pub num_identities: usize,

    /// Total candidate triplets generated per epoch
    #[arg(long, default_value_t = 512)]
    pub num_triplets: usize,

    /// Held-out verification pairs per validation run
    #[arg(long, default_value_t = 128)]
    pub num_pairs: usize,

    /// Seed for the synthetic data generator
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Checkpoint directory to resume from. If it does not exist,
    /// training starts from scratch with a warning.
    #[arg(long)]
    pub resume_from: Option<String>,

    /// Largest tensor (in elements) the fast device will attempt;
    /// oversized batches run on the fallback device instead
    #[arg(long)]
    pub fast_budget: Option<usize>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            checkpoint_dir:      a.checkpoint_dir,
            log_dir:             a.log_dir,
            spill_dir:           a.spill_dir,
            epochs:              a.epochs,
            batch_size:          a.batch_size,
            embedding_dim:       a.embedding_dim,
            image_size:          a.image_size,
            channels:            a.channels,
            architecture:        a.architecture,
            optimizer:           a.optimizer,
            lr:                  a.lr,
            margin:              a.margin,
            selection:           a.selection,
            validation_interval: a.validation_interval,
            num_identities:      a.num_identities,
            num_triplets:        a.num_triplets,
            num_pairs:           a.num_pairs,
            seed:                a.seed,
            resume_from:         a.resume_from,
            fast_budget:         a.fast_budget,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Path to the checkpoint directory to evaluate
    #[arg(long)]
    pub checkpoint_path: String,

    /// Input image side length (must match the trained model)
    #[arg(long, default_value_t = 64)]
    pub image_size: usize,

    /// Colour channels per image (must match the trained model)
    #[arg(long, default_value_t = 3)]
    pub channels: usize,

    /// Number of synthetic identities for pair generation
    #[arg(long, default_value_t = 32)]
    pub num_identities: usize,

    /// Number of verification pairs to score
    #[arg(long, default_value_t = 256)]
    pub num_pairs: usize,

    /// Seed for pair generation
    #[arg(long, default_value_t = 7)]
    pub seed: u64,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint_path: a.checkpoint_path,
            image_size:      a.image_size,
            channels:        a.channels,
            num_identities:  a.num_identities,
            num_pairs:       a.num_pairs,
            seed:            a.seed,
        }
    }
}
