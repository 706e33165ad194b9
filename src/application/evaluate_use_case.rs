// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Loads a trained checkpoint and runs the verification benchmark
// over freshly generated held-out pairs. No optimizer, no
// autodiff: inference runs on the plain backend.
//
// The checkpoint descriptor carries the architecture and the
// embedding dimension, so the model shape is rebuilt from the
// checkpoint itself; only the image geometry and pair generation
// parameters come from the CLI.

use anyhow::Result;
use burn::backend::{wgpu::WgpuDevice, Wgpu};
use serde::{Deserialize, Serialize};

use crate::data::source::generate_verification_pairs;
use crate::domain::execution::Architecture;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{EmbeddingNet, EmbeddingNetConfig};
use crate::ml::verification::{PairVerifier, VerificationBenchmark};

type InferBackend = Wgpu;

/// Configuration for a standalone evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub checkpoint_path: String,
    pub image_size:      usize,
    pub channels:        usize,
    pub num_identities:  usize,
    pub num_pairs:       usize,
    pub seed:            u64,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        let device = WgpuDevice::default();
        let path = std::path::Path::new(&cfg.checkpoint_path);

        // The descriptor tells us what shape of model to rebuild
        let descriptor = CheckpointManager::load_descriptor(path)?;
        let architecture: Architecture = descriptor.model_architecture.parse()?;

        let model = EmbeddingNetConfig::new(architecture)
            .with_image_size(cfg.image_size)
            .with_channels(cfg.channels)
            .with_embedding_dim(descriptor.embedding_dimension)
            .init::<InferBackend>(&device);
        let (model, descriptor) =
            CheckpointManager::load_model::<InferBackend, EmbeddingNet<InferBackend>>(
                path, model, &device,
            )?;
        tracing::info!(
            epoch = descriptor.epoch,
            architecture = %descriptor.model_architecture,
            "checkpoint loaded"
        );

        let pairs = generate_verification_pairs(
            cfg.num_identities,
            cfg.num_pairs,
            cfg.channels,
            cfg.image_size,
            cfg.seed,
        )?;
        let verifier = PairVerifier::new(pairs)?;
        let report = verifier.evaluate(&model, &device)?;

        println!(
            "accuracy={:.4} | precision={:.4} | recall={:.4} | roc_auc={:.4} | threshold={:.2} | tar={:.4} | far={:.4}",
            report.accuracy,
            report.precision,
            report.recall,
            report.roc_auc,
            report.best_distance_threshold,
            report.tar,
            report.far,
        );
        if let Some(saved) = descriptor.best_distance_threshold {
            println!("threshold at save time: {saved:.2}");
        }

        Ok(())
    }
}
