// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full triplet-training run in order:
//
//   Step 1: Parse architecture / optimizer / policy strings
//   Step 2: Generate triplet source + verification pairs (Layer 4)
//   Step 3: Build model on the fast device            (Layer 5)
//   Step 4: Set up checkpoints and logs               (Layer 6)
//   Step 5: Resume from checkpoint if one was given
//   Step 6: Run the epoch loop                        (Layer 5)
//
// The optimizer choice is a runtime string, but the training loop
// is generic over the optimizer type. The bridge is `launch`: the
// match arms each hand it a factory closure for one concrete
// optimizer, and monomorphisation does the rest. The factory is
// kept alive inside the TrainingContext because device migration
// needs to rebuild the optimizer mid-run.
//
// Reference: Rust Book §10 (Generics), §13 (Closures)
//            Burn Book §5 (Training)

use anyhow::Result;
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::{
        momentum::MomentumConfig, AdaGradConfig, AdamConfig, Optimizer, RmsPropConfig, SgdConfig,
    },
};
use serde::{Deserialize, Serialize};

use crate::data::source::{generate_verification_pairs, SyntheticTripletSource};
use crate::domain::error::TrainingError;
use crate::domain::execution::{Architecture, OptimizerKind};
use crate::domain::selection::SelectionPolicy;
use crate::infra::{checkpoint::CheckpointManager, metrics::TrainingLogger};
use crate::ml::executor::{ResilientExecutor, TrainingContext};
use crate::ml::model::{EmbeddingNet, EmbeddingNetConfig};
use crate::ml::trainer::{run_training, EpochTrainer};
use crate::ml::verification::PairVerifier;

type MyBackend = Autodiff<Wgpu>;
type MyModel = EmbeddingNet<MyBackend>;

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Serialisable so a run
// can be reproduced from its saved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub checkpoint_dir:      String,
    pub log_dir:             String,
    pub spill_dir:           String,
    pub epochs:              usize,
    pub batch_size:          usize,
    pub embedding_dim:       usize,
    pub image_size:          usize,
    pub channels:            usize,
    pub architecture:        String,
    pub optimizer:           String,
    pub lr:                  f64,
    pub margin:              f32,
    pub selection:           String,
    pub validation_interval: usize,
    pub num_identities:      usize,
    pub num_triplets:        usize,
    pub num_pairs:           usize,
    pub seed:                u64,
    /// Checkpoint directory to resume from, if any
    pub resume_from:         Option<String>,
    /// Element cap for the fast device; None probes nothing
    pub fast_budget:         Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir:      "checkpoints".to_string(),
            log_dir:             "logs".to_string(),
            spill_dir:           "spill".to_string(),
            epochs:              10,
            batch_size:          32,
            embedding_dim:       128,
            image_size:          64,
            channels:            3,
            architecture:        "standard".to_string(),
            optimizer:           "adam".to_string(),
            lr:                  1e-4,
            margin:              0.2,
            selection:           "semihard".to_string(),
            validation_interval: 5,
            num_identities:      32,
            num_triplets:        512,
            num_pairs:           128,
            seed:                42,
            resume_from:         None,
            fast_budget:         None,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Parse the string-typed choices ───────────────────────────
        let architecture: Architecture = cfg.architecture.parse()?;
        let optimizer_kind: OptimizerKind = cfg.optimizer.parse()?;
        let policy: SelectionPolicy = cfg.selection.parse()?;
        if cfg.validation_interval == 0 {
            return Err(
                TrainingError::precondition("validation interval must be positive").into(),
            );
        }

        // ── Step 2: Data ─────────────────────────────────────────────────────
        tracing::info!(
            identities = cfg.num_identities,
            triplets = cfg.num_triplets,
            "generating synthetic triplet data"
        );
        let source = SyntheticTripletSource::generate(
            cfg.num_identities,
            cfg.num_triplets,
            cfg.batch_size,
            cfg.channels,
            cfg.image_size,
            cfg.seed,
        )?;
        // Held-out pairs from a shifted seed so verification never
        // sees training noise
        let pairs = generate_verification_pairs(
            cfg.num_identities,
            cfg.num_pairs,
            cfg.channels,
            cfg.image_size,
            cfg.seed.wrapping_add(1),
        )?;
        let verifier = PairVerifier::new(pairs)?;

        // ── Step 3: Model on the fast device ─────────────────────────────────
        let fast = WgpuDevice::default();
        let fallback = WgpuDevice::Cpu;
        tracing::info!(?fast, ?fallback, "devices selected");

        let model: MyModel = EmbeddingNetConfig::new(architecture)
            .with_image_size(cfg.image_size)
            .with_channels(cfg.channels)
            .with_embedding_dim(cfg.embedding_dim)
            .init(&fast);

        // ── Step 4: Infrastructure ───────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
        checkpoints.save_config(cfg)?;
        let logger = TrainingLogger::new(&cfg.log_dir, &cfg.architecture)?;
        let trainer = EpochTrainer::new(cfg.margin, policy)?;

        let mut executor = ResilientExecutor::<MyBackend>::new(fast, fallback, &cfg.spill_dir);
        if let Some(budget) = cfg.fast_budget {
            executor = executor.with_fast_budget(budget);
        }

        // ── Steps 5 + 6: dispatch on the optimizer and run ───────────────────
        match optimizer_kind {
            OptimizerKind::Sgd => self.launch(
                model,
                || {
                    SgdConfig::new()
                        .with_momentum(Some(MomentumConfig::new().with_momentum(0.9)))
                        .init::<MyBackend, MyModel>()
                },
                &source,
                &verifier,
                &trainer,
                &checkpoints,
                &logger,
                executor,
            ),
            OptimizerKind::Adagrad => self.launch(
                model,
                || AdaGradConfig::new().init::<MyBackend, MyModel>(),
                &source,
                &verifier,
                &trainer,
                &checkpoints,
                &logger,
                executor,
            ),
            OptimizerKind::RmsProp => self.launch(
                model,
                || {
                    RmsPropConfig::new()
                        .with_alpha(0.99)
                        .with_epsilon(1e-8)
                        .init::<MyBackend, MyModel>()
                },
                &source,
                &verifier,
                &trainer,
                &checkpoints,
                &logger,
                executor,
            ),
            OptimizerKind::Adam => self.launch(
                model,
                || AdamConfig::new().with_epsilon(1e-8).init::<MyBackend, MyModel>(),
                &source,
                &verifier,
                &trainer,
                &checkpoints,
                &logger,
                executor,
            ),
        }
    }

    /// Resume if requested, then run the epoch loop with one
    /// concrete optimizer type.
    #[allow(clippy::too_many_arguments)]
    fn launch<O, F>(
        &self,
        model: MyModel,
        factory: F,
        source: &SyntheticTripletSource,
        verifier: &PairVerifier,
        trainer: &EpochTrainer,
        checkpoints: &CheckpointManager,
        logger: &TrainingLogger,
        mut executor: ResilientExecutor<MyBackend>,
    ) -> Result<()>
    where
        O: Optimizer<MyModel, MyBackend>,
        F: Fn() -> O + Send + 'static,
    {
        let cfg = &self.config;
        let optimizer = factory();

        // ── Step 5: Resume ───────────────────────────────────────────────────
        // Missing checkpoint → warn and train from scratch.
        // Corrupt checkpoint → abort; ambiguous state is never used.
        let (model, optimizer, start_epoch, threshold) = match &cfg.resume_from {
            Some(path) => {
                let path = std::path::Path::new(path);
                match CheckpointManager::load::<MyBackend, _, _>(
                    path,
                    model,
                    optimizer,
                    executor.device(),
                ) {
                    Ok((model, optimizer, meta)) => {
                        if meta.embedding_dimension != cfg.embedding_dim
                            || meta.model_architecture != cfg.architecture
                        {
                            return Err(TrainingError::precondition(format!(
                                "checkpoint was trained as '{}' with embedding_dim {}, \
                                 requested '{}' with {}",
                                meta.model_architecture,
                                meta.embedding_dimension,
                                cfg.architecture,
                                cfg.embedding_dim,
                            ))
                            .into());
                        }
                        tracing::info!(epoch = meta.epoch, "resuming from checkpoint");
                        (model, optimizer, meta.epoch, meta.best_distance_threshold)
                    }
                    Err(TrainingError::CheckpointNotFound { path }) => {
                        tracing::warn!(
                            path = %path.display(),
                            "no checkpoint to resume from, training from scratch"
                        );
                        (
                            EmbeddingNetConfig::new(cfg.architecture.parse()?)
                                .with_image_size(cfg.image_size)
                                .with_channels(cfg.channels)
                                .with_embedding_dim(cfg.embedding_dim)
                                .init(executor.device()),
                            factory(),
                            0,
                            None,
                        )
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => (model, optimizer, 0, None),
        };

        let mut ctx = TrainingContext::from_parts(model, optimizer, factory, cfg.lr);

        // ── Step 6: Train ────────────────────────────────────────────────────
        run_training(
            cfg,
            trainer,
            source,
            verifier,
            &mut executor,
            &mut ctx,
            checkpoints,
            logger,
            start_epoch,
            threshold,
        )
    }
}
