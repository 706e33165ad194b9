// ============================================================
// Layer 5 — Training Loop
// ============================================================
// The per-epoch batch loop and the outer multi-epoch run.
//
// One batch, in order:
//   1. Skip if partial (smaller than the uniform batch size)
//   2. Concatenate the three roles and run the resilient forward
//   3. Compute anchor–positive and anchor–negative distances
//   4. Apply the selection policy on the host
//   5. Empty mask → no step, move on (expected, not an error)
//   6. Triplet margin loss over the selected subset, backward,
//      optimizer step
//   7. Return to the fast device if this batch fell back
//
// Epoch average loss divides the summed batch losses by the
// number of VALID triplets, and is exactly 0.0 when no triplet
// was selected all epoch.
//
// Reference: Schroff et al. (2015) - FaceNet paper
//            Burn Book §5 (Autodiff)

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use tracing::{debug, info, warn};

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::TripletBatcher;
use crate::data::source::TripletSource;
use crate::domain::error::TrainingError;
use crate::domain::selection::{select_triplets, SelectionPolicy};
use crate::infra::checkpoint::{CheckpointDescriptor, CheckpointManager};
use crate::infra::metrics::TrainingLogger;
use crate::ml::distance::{pairwise_l2, to_host};
use crate::ml::executor::{ResilientExecutor, TrainingContext};
use crate::ml::loss::triplet_margin_loss;
use crate::ml::model::Embedder;
use crate::ml::verification::VerificationBenchmark;

// ─── EpochStats ───────────────────────────────────────────────────────────────
/// What one epoch produced, for logging and the progress line.
#[derive(Debug, Clone)]
pub struct EpochStats {
    /// Summed batch losses over the number of valid triplets;
    /// exactly 0.0 when nothing was selected this epoch
    pub avg_loss: f64,
    /// Valid triplets accumulated across all batches
    pub valid_triplets: usize,
    /// Partial batches dropped at the end of the epoch
    pub skipped_batches: usize,
    /// Batches that ran on the fallback device
    pub fallback_batches: usize,
}

// ─── EpochTrainer ─────────────────────────────────────────────────────────────
/// Runs one epoch of triplet training with a fixed margin and
/// selection policy.
pub struct EpochTrainer {
    margin: f32,
    policy: SelectionPolicy,
}

impl EpochTrainer {
    pub fn new(margin: f32, policy: SelectionPolicy) -> Result<Self, TrainingError> {
        if !margin.is_finite() || margin < 0.0 {
            return Err(TrainingError::precondition(format!(
                "margin must be finite and non-negative, got {margin}",
            )));
        }
        Ok(Self { margin, policy })
    }

    /// One full pass over the source.
    pub fn run_epoch<B, M, O, S>(
        &self,
        executor: &mut ResilientExecutor<B>,
        ctx: &mut TrainingContext<B, M, O>,
        source: &S,
    ) -> Result<EpochStats, TrainingError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + Embedder<B>,
        O: Optimizer<M, B>,
        S: TripletSource,
    {
        let mut loss_sum = 0.0f64;
        let mut valid_triplets = 0usize;
        let mut skipped_batches = 0usize;
        let mut fallback_batches = 0usize;

        for batch_index in 0..source.num_batches() {
            let triplets = source.batch(batch_index)?;

            // A partial batch would change the loss scale relative
            // to every other batch; drop it.
            if triplets.len() < source.batch_size() {
                debug!(
                    batch_index,
                    len = triplets.len(),
                    expected = source.batch_size(),
                    "skipping partial batch"
                );
                skipped_batches += 1;
                continue;
            }
            triplets.check_aligned()?;

            let batcher = TripletBatcher::<B>::new(executor.device().clone());
            let images = batcher.concat(&triplets)?;

            let pass = executor.forward(ctx, images, batch_index)?;
            if pass.used_fallback {
                fallback_batches += 1;
            }

            let pos_dists = to_host(pairwise_l2(
                pass.anchors.clone(),
                pass.positives.clone(),
            )?)?;
            let neg_dists = to_host(pairwise_l2(
                pass.anchors.clone(),
                pass.negatives.clone(),
            )?)?;

            let mask = select_triplets(&pos_dists, &neg_dists, self.margin, self.policy)?;
            if mask.is_empty() {
                debug!(batch_index, "no valid triplets in batch");
                executor.migrate_back(ctx)?;
                continue;
            }

            let device = pass.anchors.device();
            let indices = Tensor::<B, 1, Int>::from_ints(mask.as_i32().as_slice(), &device);
            let loss = triplet_margin_loss(
                pass.anchors.select(0, indices.clone()),
                pass.positives.select(0, indices.clone()),
                pass.negatives.select(0, indices),
                self.margin,
            );

            loss_sum += loss.clone().into_scalar().elem::<f64>();
            valid_triplets += mask.len();

            let grads = GradientsParams::from_grads(loss.backward(), &ctx.model);
            ctx.step(grads);

            executor.migrate_back(ctx)?;
        }

        let avg_loss = if valid_triplets == 0 {
            0.0
        } else {
            loss_sum / valid_triplets as f64
        };

        Ok(EpochStats {
            avg_loss,
            valid_triplets,
            skipped_batches,
            fallback_batches,
        })
    }
}

// ─── Full training run ────────────────────────────────────────────────────────
/// Run epochs `start_epoch..cfg.epochs`, logging, validating on the
/// configured interval, and checkpointing after every epoch.
///
/// Validation is advisory: failures are logged and training keeps
/// going. Checkpoint failures abort — a run that cannot persist
/// its state is not worth continuing.
#[allow(clippy::too_many_arguments)]
pub fn run_training<B, M, O, S, V>(
    cfg: &TrainConfig,
    trainer: &EpochTrainer,
    source: &S,
    verifier: &V,
    executor: &mut ResilientExecutor<B>,
    ctx: &mut TrainingContext<B, M, O>,
    checkpoints: &CheckpointManager,
    logger: &TrainingLogger,
    start_epoch: usize,
    initial_threshold: Option<f64>,
) -> Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Embedder<B>,
    M::InnerModule: Embedder<B::InnerBackend>,
    O: Optimizer<M, B>,
    S: TripletSource,
    V: VerificationBenchmark<B::InnerBackend>,
{
    if ctx.model.num_params() == 0 {
        return Err(TrainingError::precondition(
            "model has no trainable parameters".to_string(),
        )
        .into());
    }
    if start_epoch >= cfg.epochs {
        info!(start_epoch, epochs = cfg.epochs, "nothing left to train");
        return Ok(());
    }

    let mut best_threshold = initial_threshold;

    for epoch in start_epoch..cfg.epochs {
        let stats = trainer.run_epoch(executor, ctx, source)?;
        logger.log_epoch(epoch + 1, &stats)?;

        println!(
            "Epoch {:>3}/{} | avg_triplet_loss={:.4} | valid_triplets={} | skipped={} | fallback={}",
            epoch + 1,
            cfg.epochs,
            stats.avg_loss,
            stats.valid_triplets,
            stats.skipped_batches,
            stats.fallback_batches,
        );

        let final_epoch = epoch + 1 == cfg.epochs;
        if (epoch + 1) % cfg.validation_interval == 0 || final_epoch {
            match verifier.evaluate(&ctx.model.valid(), executor.device()) {
                Ok(report) => {
                    info!(
                        epoch = epoch + 1,
                        accuracy = report.accuracy,
                        threshold = report.best_distance_threshold,
                        "validation complete"
                    );
                    logger.log_validation(epoch + 1, &report)?;
                    best_threshold = Some(report.best_distance_threshold);
                }
                Err(e) => warn!(epoch = epoch + 1, error = %e, "validation failed, training continues"),
            }
        }

        let descriptor = CheckpointDescriptor {
            epoch: epoch + 1,
            embedding_dimension: cfg.embedding_dim,
            batch_size_training: cfg.batch_size,
            model_architecture: cfg.architecture.clone(),
            best_distance_threshold: best_threshold,
        };
        checkpoints.save::<B, _, _>(&ctx.model, &ctx.optimizer, &descriptor)?;
        tracing::debug!(epoch = epoch + 1, "checkpoint saved");
    }

    info!("training complete");
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        optim::SgdConfig,
        record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    };

    use crate::data::source::{generate_verification_pairs, SyntheticTripletSource};
    use crate::domain::execution::Architecture;
    use crate::ml::model::{EmbeddingNet, EmbeddingNetConfig};
    use crate::ml::verification::PairVerifier;

    type TestAutodiff = Autodiff<NdArray>;
    type TestModel = EmbeddingNet<TestAutodiff>;

    fn model(device: &<TestAutodiff as Backend>::Device) -> TestModel {
        EmbeddingNetConfig::new(Architecture::Compact)
            .with_image_size(4)
            .with_channels(1)
            .with_embedding_dim(8)
            .init(device)
    }

    fn context(
        device: &<TestAutodiff as Backend>::Device,
    ) -> TrainingContext<TestAutodiff, TestModel, impl Optimizer<TestModel, TestAutodiff>> {
        TrainingContext::new(
            model(device),
            || SgdConfig::new().init::<TestAutodiff, TestModel>(),
            0.05,
        )
    }

    fn model_bytes(m: &TestModel) -> Vec<u8> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(m.clone().into_record(), ())
            .unwrap()
    }

    #[test]
    fn test_partial_final_batch_is_skipped() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut executor = ResilientExecutor::<TestAutodiff>::new(device, device, dir.path());
        let mut ctx = context(&device);

        // 10 triplets in batches of 4 → two full batches, one partial
        let source = SyntheticTripletSource::generate(4, 10, 4, 1, 4, 9).unwrap();
        let trainer = EpochTrainer::new(0.5, SelectionPolicy::Hard).unwrap();

        let stats = trainer.run_epoch(&mut executor, &mut ctx, &source).unwrap();
        assert_eq!(stats.skipped_batches, 1);
        assert!(stats.valid_triplets <= 8);
    }

    #[test]
    fn test_empty_epoch_has_zero_loss_and_unchanged_model() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut executor = ResilientExecutor::<TestAutodiff>::new(device, device, dir.path());
        let mut ctx = context(&device);
        let before = model_bytes(&ctx.model);

        // SemiHard with margin 0 can never hold: it needs both
        // neg − pos < 0 and pos < neg at once.
        let source = SyntheticTripletSource::generate(4, 8, 4, 1, 4, 9).unwrap();
        let trainer = EpochTrainer::new(0.0, SelectionPolicy::SemiHard).unwrap();

        let stats = trainer.run_epoch(&mut executor, &mut ctx, &source).unwrap();
        assert_eq!(stats.valid_triplets, 0);
        assert_eq!(stats.avg_loss, 0.0);
        assert_eq!(model_bytes(&ctx.model), before);
    }

    #[test]
    fn test_selected_triplets_update_the_model() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut executor = ResilientExecutor::<TestAutodiff>::new(device, device, dir.path());
        let mut ctx = context(&device);
        let before = model_bytes(&ctx.model);

        // A huge margin makes Hard select every triplet
        let source = SyntheticTripletSource::generate(4, 8, 4, 1, 4, 9).unwrap();
        let trainer = EpochTrainer::new(10.0, SelectionPolicy::Hard).unwrap();

        let stats = trainer.run_epoch(&mut executor, &mut ctx, &source).unwrap();
        assert_eq!(stats.valid_triplets, 8);
        assert!(stats.avg_loss > 0.0);
        assert_ne!(model_bytes(&ctx.model), before);
    }

    #[test]
    fn test_fallback_batch_still_trains() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        // Budget below one batch of images forces every batch through
        // the fallback device.
        let mut executor = ResilientExecutor::<TestAutodiff>::new(device, device, dir.path())
            .with_fast_budget(1);
        let mut ctx = context(&device);

        let source = SyntheticTripletSource::generate(4, 8, 4, 1, 4, 9).unwrap();
        let trainer = EpochTrainer::new(10.0, SelectionPolicy::Hard).unwrap();

        let stats = trainer.run_epoch(&mut executor, &mut ctx, &source).unwrap();
        assert_eq!(stats.fallback_batches, 2);
        assert!(stats.valid_triplets > 0);
        // The trainer returned to the fast device after each batch
        assert_eq!(
            executor.state(),
            crate::domain::execution::ExecutionState::Fast
        );
    }

    #[test]
    fn test_negative_margin_rejected() {
        assert!(EpochTrainer::new(-0.1, SelectionPolicy::Hard).is_err());
        assert!(EpochTrainer::new(f32::NAN, SelectionPolicy::Hard).is_err());
    }

    #[test]
    fn test_run_training_end_to_end() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let spill = dir.path().join("spill");
        std::fs::create_dir_all(&spill).unwrap();

        let cfg = TrainConfig {
            epochs: 2,
            validation_interval: 1,
            batch_size: 4,
            embedding_dim: 8,
            image_size: 4,
            channels: 1,
            architecture: "compact".to_string(),
            ..TrainConfig::default()
        };

        let source = SyntheticTripletSource::generate(4, 8, 4, 1, 4, 9).unwrap();
        let pairs = generate_verification_pairs(4, 10, 1, 4, 2).unwrap();
        let verifier = PairVerifier::new(pairs).unwrap();
        let trainer = EpochTrainer::new(0.5, SelectionPolicy::Hard).unwrap();
        let checkpoints = CheckpointManager::new(dir.path().join("checkpoints")).unwrap();
        let logger = TrainingLogger::new(dir.path().join("logs"), &cfg.architecture).unwrap();

        let mut executor = ResilientExecutor::<TestAutodiff>::new(device, device, &spill);
        let mut ctx = context(&device);

        run_training(
            &cfg,
            &trainer,
            &source,
            &verifier,
            &mut executor,
            &mut ctx,
            &checkpoints,
            &logger,
            0,
            None,
        )
        .unwrap();

        for epoch in 1..=2 {
            let path = checkpoints.checkpoint_path("compact", epoch);
            assert!(path.join("meta.json").exists(), "missing checkpoint {epoch}");
        }
        let meta =
            CheckpointManager::load_descriptor(&checkpoints.checkpoint_path("compact", 2)).unwrap();
        assert_eq!(meta.epoch, 2);
        assert!(meta.best_distance_threshold.is_some());

        let log_text = std::fs::read_to_string(logger.train_log_path()).unwrap();
        assert_eq!(log_text.lines().count(), 3);
    }

    #[test]
    fn test_resume_reaches_the_same_descriptor_as_a_straight_run() {
        let device = Default::default();
        let factory = || SgdConfig::new().init::<TestAutodiff, TestModel>();

        let cfg = TrainConfig {
            epochs: 2,
            validation_interval: 1,
            batch_size: 4,
            embedding_dim: 8,
            image_size: 4,
            channels: 1,
            architecture: "compact".to_string(),
            ..TrainConfig::default()
        };
        let source = SyntheticTripletSource::generate(4, 8, 4, 1, 4, 9).unwrap();
        let pairs = generate_verification_pairs(4, 10, 1, 4, 2).unwrap();
        let verifier = PairVerifier::new(pairs).unwrap();
        let trainer = EpochTrainer::new(0.5, SelectionPolicy::Hard).unwrap();

        let run = |cfg: &TrainConfig,
                   dir: &std::path::Path,
                   ctx: &mut TrainingContext<TestAutodiff, TestModel, _>,
                   start_epoch: usize| {
            let checkpoints = CheckpointManager::new(dir.join("checkpoints")).unwrap();
            let logger = TrainingLogger::new(dir.join("logs"), &cfg.architecture).unwrap();
            let mut executor =
                ResilientExecutor::<TestAutodiff>::new(device, device, dir.join("spill"));
            run_training(
                cfg,
                &trainer,
                &source,
                &verifier,
                &mut executor,
                ctx,
                &checkpoints,
                &logger,
                start_epoch,
                None,
            )
            .unwrap();
            checkpoints
        };

        // Straight run: both epochs in one go
        let straight_dir = tempfile::tempdir().unwrap();
        let mut straight_ctx = TrainingContext::new(model(&device), factory, 0.05);
        let straight = run(&cfg, straight_dir.path(), &mut straight_ctx, 0);
        let straight_meta =
            CheckpointManager::load_descriptor(&straight.checkpoint_path("compact", 2)).unwrap();

        // Interrupted run: stop after epoch 1, reload the saved
        // state, then finish the remaining epoch from it
        let resumed_dir = tempfile::tempdir().unwrap();
        let first_leg = TrainConfig { epochs: 1, ..cfg.clone() };
        let mut first_ctx = TrainingContext::new(model(&device), factory, 0.05);
        let first = run(&first_leg, resumed_dir.path(), &mut first_ctx, 0);

        let saved = first.checkpoint_path("compact", 1);
        let (restored_model, restored_optimizer, meta) =
            CheckpointManager::load::<TestAutodiff, _, _>(
                &saved,
                model(&device),
                factory(),
                &device,
            )
            .unwrap();
        assert_eq!(meta.epoch, 1);
        assert_eq!(meta.model_architecture, cfg.architecture);
        assert_eq!(meta.embedding_dimension, cfg.embedding_dim);

        let mut resumed_ctx =
            TrainingContext::from_parts(restored_model, restored_optimizer, factory, 0.05);
        let resumed = run(&cfg, resumed_dir.path(), &mut resumed_ctx, meta.epoch);
        let resumed_meta =
            CheckpointManager::load_descriptor(&resumed.checkpoint_path("compact", 2)).unwrap();

        // Resume lands on exactly the descriptor the straight run
        // produced for the same epoch count
        assert_eq!(resumed_meta.epoch, straight_meta.epoch);
        assert_eq!(resumed_meta.model_architecture, straight_meta.model_architecture);
        assert_eq!(
            resumed_meta.embedding_dimension,
            straight_meta.embedding_dimension
        );
        assert_eq!(
            resumed_meta.batch_size_training,
            straight_meta.batch_size_training
        );
    }
}
