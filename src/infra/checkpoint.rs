// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the full resumable training state using
// Burn's named MessagePack recorder at full precision, so a
// resumed run picks up the exact state it left behind.
//
// One checkpoint is a DIRECTORY, not a single file:
//   checkpoints/
//     model_standard_triplet_epoch_3/
//       meta.json       ← epoch, dims, architecture, threshold
//       model.mpk       ← model weights
//       optimizer.mpk   ← optimizer state (momentum, averages)
//
// Both records must be saved together: resuming with fresh
// optimizer state silently changes training dynamics for
// stateful optimizers. The directory is written under a
// temporary name and renamed into place, so a crash mid-save
// never leaves a half-written checkpoint behind.
//
// Missing vs corrupt is a hard distinction:
//   - missing  → train from scratch (warn)
//   - corrupt  → abort; never guess at ambiguous state
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::domain::error::TrainingError;

/// The JSON-serialisable part of a checkpoint. Everything needed
/// to rebuild the model shape and pick up the epoch counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDescriptor {
    /// Number of epochs fully completed when this was saved
    pub epoch: usize,
    pub embedding_dimension: usize,
    pub batch_size_training: usize,
    pub model_architecture: String,
    /// Best verification threshold seen so far, if any validation ran
    pub best_distance_threshold: Option<f64>,
}

/// Manages saving and loading of training checkpoints.
/// All checkpoints live in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TrainingError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TrainingError::storage(dir.clone(), e))?;
        Ok(Self { dir })
    }

    /// The directory a given checkpoint lives in.
    pub fn checkpoint_path(&self, architecture: &str, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("model_{architecture}_triplet_epoch_{epoch}"))
    }

    /// Save model, optimizer, and descriptor atomically.
    ///
    /// Writes into a `.tmp` sibling directory first and renames it
    /// into place once all three files exist.
    pub fn save<B, M, O>(
        &self,
        model: &M,
        optimizer: &O,
        descriptor: &CheckpointDescriptor,
    ) -> Result<PathBuf, TrainingError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let target = self.checkpoint_path(&descriptor.model_architecture, descriptor.epoch);
        let tmp = target.with_extension("tmp");
        if tmp.exists() {
            fs::remove_dir_all(&tmp).map_err(|e| TrainingError::storage(tmp.clone(), e))?;
        }
        fs::create_dir_all(&tmp).map_err(|e| TrainingError::storage(tmp.clone(), e))?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(model.clone().into_record(), tmp.join("model"))
            .map_err(|e| TrainingError::CheckpointCorrupt {
                path: tmp.clone(),
                reason: format!("model record failed to write: {e}"),
            })?;
        recorder
            .record(optimizer.to_record(), tmp.join("optimizer"))
            .map_err(|e| TrainingError::CheckpointCorrupt {
                path: tmp.clone(),
                reason: format!("optimizer record failed to write: {e}"),
            })?;

        let meta = serde_json::to_string_pretty(descriptor).map_err(|e| {
            TrainingError::CheckpointCorrupt {
                path: tmp.clone(),
                reason: format!("descriptor does not serialise: {e}"),
            }
        })?;
        fs::write(tmp.join("meta.json"), meta)
            .map_err(|e| TrainingError::storage(tmp.join("meta.json"), e))?;

        // A stale checkpoint for the same epoch gives way to the new one
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| TrainingError::storage(target.clone(), e))?;
        }
        fs::rename(&tmp, &target).map_err(|e| TrainingError::storage(target.clone(), e))?;

        tracing::debug!(path = %target.display(), "checkpoint saved");
        Ok(target)
    }

    /// Restore model and optimizer state from a checkpoint directory.
    ///
    /// The passed-in model and optimizer must already have the
    /// architecture the checkpoint was saved with; their parameters
    /// are replaced by the recorded state. The model is loaded
    /// before the optimizer so a corrupt optimizer record cannot
    /// leave a half-restored pair in use.
    pub fn load<B, M, O>(
        path: &Path,
        model: M,
        optimizer: O,
        device: &B::Device,
    ) -> Result<(M, O, CheckpointDescriptor), TrainingError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let descriptor = Self::load_descriptor(path)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        let model_record = recorder.load(path.join("model"), device).map_err(|e| {
            TrainingError::CheckpointCorrupt {
                path: path.to_path_buf(),
                reason: format!("model record unreadable: {e}"),
            }
        })?;
        let model = model.load_record(model_record);

        let optim_record = recorder.load(path.join("optimizer"), device).map_err(|e| {
            TrainingError::CheckpointCorrupt {
                path: path.to_path_buf(),
                reason: format!("optimizer record unreadable: {e}"),
            }
        })?;
        let optimizer = optimizer.load_record(optim_record);

        Ok((model, optimizer, descriptor))
    }

    /// Restore only the model, for inference. The optimizer record
    /// is left untouched on disk.
    pub fn load_model<B, M>(
        path: &Path,
        model: M,
        device: &B::Device,
    ) -> Result<(M, CheckpointDescriptor), TrainingError>
    where
        B: burn::tensor::backend::Backend,
        M: burn::module::Module<B>,
    {
        let descriptor = Self::load_descriptor(path)?;
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.join("model"), device).map_err(|e| {
            TrainingError::CheckpointCorrupt {
                path: path.to_path_buf(),
                reason: format!("model record unreadable: {e}"),
            }
        })?;
        Ok((model.load_record(record), descriptor))
    }

    /// Read only the descriptor of a checkpoint.
    pub fn load_descriptor(path: &Path) -> Result<CheckpointDescriptor, TrainingError> {
        let meta_path = path.join("meta.json");
        if !meta_path.exists() {
            return Err(TrainingError::CheckpointNotFound {
                path: path.to_path_buf(),
            });
        }
        let json = fs::read_to_string(&meta_path)
            .map_err(|e| TrainingError::storage(meta_path.clone(), e))?;
        serde_json::from_str(&json).map_err(|e| TrainingError::CheckpointCorrupt {
            path: path.to_path_buf(),
            reason: format!("descriptor does not parse: {e}"),
        })
    }

    /// Persist the run configuration next to the checkpoints so a
    /// later run can rebuild the identical setup.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<(), TrainingError> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg).map_err(|e| {
            TrainingError::CheckpointCorrupt {
                path: path.clone(),
                reason: format!("configuration does not serialise: {e}"),
            }
        })?;
        fs::write(&path, json).map_err(|e| TrainingError::storage(path, e))
    }

    /// Find the checkpoint with the highest epoch for an
    /// architecture, if any exists.
    pub fn find_latest(&self, architecture: &str) -> Option<PathBuf> {
        let prefix = format!("model_{architecture}_triplet_epoch_");
        let entries = fs::read_dir(&self.dir).ok()?;

        let mut best: Option<(usize, PathBuf)> = None;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(suffix) = name.strip_prefix(&prefix) {
                if let Ok(epoch) = suffix.parse::<usize>() {
                    if best.as_ref().map_or(true, |(e, _)| epoch > *e) {
                        best = Some((epoch, entry.path()));
                    }
                }
            }
        }
        best.map(|(_, path)| path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        optim::{
            momentum::MomentumConfig, AdaGradConfig, AdamConfig, GradientsParams, Optimizer,
            RmsPropConfig, SgdConfig,
        },
        prelude::*,
        record::{BinBytesRecorder, FullPrecisionSettings},
    };

    use crate::domain::execution::Architecture;
    use crate::ml::model::{EmbeddingNet, EmbeddingNetConfig};

    type TestAutodiff = Autodiff<NdArray>;
    type TestModel = EmbeddingNet<TestAutodiff>;

    fn model_config() -> EmbeddingNetConfig {
        EmbeddingNetConfig::new(Architecture::Compact)
            .with_image_size(4)
            .with_channels(1)
            .with_embedding_dim(8)
    }

    fn descriptor(epoch: usize) -> CheckpointDescriptor {
        CheckpointDescriptor {
            epoch,
            embedding_dimension: 8,
            batch_size_training: 4,
            model_architecture: "compact".to_string(),
            best_distance_threshold: Some(0.8),
        }
    }

    /// One gradient step so stateful optimizers accumulate buffers.
    fn warm_up<O: Optimizer<TestModel, TestAutodiff>>(
        model: TestModel,
        optimizer: &mut O,
    ) -> TestModel {
        let device = Default::default();
        let images = Tensor::<TestAutodiff, 4>::random(
            [2, 1, 4, 4],
            burn::tensor::Distribution::Default,
            &device,
        );
        let loss = model.forward(images).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        optimizer.step(0.05, model, grads)
    }

    fn model_bytes(model: &TestModel) -> Vec<u8> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(model.clone().into_record(), ())
            .unwrap()
    }

    fn round_trip<O, F>(factory: F)
    where
        O: Optimizer<TestModel, TestAutodiff>,
        F: Fn() -> O,
    {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let mut optimizer = factory();
        let model = warm_up(model_config().init(&device), &mut optimizer);
        let saved_model_bytes = model_bytes(&model);
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let saved_optim_bytes = recorder.record(optimizer.to_record(), ()).unwrap();

        let path = manager.save(&model, &optimizer, &descriptor(3)).unwrap();

        let fresh_model = model_config().init::<TestAutodiff>(&device);
        let (loaded_model, loaded_optimizer, meta) =
            CheckpointManager::load::<TestAutodiff, _, _>(&path, fresh_model, factory(), &device)
                .unwrap();

        assert_eq!(meta.epoch, 3);
        assert_eq!(meta.model_architecture, "compact");
        assert_eq!(model_bytes(&loaded_model), saved_model_bytes);
        let loaded_optim_bytes = recorder.record(loaded_optimizer.to_record(), ()).unwrap();
        assert_eq!(loaded_optim_bytes, saved_optim_bytes);
    }

    #[test]
    fn test_round_trip_sgd() {
        round_trip(|| {
            SgdConfig::new()
                .with_momentum(Some(MomentumConfig::new().with_momentum(0.9)))
                .init::<TestAutodiff, TestModel>()
        });
    }

    #[test]
    fn test_round_trip_adagrad() {
        round_trip(|| AdaGradConfig::new().init::<TestAutodiff, TestModel>());
    }

    #[test]
    fn test_round_trip_rmsprop() {
        round_trip(|| {
            RmsPropConfig::new()
                .with_alpha(0.99)
                .with_epsilon(1e-8)
                .init::<TestAutodiff, TestModel>()
        });
    }

    #[test]
    fn test_round_trip_adam() {
        round_trip(|| AdamConfig::new().with_epsilon(1e-8).init::<TestAutodiff, TestModel>());
    }

    #[test]
    fn test_missing_checkpoint_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("model_compact_triplet_epoch_9");
        match CheckpointManager::load_descriptor(&missing) {
            Err(TrainingError::CheckpointNotFound { path }) => assert_eq!(path, missing),
            other => panic!("expected CheckpointNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_descriptor_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_compact_triplet_epoch_1");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("meta.json"), "not json at all {").unwrap();

        match CheckpointManager::load_descriptor(&path) {
            Err(TrainingError::CheckpointCorrupt { .. }) => {}
            other => panic!("expected CheckpointCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_save_config_round_trips_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        manager.save_config(&TrainConfig::default()).unwrap();

        let json = fs::read_to_string(dir.path().join("train_config.json")).unwrap();
        let parsed: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.epochs, TrainConfig::default().epochs);
        assert_eq!(parsed.architecture, TrainConfig::default().architecture);
    }

    #[test]
    fn test_find_latest_picks_highest_epoch() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let model = model_config().init::<TestAutodiff>(&device);
        let optimizer = SgdConfig::new().init::<TestAutodiff, TestModel>();
        manager.save(&model, &optimizer, &descriptor(1)).unwrap();
        manager.save(&model, &optimizer, &descriptor(4)).unwrap();
        manager.save(&model, &optimizer, &descriptor(2)).unwrap();

        let latest = manager.find_latest("compact").unwrap();
        assert!(latest.ends_with("model_compact_triplet_epoch_4"));
        assert!(manager.find_latest("wide").is_none());
    }
}
