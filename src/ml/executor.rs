// ============================================================
// Layer 5 — Resilient Executor
// ============================================================
// Runs embedding forward passes on a FAST device and falls back
// to a FALLBACK device when the fast one runs out of resources.
//
// Migration is the delicate part. The model itself moves with a
// simple fork, but optimizer state (momentum buffers, running
// averages) must survive the device change bit-for-bit or
// training quality silently degrades. The sequence is:
//
//   1. Spill the optimizer record to disk
//   2. Fork the model to the target device
//   3. Rebuild a fresh optimizer from the factory
//   4. Load the spilled record into it on the target device
//
// Any failure inside that sequence leaves the run unrecoverable
// (model and optimizer could disagree on device), so migration
// errors are fatal. Exhaustion while already on the fallback
// device is fatal too: there is nowhere left to go.
//
// Reference: Burn Book §5 (Records)
//            Rust Book §10 (Generics, trait bounds)

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use tracing::{info, warn};

use crate::domain::error::TrainingError;
use crate::domain::execution::ExecutionState;
use crate::ml::model::{EmbedOutcome, Embedder};

// ─── TrainingContext ──────────────────────────────────────────────────────────
/// Owns everything that must move together during a migration:
/// the model, the live optimizer, and the factory that can build
/// a fresh optimizer of the same configuration on demand.
pub struct TrainingContext<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub model: M,
    pub optimizer: O,
    /// Rebuilds an optimizer with the exact configuration the live
    /// one was created with; state is restored from the spill
    rebuild: Box<dyn Fn() -> O + Send>,
    pub learning_rate: f64,
    _backend: PhantomData<B>,
}

impl<B, M, O> TrainingContext<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    /// Build a context; the factory is called once for the initial
    /// optimizer and again on every migration.
    pub fn new<F>(model: M, factory: F, learning_rate: f64) -> Self
    where
        F: Fn() -> O + Send + 'static,
    {
        let optimizer = factory();
        Self::from_parts(model, optimizer, factory, learning_rate)
    }

    /// Build a context around an already-restored optimizer, as
    /// when resuming from a checkpoint. The factory must produce
    /// optimizers of the same configuration.
    pub fn from_parts<F>(model: M, optimizer: O, factory: F, learning_rate: f64) -> Self
    where
        F: Fn() -> O + Send + 'static,
    {
        Self {
            model,
            optimizer,
            rebuild: Box::new(factory),
            learning_rate,
            _backend: PhantomData,
        }
    }

    /// Apply one optimizer step with the given gradients.
    pub fn step(&mut self, grads: GradientsParams) {
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);
    }
}

// ─── ForwardPass ──────────────────────────────────────────────────────────────
/// Embeddings for one batch, split back into the three roles.
#[derive(Debug)]
pub struct ForwardPass<B: AutodiffBackend> {
    pub anchors: Tensor<B, 2>,
    pub positives: Tensor<B, 2>,
    pub negatives: Tensor<B, 2>,
    /// True when this batch ran on the fallback device
    pub used_fallback: bool,
}

// ─── ResilientExecutor ────────────────────────────────────────────────────────
/// Two-state execution engine: FAST until exhaustion, FALLBACK for
/// the batch that exhausted, then back to FAST when told to.
pub struct ResilientExecutor<B: AutodiffBackend> {
    fast: B::Device,
    fallback: B::Device,
    state: ExecutionState,
    /// Where optimizer records are spilled during migration
    spill_dir: PathBuf,
    /// Largest tensor (in elements) the fast device will attempt;
    /// None means unbounded
    fast_budget: Option<usize>,
}

impl<B: AutodiffBackend> ResilientExecutor<B> {
    pub fn new(fast: B::Device, fallback: B::Device, spill_dir: impl AsRef<Path>) -> Self {
        Self {
            fast,
            fallback,
            state: ExecutionState::Fast,
            spill_dir: spill_dir.as_ref().to_path_buf(),
            fast_budget: None,
        }
    }

    /// Cap the element count the fast device will accept. Batches
    /// above the cap are treated as exhaustion without an attempt.
    pub fn with_fast_budget(mut self, max_elements: usize) -> Self {
        self.fast_budget = Some(max_elements);
        self
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// The device batches should currently be built on.
    pub fn device(&self) -> &B::Device {
        match self.state {
            ExecutionState::Fast => &self.fast,
            ExecutionState::Fallback => &self.fallback,
        }
    }

    /// Run one concatenated forward pass, migrating to the fallback
    /// device if the fast one is exhausted. `images` must hold the
    /// three roles stacked as [3n, C, H, W].
    pub fn forward<M, O>(
        &mut self,
        ctx: &mut TrainingContext<B, M, O>,
        images: Tensor<B, 4>,
        batch_index: usize,
    ) -> Result<ForwardPass<B>, TrainingError>
    where
        M: AutodiffModule<B> + Embedder<B>,
        O: Optimizer<M, B>,
    {
        let images = images.to_device(self.device());

        match self.attempt(&ctx.model, images.clone(), batch_index) {
            Ok(embeddings) => {
                let used_fallback = self.state == ExecutionState::Fallback;
                split_roles(embeddings, used_fallback)
            }
            Err(TrainingError::ResourceExhaustion { state: ExecutionState::Fast, .. }) => {
                warn!(
                    batch_index,
                    "fast device exhausted, migrating to fallback for this batch"
                );
                self.migrate(ctx, ExecutionState::Fallback)?;
                let images = images.to_device(&self.fallback);
                match self.attempt(&ctx.model, images, batch_index) {
                    Ok(embeddings) => split_roles(embeddings, true),
                    Err(TrainingError::ResourceExhaustion { .. }) => {
                        Err(TrainingError::DoubleExhaustion { batch_index })
                    }
                    Err(other) => Err(other),
                }
            }
            Err(TrainingError::ResourceExhaustion { .. }) => {
                Err(TrainingError::DoubleExhaustion { batch_index })
            }
            Err(other) => Err(other),
        }
    }

    /// Return to the fast device after a fallback batch completed
    /// its optimizer step. No-op when already on the fast device.
    ///
    /// A spill-write failure here happens before any state has
    /// moved, so the run could stay on the fallback device and
    /// retry next batch; that transition is intentionally collapsed
    /// into the fatal migration path, so every migration failure is
    /// terminal whether state has moved or not.
    pub fn migrate_back<M, O>(
        &mut self,
        ctx: &mut TrainingContext<B, M, O>,
    ) -> Result<(), TrainingError>
    where
        M: AutodiffModule<B> + Embedder<B>,
        O: Optimizer<M, B>,
    {
        if self.state == ExecutionState::Fallback {
            info!("returning to fast device");
            self.migrate(ctx, ExecutionState::Fast)?;
        }
        Ok(())
    }

    /// One embedding attempt on the current device.
    fn attempt<M>(
        &self,
        model: &M,
        images: Tensor<B, 4>,
        batch_index: usize,
    ) -> Result<Tensor<B, 2>, TrainingError>
    where
        M: AutodiffModule<B> + Embedder<B>,
    {
        if self.state == ExecutionState::Fast {
            if let Some(budget) = self.fast_budget {
                let elements: usize = images.dims().iter().product();
                if elements > budget {
                    return Err(TrainingError::ResourceExhaustion {
                        state: self.state,
                        batch_index,
                    });
                }
            }
        }

        match model.embed(images) {
            EmbedOutcome::Embeddings(embeddings) => Ok(embeddings),
            EmbedOutcome::Exhausted => Err(TrainingError::ResourceExhaustion {
                state: self.state,
                batch_index,
            }),
        }
    }

    /// Move model and optimizer to the target device, preserving
    /// optimizer state through a disk spill.
    fn migrate<M, O>(
        &mut self,
        ctx: &mut TrainingContext<B, M, O>,
        target: ExecutionState,
    ) -> Result<(), TrainingError>
    where
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let device = match target {
            ExecutionState::Fast => self.fast.clone(),
            ExecutionState::Fallback => self.fallback.clone(),
        };
        std::fs::create_dir_all(&self.spill_dir).map_err(|e| TrainingError::MigrationFailed {
            target,
            reason: format!("spill directory unavailable: {e}"),
        })?;
        let spill = self.spill_dir.join("optimizer_spill");
        // Full precision: the reloaded state must match the spilled
        // state exactly or migration changes training dynamics
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        recorder
            .record(ctx.optimizer.to_record(), spill.clone())
            .map_err(|e| TrainingError::MigrationFailed {
                target,
                reason: format!("optimizer spill failed: {e}"),
            })?;

        ctx.model = ctx.model.clone().fork(&device);

        let record = recorder
            .load(spill, &device)
            .map_err(|e| TrainingError::MigrationFailed {
                target,
                reason: format!("optimizer reload failed: {e}"),
            })?;
        ctx.optimizer = (ctx.rebuild)().load_record(record);

        self.state = target;
        Ok(())
    }
}

/// Split [3n, d] concatenated embeddings back into the three roles.
fn split_roles<B: AutodiffBackend>(
    embeddings: Tensor<B, 2>,
    used_fallback: bool,
) -> Result<ForwardPass<B>, TrainingError> {
    let [rows, _dim] = embeddings.dims();
    if rows % 3 != 0 {
        return Err(TrainingError::precondition(format!(
            "concatenated embeddings have {rows} rows, expected a multiple of three",
        )));
    }
    let n = rows / 3;
    Ok(ForwardPass {
        anchors: embeddings.clone().narrow(0, 0, n),
        positives: embeddings.clone().narrow(0, n, n),
        negatives: embeddings.narrow(0, 2 * n, n),
        used_fallback,
    })
}
