// ============================================================
// Layer 4 — Triplet Batcher
// ============================================================
// Converts raw TripletImageBatch data into framework tensors.
//
// The key trick is the CONCATENATED forward pass: instead of
// running the model three times (anchors, positives, negatives),
// we stack all three roles into one tensor of shape [3n, C, H, W]
// and run a single forward pass. The embedding output is then
// split back into three [n, D] slices by row range.
//
//   rows 0..n      → anchor images
//   rows n..2n     → positive images
//   rows 2n..3n    → negative images
//
// One big batch is both faster and what makes the fallback-device
// retry simple: a single tensor either fits or it doesn't.
//
// Reference: Burn Book §4 (Tensors)

use burn::prelude::*;

use crate::domain::error::TrainingError;
use crate::domain::triplet::TripletImageBatch;

// ─── TripletBatcher ───────────────────────────────────────────────────────────
/// Builds concatenated image tensors on a given device.
/// The device is swapped out when the executor migrates, so the
/// batcher is cheap to reconstruct.
#[derive(Clone, Debug)]
pub struct TripletBatcher<B: Backend> {
    /// The device to create tensors on
    pub device: B::Device,
}

impl<B: Backend> TripletBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack anchors, positives, and negatives into one tensor of
    /// shape [3n, channels, height, width], in that role order.
    pub fn concat(&self, triplets: &TripletImageBatch) -> Result<Tensor<B, 4>, TrainingError> {
        triplets.check_aligned()?;
        if triplets.is_empty() {
            return Err(TrainingError::precondition(
                "cannot batch an empty triplet set".to_string(),
            ));
        }

        let n = triplets.len();
        let channels = triplets.anchors.channels;
        let height = triplets.anchors.height;
        let width = triplets.anchors.width;

        // One flat buffer in role order: anchors, positives, negatives
        let mut flat = Vec::with_capacity(3 * n * triplets.anchors.image_dim());
        flat.extend_from_slice(&triplets.anchors.data);
        flat.extend_from_slice(&triplets.positives.data);
        flat.extend_from_slice(&triplets.negatives.data);

        let tensor = Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([3 * n, channels, height, width]);

        Ok(tensor)
    }
}
