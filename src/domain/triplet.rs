// ============================================================
// Layer 3 — Triplet Domain Types
// ============================================================
// Represents batches of images in the three triplet roles:
//   - Anchor:   a reference image of some identity
//   - Positive: a different image of the SAME identity
//   - Negative: an image of a DIFFERENT identity
//
// Training pushes anchor and positive embeddings together and
// anchor and negative embeddings apart. These structs carry the
// raw pixel data only — no tensors, no devices. The data layer
// turns them into framework batches.
//
// Reference: Schroff et al. (2015) - FaceNet paper
//            Rust Book §5 (Structs)

use crate::domain::error::TrainingError;

/// A batch of raw images in NCHW order, flattened into one buffer.
///
/// `data.len()` must equal `len * channels * height * width`;
/// the constructor enforces this so every downstream consumer
/// can index without re-checking.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    /// Number of images in the batch
    pub len: usize,
    /// Colour channels per image (3 for RGB)
    pub channels: usize,
    /// Image height in pixels
    pub height: usize,
    /// Image width in pixels
    pub width: usize,
    /// Flattened pixel values, image-major
    pub data: Vec<f32>,
}

impl ImageBatch {
    /// Create a new ImageBatch, validating that the buffer length
    /// matches the declared shape.
    pub fn new(
        len: usize,
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<f32>,
    ) -> Result<Self, TrainingError> {
        let expected = len * channels * height * width;
        if data.len() != expected {
            return Err(TrainingError::precondition(format!(
                "image buffer holds {} values but shape [{len}, {channels}, {height}, {width}] \
                 requires {expected}",
                data.len(),
            )));
        }
        Ok(Self { len, channels, height, width, data })
    }

    /// Number of f32 values per single image
    pub fn image_dim(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// True when the batch contains no images
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when `other` has the same per-image shape as `self`
    pub fn same_shape(&self, other: &Self) -> bool {
        self.channels == other.channels
            && self.height == other.height
            && self.width == other.width
    }
}

/// Three index-aligned image batches forming candidate triplets.
/// Element i of each batch is one (anchor, positive, negative) tuple.
#[derive(Debug, Clone)]
pub struct TripletImageBatch {
    pub anchors: ImageBatch,
    pub positives: ImageBatch,
    pub negatives: ImageBatch,
}

impl TripletImageBatch {
    pub fn new(
        anchors: ImageBatch,
        positives: ImageBatch,
        negatives: ImageBatch,
    ) -> Result<Self, TrainingError> {
        let batch = Self { anchors, positives, negatives };
        batch.check_aligned()?;
        Ok(batch)
    }

    /// Number of candidate triplets in this batch
    pub fn len(&self) -> usize {
        self.anchors.len
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// All three roles must have identical length and image shape.
    /// A mismatch means the upstream source is broken — fatal,
    /// never retried.
    pub fn check_aligned(&self) -> Result<(), TrainingError> {
        if self.anchors.len != self.positives.len || self.anchors.len != self.negatives.len {
            return Err(TrainingError::precondition(format!(
                "triplet roles disagree on length: {} anchors, {} positives, {} negatives",
                self.anchors.len, self.positives.len, self.negatives.len,
            )));
        }
        if !self.anchors.same_shape(&self.positives) || !self.anchors.same_shape(&self.negatives) {
            return Err(TrainingError::precondition(
                "triplet roles disagree on image shape".to_string(),
            ));
        }
        Ok(())
    }
}

/// The indices of triplets retained by the selection policy.
/// An empty mask is a normal outcome (skip the batch), never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripletMask {
    indices: Vec<usize>,
}

impl TripletMask {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Indices widened for framework int tensors
    pub fn as_i32(&self) -> Vec<i32> {
        self.indices.iter().map(|&i| i as i32).collect()
    }

    /// True when every index in `self` also appears in `other`
    pub fn is_subset_of(&self, other: &TripletMask) -> bool {
        self.indices.iter().all(|i| other.indices.contains(i))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn image_batch(len: usize) -> ImageBatch {
        ImageBatch::new(len, 1, 2, 2, vec![0.5; len * 4]).unwrap()
    }

    #[test]
    fn test_image_batch_shape_mismatch_rejected() {
        let result = ImageBatch::new(2, 3, 4, 4, vec![0.0; 10]);
        assert!(result.is_err());
    }

    #[test]
    fn test_triplet_batch_alignment() {
        let batch = TripletImageBatch::new(image_batch(3), image_batch(3), image_batch(3));
        assert!(batch.is_ok());
        assert_eq!(batch.unwrap().len(), 3);
    }

    #[test]
    fn test_triplet_batch_length_mismatch_rejected() {
        let result = TripletImageBatch::new(image_batch(3), image_batch(2), image_batch(3));
        assert!(result.is_err());
    }

    #[test]
    fn test_mask_subset() {
        let small = TripletMask::new(vec![0, 2]);
        let big = TripletMask::new(vec![0, 1, 2]);
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert!(TripletMask::default().is_subset_of(&small));
    }
}
