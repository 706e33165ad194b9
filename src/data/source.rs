// ============================================================
// Layer 4 — Triplet Source
// ============================================================
// Produces the ordered sequence of candidate triplet batches the
// trainer consumes during one epoch. Batch count and per-batch
// size are fixed for the epoch; the final batch may be partial
// (the trainer skips it to keep the concatenated forward-pass
// split uniform).
//
// In production you would load a labelled face dataset and mine
// triplets by identity. Here we generate synthetic identities —
// each identity is a random prototype image, and every sample of
// that identity is the prototype plus noise. Anchor and positive
// share a prototype, the negative uses a different one. This is
// enough to exercise the full training pipeline end to end and
// gives the selection policies genuinely mixed batches.
//
// Reference: rand crate documentation (StdRng, seedable)

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::error::TrainingError;
use crate::domain::triplet::{ImageBatch, TripletImageBatch};
use crate::domain::verification::PairBatch;

// ─── TripletSource ────────────────────────────────────────────────────────────
/// Any component that can supply candidate triplet batches.
///
/// Implementations:
///   - SyntheticTripletSource → identity prototypes plus noise
///   - (future) a loader over a real labelled face dataset
pub trait TripletSource {
    /// Number of batches available this epoch (fixed)
    fn num_batches(&self) -> usize;

    /// The uniform batch size; the final batch may hold fewer
    fn batch_size(&self) -> usize;

    /// Fetch batch `index` in epoch order
    fn batch(&self, index: usize) -> Result<TripletImageBatch, TrainingError>;
}

// ─── SyntheticTripletSource ───────────────────────────────────────────────────
/// Deterministic synthetic triplet generator. All batches are
/// materialised up front so repeated epochs see identical data in
/// identical order (which also makes resume tests reproducible).
pub struct SyntheticTripletSource {
    batches: Vec<TripletImageBatch>,
    batch_size: usize,
}

impl SyntheticTripletSource {
    /// Generate `num_triplets` candidate triplets over `num_identities`
    /// synthetic identities, packed into batches of `batch_size`.
    /// A trailing partial batch is kept so the trainer's skip path
    /// is exercised with realistic input.
    pub fn generate(
        num_identities: usize,
        num_triplets: usize,
        batch_size: usize,
        channels: usize,
        image_size: usize,
        seed: u64,
    ) -> Result<Self, TrainingError> {
        if num_identities < 2 {
            return Err(TrainingError::precondition(
                "need at least two identities to form a negative".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(TrainingError::precondition("batch size must be positive".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let image_dim = channels * image_size * image_size;

        // One prototype image per identity
        let prototypes: Vec<Vec<f32>> = (0..num_identities)
            .map(|_| (0..image_dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();

        // Sample of an identity = prototype + small noise
        let sample = |rng: &mut StdRng, identity: usize| -> Vec<f32> {
            prototypes[identity]
                .iter()
                .map(|&v| v + rng.gen_range(-0.1..0.1))
                .collect()
        };

        let mut batches = Vec::new();
        let mut remaining = num_triplets;
        while remaining > 0 {
            let n = remaining.min(batch_size);
            let mut anchors = Vec::with_capacity(n * image_dim);
            let mut positives = Vec::with_capacity(n * image_dim);
            let mut negatives = Vec::with_capacity(n * image_dim);

            for _ in 0..n {
                let identity = rng.gen_range(0..num_identities);
                let mut other = rng.gen_range(0..num_identities);
                while other == identity {
                    other = rng.gen_range(0..num_identities);
                }
                anchors.extend(sample(&mut rng, identity));
                positives.extend(sample(&mut rng, identity));
                negatives.extend(sample(&mut rng, other));
            }

            batches.push(TripletImageBatch::new(
                ImageBatch::new(n, channels, image_size, image_size, anchors)?,
                ImageBatch::new(n, channels, image_size, image_size, positives)?,
                ImageBatch::new(n, channels, image_size, image_size, negatives)?,
            )?);
            remaining -= n;
        }

        Ok(Self { batches, batch_size })
    }
}

impl TripletSource for SyntheticTripletSource {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn batch(&self, index: usize) -> Result<TripletImageBatch, TrainingError> {
        self.batches
            .get(index)
            .cloned()
            .ok_or_else(|| {
                TrainingError::precondition(format!(
                    "batch index {index} out of range ({} batches)",
                    self.batches.len(),
                ))
            })
    }
}

// ─── Verification pairs ───────────────────────────────────────────────────────
/// Generate held-out image pairs for the verification benchmark:
/// half same-identity, half different-identity, interleaved.
pub fn generate_verification_pairs(
    num_identities: usize,
    num_pairs: usize,
    channels: usize,
    image_size: usize,
    seed: u64,
) -> Result<PairBatch, TrainingError> {
    if num_identities < 2 {
        return Err(TrainingError::precondition(
            "need at least two identities to form a mismatched pair".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let image_dim = channels * image_size * image_size;

    let prototypes: Vec<Vec<f32>> = (0..num_identities)
        .map(|_| (0..image_dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    let sample = |rng: &mut StdRng, identity: usize| -> Vec<f32> {
        prototypes[identity]
            .iter()
            .map(|&v| v + rng.gen_range(-0.1..0.1))
            .collect()
    };

    let mut a = Vec::with_capacity(num_pairs * image_dim);
    let mut b = Vec::with_capacity(num_pairs * image_dim);
    let mut same = Vec::with_capacity(num_pairs);

    for i in 0..num_pairs {
        let identity = rng.gen_range(0..num_identities);
        if i % 2 == 0 {
            a.extend(sample(&mut rng, identity));
            b.extend(sample(&mut rng, identity));
            same.push(true);
        } else {
            let mut other = rng.gen_range(0..num_identities);
            while other == identity {
                other = rng.gen_range(0..num_identities);
            }
            a.extend(sample(&mut rng, identity));
            b.extend(sample(&mut rng, other));
            same.push(false);
        }
    }

    Ok(PairBatch {
        a: ImageBatch::new(num_pairs, channels, image_size, image_size, a)?,
        b: ImageBatch::new(num_pairs, channels, image_size, image_size, b)?,
        same_identity: same,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_layout() {
        let source = SyntheticTripletSource::generate(4, 10, 4, 1, 4, 7).unwrap();
        // 10 triplets in batches of 4 → 4, 4, 2
        assert_eq!(source.num_batches(), 3);
        assert_eq!(source.batch_size(), 4);
        assert_eq!(source.batch(0).unwrap().len(), 4);
        assert_eq!(source.batch(2).unwrap().len(), 2);
        assert!(source.batch(3).is_err());
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let a = SyntheticTripletSource::generate(3, 6, 3, 1, 4, 42).unwrap();
        let b = SyntheticTripletSource::generate(3, 6, 3, 1, 4, 42).unwrap();
        assert_eq!(a.batch(0).unwrap().anchors.data, b.batch(0).unwrap().anchors.data);
    }

    #[test]
    fn test_positive_closer_than_negative_on_average() {
        // Same-identity samples differ only by noise, so anchors
        // should sit much closer to positives than to negatives.
        let source = SyntheticTripletSource::generate(5, 8, 8, 1, 4, 11).unwrap();
        let batch = source.batch(0).unwrap();
        let dim = batch.anchors.image_dim();
        let dist = |x: &[f32], y: &[f32]| -> f32 {
            x.iter().zip(y).map(|(a, b)| (a - b).powi(2)).sum::<f32>().sqrt()
        };
        let mut pos_sum = 0.0;
        let mut neg_sum = 0.0;
        for i in 0..batch.len() {
            let anc = &batch.anchors.data[i * dim..(i + 1) * dim];
            let pos = &batch.positives.data[i * dim..(i + 1) * dim];
            let neg = &batch.negatives.data[i * dim..(i + 1) * dim];
            pos_sum += dist(anc, pos);
            neg_sum += dist(anc, neg);
        }
        assert!(pos_sum < neg_sum);
    }

    #[test]
    fn test_verification_pairs_balanced() {
        let pairs = generate_verification_pairs(4, 10, 1, 4, 3).unwrap();
        assert_eq!(pairs.same_identity.len(), 10);
        assert_eq!(pairs.same_identity.iter().filter(|&&s| s).count(), 5);
    }

    #[test]
    fn test_single_identity_rejected() {
        assert!(SyntheticTripletSource::generate(1, 4, 2, 1, 4, 0).is_err());
    }
}
