// ============================================================
// Layer 5 — Machine Learning
// ============================================================
// All Burn-dependent code lives in this layer:
//   - model:        the embedding network and the Embedder trait
//   - distance:     pairwise L2 distances between embeddings
//   - loss:         the triplet margin loss
//   - executor:     resilient fast/fallback device execution
//   - trainer:      the epoch loop and the full training run
//   - verification: face-verification benchmark over pair batches
//
// The domain layer (Layer 3) stays tensor-free; this layer turns
// its decisions into framework operations.

pub mod distance;
pub mod executor;
pub mod loss;
pub mod model;
pub mod trainer;
pub mod verification;
