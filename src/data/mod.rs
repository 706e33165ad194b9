// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw pixel buffers and GPU-ready tensors.
//
// The pipeline flows in this order:
//
//   TripletSource     → yields an ordered sequence of
//       │               anchor/positive/negative image batches,
//       │               fixed count and size per epoch
//       ▼
//   TripletBatcher    → concatenates the three roles into ONE
//       │               tensor so the model does a single forward
//       │               pass per batch
//       ▼
//   training loop     → splits embeddings back by offset
//
// The source is a trait: the shipped SyntheticTripletSource
// generates identity-clustered images so the binary runs end to
// end, and a real dataset loader can slot in behind the same
// interface without touching the trainer.
//
// Reference: Rust Book §10 (Traits)

/// The TripletSource trait plus the synthetic generator
pub mod source;

/// Turns raw image batches into concatenated framework tensors
pub mod batcher;
