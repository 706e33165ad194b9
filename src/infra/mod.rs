// ============================================================
// Layer 6 — Infrastructure
// ============================================================
// Filesystem concerns:
//   - checkpoint: atomic save/load of model + optimizer state
//   - metrics:    append-only tab-separated training logs

pub mod checkpoint;
pub mod metrics;
