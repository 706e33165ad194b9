// ============================================================
// Layer 2 — Application Use Cases
// ============================================================
// Orchestration only: wires CLI-level configuration into the
// data, ml, and infra layers. No tensor math lives here.

pub mod evaluate_use_case;
pub mod train_use_case;
