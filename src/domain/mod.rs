// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// This is the heart of the application — pure Rust structs,
// enums, and functions that define the core concepts of
// triplet-loss training.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or device code
//   - Only plain Rust structs, enums, traits, and math on slices
//
// Why keep this layer pure?
//   - The triplet selection predicate is the most delicate piece
//     of the whole system — keeping it on plain f32 slices means
//     it can be unit tested exhaustively without a GPU
//   - The ml layer stays free to change backends without touching
//     the selection semantics
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Raw image batches and the aligned anchor/positive/negative triple
pub mod triplet;

// Semi-hard / hard triplet selection over distance vectors
pub mod selection;

// Execution state plus optimizer and architecture tags
pub mod execution;

// The error taxonomy shared by every layer
pub mod error;

// Pairwise verification report returned by the validation collaborator
pub mod verification;
