//! Attention gate — decides approve/block/defer from the recipient's
//! inferred availability, with a deterministic local heuristic standing in
//! when no live attention provider is registered.

pub mod gate;
pub mod heuristics;

pub use gate::{AttentionGate, GateResult};
