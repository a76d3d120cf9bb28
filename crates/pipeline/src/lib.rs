//! Pipeline orchestrator — sequences consent, context analysis, attention
//! gating, tier filtering, and delivery handoff for one message at a time,
//! selecting deterministic fallbacks when collaborators are absent or fail.

pub mod engine;
pub mod orchestrator;

pub use engine::{DeliveryEngine, EngineBuilder};
pub use orchestrator::Orchestrator;
