use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy for the delivery decision engine.
///
/// Only `Validation` ever reaches a caller of `process`; every other variant
/// is an internal signal that the orchestrator maps to a terminal `Outcome`
/// or a fallback path.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Consent denied for category: {0}")]
    ConsentDenied(String),

    #[error("Usage cap exceeded: {0}")]
    CapExceeded(String),

    #[error("Attention gate blocked: {0}")]
    AttentionBlocked(String),

    #[error("Integration unavailable: {0}")]
    IntegrationUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
