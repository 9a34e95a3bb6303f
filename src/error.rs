//! Crate-wide error taxonomy.
//!
//! Internal helpers return `anyhow::Result` and attach context as they
//! propagate; `EngineError` is the typed boundary the HTTP layer maps to a
//! status code and JSON body. No error ever escapes the HTTP boundary
//! untyped.

use thiserror::Error;

/// Distinct failure kinds surfaced by the engine. See spec §7.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("all model backends are down")]
    AllBackendsDown,

    #[error("insufficient evidence")]
    EvidenceInsufficient,

    #[error("model reply could not be parsed: {0}")]
    ParseFailure(String),

    #[error("storage fault: {0}")]
    StorageFault(String),

    #[error("a concurrent ingest run is already in progress")]
    RaceRejected,
}

impl EngineError {
    /// HTTP status code this error maps to at the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::InputInvalid(_) => 400,
            EngineError::Unauthorized => 401,
            EngineError::UpstreamUnavailable(_) => 200,
            EngineError::AllBackendsDown => 503,
            EngineError::EvidenceInsufficient => 200,
            EngineError::ParseFailure(_) => 200,
            EngineError::StorageFault(_) => 500,
            EngineError::RaceRejected => 409,
        }
    }
}
