//! Error handling
//!
//! Engine-wide error taxonomy. Stage-local, recoverable failures (tool or
//! inference unavailability) are absorbed into the evidence model and never
//! surface here; everything in this enum is either fatal to the session or
//! fatal to the current stage attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed or insufficient input. Fatal, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A worker already holds the lease for this session id.
    #[error("analysis session {0} is already in flight")]
    DuplicateSession(Uuid),

    #[error("unknown analysis session {0}")]
    UnknownSession(Uuid),

    /// Too many evidence dimensions missing to produce a meaningful score.
    #[error("insufficient evidence: {available} of {required} required dimensions available")]
    InsufficientEvidence { available: usize, required: usize },

    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// State-store failure. Fatal to the current stage attempt; the session
    /// stays resumable from its last durable checkpoint.
    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("analysis deadline of {0}s exceeded")]
    DeadlineExceeded(u64),

    #[error("analysis cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable machine-readable kind, the only error identity that crosses
    /// the collaborator boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::DuplicateSession(_) => "duplicate_session",
            EngineError::UnknownSession(_) => "unknown_session",
            EngineError::InsufficientEvidence { .. } => "insufficient_evidence",
            EngineError::InferenceUnavailable(_) => "inference_unavailable",
            EngineError::Persistence(_) => "persistence_error",
            EngineError::DeadlineExceeded(_) => "deadline_exceeded",
            EngineError::Cancelled => "cancelled",
        }
    }
}

/// Structured error detail persisted with a failed session and returned to
/// status queries. No internal error type leaves the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl From<&EngineError> for ErrorDetail {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl ErrorDetail {
    /// Best-effort reconstruction for callers re-polling a failed session.
    pub fn to_engine_error(&self) -> EngineError {
        match self.kind.as_str() {
            "validation_error" => EngineError::Validation(self.message.clone()),
            "insufficient_evidence" => EngineError::InsufficientEvidence {
                available: 0,
                required: crate::scoring::weights::MIN_AVAILABLE_DIMENSIONS,
            },
            "cancelled" => EngineError::Cancelled,
            "deadline_exceeded" => EngineError::DeadlineExceeded(0),
            _ => EngineError::Persistence(self.message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_roundtrip() {
        let err = EngineError::Validation("payload too large".to_string());
        let detail = ErrorDetail::from(&err);
        assert_eq!(detail.kind, "validation_error");
        assert!(detail.message.contains("payload too large"));

        match detail.to_engine_error() {
            EngineError::Validation(msg) => assert!(msg.contains("payload too large")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
