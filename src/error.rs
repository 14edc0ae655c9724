//! Error types for the ledger stores and scoring functions.

use thiserror::Error;

/// Errors raised by ledger operations.
///
/// Load failures never appear here: stores fall back to defaults and log a
/// warning instead. What remains are caller mistakes and write failures.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("step mismatch: expected {expected}, candidate is at {actual}")]
    StepMismatch { expected: String, actual: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("delivery error: {0}")]
    Delivery(String),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
