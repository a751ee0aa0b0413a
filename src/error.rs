//! Error types for the meeting pipeline.
//!
//! Callers branch on variants, never on message text: validation and
//! precondition failures surface to the API without side effects, while
//! assembly and external-service failures propagate through the orchestrator
//! and end in the meeting's `failed` state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferentError {
    /// Bad input shape, size or type. Never mutates state.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Meeting is in the wrong state for the requested action.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Recording consent has not been confirmed for the meeting.
    #[error("Consent not confirmed")]
    ConsentRequired,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Share link exists but its expiry has passed.
    #[error("Share link has expired")]
    ShareExpired,

    /// Share audience does not cover the requested document.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Collaborator returned non-success or a malformed payload.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Chunk reassembly failed with no usable output.
    #[error("Audio assembly failed: {0}")]
    Assembly(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReferentError>;
