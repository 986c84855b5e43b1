//! Custom error types for folio

use crate::pipeline::PipelineStage;
use thiserror::Error;

/// Main error type for folio operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A call to an external collaborator (extractor, embedding backend,
    /// datastore) failed during a specific pipeline stage. Recorded on the
    /// job and eligible for retry.
    #[error("{stage} failed: {message}")]
    Provider {
        stage: PipelineStage,
        message: String,
    },

    /// A chunk write was attempted against a document that does not exist.
    /// Unreachable by construction; if it surfaces it is a bug, not a
    /// retryable condition.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// The admission controller is saturated. Callers should back off and
    /// retry; this is not a job failure.
    #[error("Overloaded: no capacity for {0}")]
    Overloaded(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Retry rejected: {0}")]
    RetryRejected(String),

    #[error("Illegal status transition: {0}")]
    IllegalTransition(String),

    #[error("Not initialized: run 'folio init' first")]
    NotInitialized,
}

impl Error {
    /// Build a provider error for a named pipeline stage.
    pub fn provider(stage: PipelineStage, message: impl Into<String>) -> Self {
        Error::Provider {
            stage,
            message: message.into(),
        }
    }
}

/// Result type alias for folio
pub type Result<T> = std::result::Result<T, Error>;
