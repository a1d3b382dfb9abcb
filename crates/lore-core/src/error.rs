//! Error types for lorekeeper.

use thiserror::Error;

/// Result type alias using lorekeeper's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lorekeeper operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Enrichment run not found
    #[error("Enrichment run not found: {0}")]
    EnrichmentRunNotFound(uuid::Uuid),

    /// Inference/provider call failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// AI cache operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input (caller contract violation, e.g. bad enum value)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
