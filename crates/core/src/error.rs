//! Error types for Shelf.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! model provider, embedding, storage, prompt and retrieval failures.

use thiserror::Error;

/// Unified error type for Shelf.
///
/// All fallible functions return `Result<T, AppError>`. Infrastructure
/// failures (model provider, embedding backend, database) are kept apart from
/// caller mistakes such as an empty question, see [`AppError::is_transient`].
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Catalog and embedding store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The question itself cannot be answered (empty, whitespace only)
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    /// Retrieval could not run: every backend call failed or the deadline passed
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// A referenced book or shelf entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the error comes from an unreachable or failing backend rather
    /// than from the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Llm(_)
                | AppError::Embedding(_)
                | AppError::Store(_)
                | AppError::RetrievalUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
