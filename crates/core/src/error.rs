//! Error types for Ragline
//!
//! One crate-wide error enum, built with `thiserror`. Leaf crates define
//! their own narrow errors (backend, embedder, generator) and convert into
//! this one at the boundary where a caller needs a single type.

use std::io;
use thiserror::Error;

/// Result type alias for Ragline operations
pub type RaglineResult<T> = std::result::Result<T, RaglineError>;

/// Error types for Ragline
#[derive(Debug, Error)]
pub enum RaglineError {
    /// Invalid configuration detected at construction time. Never retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A search backend could not serve a request
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable {
        /// Backend name
        backend: String,
        /// What went wrong
        reason: String,
    },

    /// A heuristic estimator could not produce a trustworthy reading
    #[error("Estimation degraded: {0}")]
    EstimationDegraded(String),

    /// A cached entry could not be decoded
    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    /// The generation collaborator failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Embedding computation failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// I/O error (config files, embedding server pipes)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RaglineError {
    /// Build a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        RaglineError::Configuration(msg.into())
    }

    /// Build a backend-unavailable error
    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        RaglineError::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RaglineError::BackendUnavailable { .. } | RaglineError::Embedding(_) | RaglineError::Io(_)
        )
    }
}

impl From<serde_json::Error> for RaglineError {
    fn from(e: serde_json::Error) -> Self {
        RaglineError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RaglineError {
    fn from(e: toml::de::Error) -> Self {
        RaglineError::Configuration(e.to_string())
    }
}
