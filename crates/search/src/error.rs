//! Backend and embedder errors
//!
//! Every `BackendError` is retryable from the orchestrator's point of view
//! and never fatal for a query: a backend that keeps failing simply
//! contributes zero results.

use ragline_core::RaglineError;
use std::io;
use thiserror::Error;

/// Errors from an [`Embedder`](crate::embed::Embedder)
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The embedding process could not be started
    #[error("failed to start embedding server: {0}")]
    Spawn(String),

    /// The server replied with something that is not a valid response
    #[error("embedding protocol error: {0}")]
    Protocol(String),

    /// The server reported a failure (`success: false`)
    #[error("embedding server error: {0}")]
    Server(String),

    /// The embedder was closed or the server exited
    #[error("embedder closed")]
    Closed,

    /// A returned vector does not have the configured dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Returned dimension
        actual: usize,
    },

    /// Pipe I/O failure
    #[error("embedding I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from a [`SearchBackend`](crate::backend::SearchBackend)
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not serve the request
    #[error("backend '{backend}' unavailable: {reason}")]
    Unavailable {
        /// Backend name
        backend: String,
        /// What went wrong
        reason: String,
    },

    /// The call did not finish within the orchestrator's timeout
    #[error("backend '{backend}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Backend name
        backend: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The backend's embedder failed
    #[error("backend '{backend}' embedding failed: {source}")]
    Embedding {
        /// Backend name
        backend: String,
        /// Embedder error
        #[source]
        source: EmbedError,
    },
}

impl BackendError {
    /// Build an unavailable error
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::Unavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Name of the backend that failed
    pub fn backend(&self) -> &str {
        match self {
            BackendError::Unavailable { backend, .. }
            | BackendError::Timeout { backend, .. }
            | BackendError::Embedding { backend, .. } => backend,
        }
    }

    /// Whether retrying can succeed. Always true: backend failures are
    /// transient by contract.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl From<BackendError> for RaglineError {
    fn from(e: BackendError) -> Self {
        RaglineError::BackendUnavailable {
            backend: e.backend().to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<EmbedError> for RaglineError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::Io(io) => RaglineError::Io(io),
            other => RaglineError::Embedding(other.to_string()),
        }
    }
}
