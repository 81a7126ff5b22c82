//! Embedder capability consumed by the vector backend
//!
//! Ragline does not define how embeddings are computed. Two implementations
//! ship with the crate:
//! - [`HashingEmbedder`]: deterministic feature hashing, no external process
//! - [`IpcEmbedder`]: an external embedding server speaking line-delimited
//!   JSON over stdin/stdout

mod hashing;
mod ipc;

pub use hashing::HashingEmbedder;
pub use ipc::{IpcEmbedder, IpcRequest, IpcResponse};

use crate::error::EmbedError;
use async_trait::async_trait;

/// Produces one vector per input text
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedder name for logs
    fn name(&self) -> &str;

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, preserving order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Release resources (stop a server process)
    async fn close(&self) -> Result<(), EmbedError> {
        Ok(())
    }
}
