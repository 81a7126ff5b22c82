//! Search backend capability
//!
//! The orchestrator holds `Arc<dyn SearchBackend>` values and never a
//! concrete type. Every backend:
//! - indexes records idempotently per id (re-indexing overwrites)
//! - answers a query best-first with backend-native scores
//! - applies `query.filters` and `query.min_score` to its own scores
//! - reports failures as retryable [`BackendError`]s

use crate::error::BackendError;
use async_trait::async_trait;
use ragline_core::{Query, Record, SearchResult};
use std::cmp::Ordering;

/// Pluggable search backend
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name, used as the key for fusion weights
    fn name(&self) -> &str;

    /// Index records. Re-indexing an id supersedes the previous record.
    async fn index(&self, records: &[Record]) -> Result<(), BackendError>;

    /// Search, returning at most `query.top_k` results best-first
    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>, BackendError>;

    /// Release resources. Searches after close fail with `Unavailable`.
    async fn close(&self) -> Result<(), BackendError>;

    /// Number of indexed records
    fn len(&self) -> usize;

    /// Whether nothing is indexed
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply `min_score`, sort by (score desc, id asc) and truncate to `top_k`.
///
/// Shared by all backends so ordering is deterministic regardless of
/// iteration order of the underlying index.
pub fn rank_hits(mut hits: Vec<SearchResult>, query: &Query) -> Vec<SearchResult> {
    if let Some(min) = query.min_score {
        hits.retain(|h| h.score >= min);
    }
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(query.top_k);
    hits
}
