//! Vector backend: brute-force cosine nearest neighbours
//!
//! O(n) per query, fine for corpora of a few thousand chunks. Entries live
//! in a BTreeMap so iteration is in id order before scoring, and ties are
//! broken by id ascending after scoring.

use crate::backend::{rank_hits, SearchBackend};
use crate::distance::cosine_similarity;
use crate::embed::Embedder;
use crate::error::BackendError;
use async_trait::async_trait;
use parking_lot::RwLock;
use ragline_core::{matches_filters, Query, Record, SearchResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default backend name
pub const VECTOR_BACKEND: &str = "vector";

struct VectorEntry {
    record: Record,
    embedding: Vec<f32>,
}

/// Cosine similarity search over embedder output
pub struct VectorBackend {
    name: String,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<BTreeMap<String, VectorEntry>>,
    closed: AtomicBool,
}

impl VectorBackend {
    /// Create an empty backend named `vector`
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_name(VECTOR_BACKEND, embedder)
    }

    /// Create an empty backend with a custom name
    pub fn with_name(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        VectorBackend {
            name: name.into(),
            embedder,
            entries: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::unavailable(&self.name, "backend closed"));
        }
        Ok(())
    }

    fn embedding_error(&self, source: crate::error::EmbedError) -> BackendError {
        BackendError::Embedding {
            backend: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl SearchBackend for VectorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn index(&self, records: &[Record]) -> Result<(), BackendError> {
        self.ensure_open()?;
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| self.embedding_error(e))?;
        if embeddings.len() != records.len() {
            return Err(BackendError::unavailable(
                &self.name,
                format!(
                    "embedder returned {} vectors for {} records",
                    embeddings.len(),
                    records.len()
                ),
            ));
        }

        let mut entries = self.entries.write();
        for (record, embedding) in records.iter().zip(embeddings) {
            entries.insert(
                record.id.clone(),
                VectorEntry {
                    record: record.clone(),
                    embedding,
                },
            );
        }
        debug!(
            target: "ragline::vector",
            count = records.len(),
            total = entries.len(),
            "Indexed records"
        );
        Ok(())
    }

    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>, BackendError> {
        self.ensure_open()?;
        if query.top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedder
            .embed(std::slice::from_ref(&query.text))
            .await
            .map_err(|e| self.embedding_error(e))?;
        let Some(query_vec) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let hits: Vec<SearchResult> = self
            .entries
            .read()
            .values()
            .filter(|e| matches_filters(&e.record.metadata, &query.filters))
            .map(|e| {
                let score = cosine_similarity(&query_vec, &e.embedding);
                SearchResult::from_record(&e.record, score)
            })
            .collect();

        Ok(rank_hits(hits, query))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::Release);
        self.entries.write().clear();
        self.embedder
            .close()
            .await
            .map_err(|e| self.embedding_error(e))
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
