//! Lexical backend: inverted index + BM25 with field boosting

use crate::backend::{rank_hits, SearchBackend};
use crate::error::BackendError;
use crate::index::InvertedIndex;
use crate::scorer::Bm25Scorer;
use crate::tokenizer::tokenize_unique;
use async_trait::async_trait;
use dashmap::DashMap;
use ragline_core::{matches_filters, Query, Record, SearchResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Default backend name
pub const LEXICAL_BACKEND: &str = "lexical";

/// BM25 keyword search over record content
pub struct LexicalBackend {
    name: String,
    index: InvertedIndex,
    records: DashMap<String, Record>,
    scorer: Bm25Scorer,
    closed: AtomicBool,
}

impl Default for LexicalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalBackend {
    /// Create an empty backend named `lexical`
    pub fn new() -> Self {
        Self::with_scorer(LEXICAL_BACKEND, Bm25Scorer::default())
    }

    /// Create a backend with a custom name and scorer
    pub fn with_scorer(name: impl Into<String>, scorer: Bm25Scorer) -> Self {
        LexicalBackend {
            name: name.into(),
            index: InvertedIndex::new(),
            records: DashMap::new(),
            scorer,
            closed: AtomicBool::new(false),
        }
    }

    /// Access the underlying index (statistics)
    pub fn inverted_index(&self) -> &InvertedIndex {
        &self.index
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::unavailable(&self.name, "backend closed"));
        }
        Ok(())
    }

    fn score(&self, query: &Query) -> Vec<SearchResult> {
        let terms = tokenize_unique(&query.text);
        if terms.is_empty() {
            return Vec::new();
        }

        let avg_doc_len = self.index.avg_doc_len();
        let mut accum: HashMap<String, f32> = HashMap::new();
        for term in &terms {
            let Some(postings) = self.index.lookup(term) else {
                continue;
            };
            let idf = self.index.compute_idf(term);
            for entry in postings.entries {
                let s = self.scorer.term_score(idf, entry.tf, entry.doc_len, avg_doc_len);
                *accum.entry(entry.doc_id).or_insert(0.0) += s;
            }
        }

        accum
            .into_iter()
            .filter_map(|(id, score)| {
                let record = self.records.get(&id)?;
                if !matches_filters(&record.metadata, &query.filters) {
                    return None;
                }
                let boosted = score * self.scorer.field_multiplier(&terms, &record.metadata);
                Some(SearchResult::from_record(&record, boosted))
            })
            .collect()
    }
}

#[async_trait]
impl SearchBackend for LexicalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn index(&self, records: &[Record]) -> Result<(), BackendError> {
        self.ensure_open()?;
        for record in records {
            self.index.index_document(&record.id, &record.content);
            self.records.insert(record.id.clone(), record.clone());
        }
        debug!(
            target: "ragline::lexical",
            count = records.len(),
            total = self.records.len(),
            "Indexed records"
        );
        Ok(())
    }

    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>, BackendError> {
        self.ensure_open()?;
        Ok(rank_hits(self.score(query), query))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::Release);
        self.index.clear();
        self.records.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
