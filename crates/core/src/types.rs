//! Shared retrieval types
//!
//! - `Record`: unit of indexed text plus free-form metadata
//! - `Query`: one search call
//! - `SearchResult`: backend-native ranking unit
//! - `RankedResult`: fused ranking unit, produced only by the merger

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form key/value metadata attached to a record (page, section title,
/// table info, ...)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata equality filters. Ordered so that equal filter sets normalize
/// to the same cache key.
pub type Filters = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Record
// ============================================================================

/// A unit of indexed text
///
/// Immutable once indexed. Re-indexing the same id supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, unique within a corpus
    pub id: String,
    /// Indexed text
    pub content: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// Create a record with empty metadata
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Record {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder: set one metadata field
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Query
// ============================================================================

/// One search call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Natural language query text
    pub text: String,
    /// Number of results wanted
    pub top_k: usize,
    /// Metadata equality filters (array values mean any-of)
    #[serde(default)]
    pub filters: Filters,
    /// Minimum backend-native score; applied by each backend to its own scores
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Query {
    /// Create a query with no filters
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Query {
            text: text.into(),
            top_k,
            filters: Filters::new(),
            min_score: None,
        }
    }

    /// Builder: add a metadata filter
    pub fn with_filter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(key.to_string(), value.into());
        self
    }

    /// Builder: set minimum native score
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Same query with a different result width
    pub fn with_top_k(&self, top_k: usize) -> Self {
        Query {
            top_k,
            ..self.clone()
        }
    }
}

// ============================================================================
// SearchResult
// ============================================================================

/// Backend-native ranking unit
///
/// `score` is only comparable within the backend that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Record id
    pub id: String,
    /// Backend-native score (higher = better)
    pub score: f32,
    /// Record content
    pub content: String,
    /// Record metadata
    pub metadata: Metadata,
}

impl SearchResult {
    /// Build a result from an indexed record
    pub fn from_record(record: &Record, score: f32) -> Self {
        SearchResult {
            id: record.id.clone(),
            score,
            content: record.content.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

// ============================================================================
// RankedResult
// ============================================================================

/// Fused ranking unit
///
/// `fused_score` is comparable across the whole system. Ids are unique
/// within one merge output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// Record id
    pub id: String,
    /// Score from the first backend list the id was seen in
    pub score: f32,
    /// Record content
    pub content: String,
    /// Record metadata
    pub metadata: Metadata,
    /// 1-indexed rank per backend that returned this id
    pub backend_ranks: BTreeMap<String, u32>,
    /// Reciprocal rank fusion score
    pub fused_score: f32,
}

impl RankedResult {
    /// Start a ranked result from a backend hit
    pub fn from_hit(hit: SearchResult) -> Self {
        RankedResult {
            id: hit.id,
            score: hit.score,
            content: hit.content,
            metadata: hit.metadata,
            backend_ranks: BTreeMap::new(),
            fused_score: 0.0,
        }
    }

    /// Number of backends that returned this id
    pub fn backend_count(&self) -> usize {
        self.backend_ranks.len()
    }
}
