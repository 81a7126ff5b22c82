//! Retrieval intelligence for Ragline
//!
//! Everything between the search backends and the answer:
//! - RrfFuser: weighted Reciprocal Rank Fusion over backend rankings
//! - Enricher: budget-bounded structural context expansion
//! - QueryCache: TTL cache keyed by the normalized query
//! - HybridSearch: concurrent backend fan-out, fusion, enrichment
//! - ConfidenceEstimator / HeuristicEstimator: "is this enough?"
//! - CostLedger: approximate token and cost accounting
//! - AdaptiveRetriever: widens `k` until confident or out of budget
//! - Generator / ApiGenerator: the answer collaborator
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use ragline_core::{Query, Record};
//! use ragline_intelligence::{HybridSearch, RrfFuser};
//! use ragline_search::{HashingEmbedder, LexicalBackend, SearchBackend, VectorBackend};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let backends: Vec<Arc<dyn SearchBackend>> = vec![
//!     Arc::new(LexicalBackend::new()),
//!     Arc::new(VectorBackend::new(Arc::new(HashingEmbedder::new(128)))),
//! ];
//! let hybrid = HybridSearch::new(backends, RrfFuser::default());
//! hybrid.index(&[Record::new("c1", "Revenue grew 12%")]).await.unwrap();
//! let response = hybrid.search(&Query::new("revenue", 3)).await.unwrap();
//! assert_eq!(response.results[0].result.id, "c1");
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adaptive;
pub mod cache;
pub mod confidence;
pub mod enrich;
pub mod fuser;
pub mod generate;
pub mod hybrid;
pub mod ledger;
pub mod llm_client;

pub use adaptive::{AdaptiveRetriever, RetrievalOutcome, Termination, TimingBreakdown, TraceEntry};
pub use cache::{normalize_key, CacheEntry, CacheStats, QueryCache};
pub use confidence::{Confidence, ConfidenceEstimator, HeuristicEstimator};
pub use enrich::{
    ChunkKind, EnrichedResult, Enricher, EnrichmentLevel, EnrichmentOutcome, StructureIndex,
};
pub use fuser::{weighted_rrf_fuse, FusedResult, Fuser, RrfFuser};
pub use generate::{ApiGenerator, ExtractiveGenerator, GenerateError, Generation, Generator};
pub use hybrid::{BackendMetrics, HybridMetrics, HybridResponse, HybridSearch};
pub use ledger::{CostBreakdown, CostEntry, CostLedger, OperationKind};
pub use llm_client::LlmClientError;
