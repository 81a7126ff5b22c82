//! Hybrid search orchestrator
//!
//! This module provides:
//! - HybridSearch: fans one query out to every backend, fuses, enriches
//! - Query cache in front of the whole pipeline
//! - HybridMetrics: per-backend timings and failures, cache counters,
//!   running-average latency
//!
//! # Flow
//!
//! ```text
//!  Query
//!    │
//!    ▼
//!  cache ──hit──────────────────────────────┐
//!    │ miss                                 │
//!    ▼                                      │
//!  ┌──────────┐ ┌──────────┐                │
//!  │ lexical  │ │  vector  │  (concurrent,  │
//!  └────┬─────┘ └────┬─────┘   timeout +    │
//!       └─────┬──────┘         one retry)   │
//!             ▼                             │
//!          RrfFuser                         │
//!             ▼                             │
//!          Enricher                         │
//!             ▼                             │
//!        cache.put ─────────────────────────┤
//!                                           ▼
//!                                    HybridResponse
//! ```
//!
//! A backend that fails or times out contributes zero results; the query
//! still succeeds with what the others returned. Degraded responses are
//! not cached.

use crate::cache::{CacheStats, QueryCache};
use crate::enrich::{EnrichedResult, Enricher, EnrichmentOutcome, StructureIndex};
use crate::fuser::{Fuser, RrfFuser};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use ragline_core::{Query, RaglineConfig, RaglineError, RaglineResult, Record, SearchConfig, SearchResult};
use ragline_search::{BackendError, SearchBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================================
// Metrics
// ============================================================================

/// Cumulative counters for one backend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendMetrics {
    /// Search calls issued (retries included)
    pub calls: u64,
    /// Calls that failed or timed out
    pub failures: u64,
    /// Cumulative wall time across calls, microseconds
    pub total_micros: u64,
}

/// Snapshot of orchestrator metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HybridMetrics {
    /// Per-backend counters keyed by backend name
    pub backends: BTreeMap<String, BackendMetrics>,
    /// Cumulative fusion time, microseconds
    pub merge_micros: u64,
    /// Cumulative enrichment time, microseconds
    pub enrich_micros: u64,
    /// Cache lookups answered from the cache
    pub cache_hits: u64,
    /// Cache lookups that fell through
    pub cache_misses: u64,
    /// Queries served
    pub queries: u64,
    /// Running mean of end-to-end latency, microseconds
    pub avg_latency_micros: f64,
}

impl HybridMetrics {
    fn record_latency(&mut self, elapsed: Duration) {
        self.queries += 1;
        let x = elapsed.as_micros() as f64;
        self.avg_latency_micros += (x - self.avg_latency_micros) / self.queries as f64;
    }
}

// ============================================================================
// HybridResponse
// ============================================================================

/// Output of one orchestrated search
#[derive(Debug, Clone)]
pub struct HybridResponse {
    /// Fused (and possibly enriched) results, best first
    pub results: Vec<EnrichedResult>,
    /// Served from the cache
    pub from_cache: bool,
    /// Backends that contributed zero results because they failed
    pub failed_backends: Vec<String>,
    /// More fused candidates existed than `top_k`
    pub truncated: bool,
    /// Estimated tokens before enrichment
    pub baseline_tokens: usize,
    /// Estimated tokens after enrichment
    pub final_tokens: usize,
    /// End-to-end wall time
    pub elapsed: Duration,
}

impl HybridResponse {
    fn from_cached(results: Vec<EnrichedResult>, elapsed: Duration) -> Self {
        HybridResponse {
            baseline_tokens: results.iter().map(|r| r.original_tokens).sum(),
            final_tokens: results.iter().map(|r| r.enriched_tokens).sum(),
            results,
            from_cache: true,
            failed_backends: Vec::new(),
            truncated: false,
            elapsed,
        }
    }
}

struct BackendOutcome {
    name: String,
    hits: Result<Vec<SearchResult>, BackendError>,
    calls: u64,
    failures: u64,
    elapsed: Duration,
}

// ============================================================================
// HybridSearch
// ============================================================================

/// Composite search orchestrator
///
/// Cheap to share behind an `Arc`; every method takes `&self` and
/// independent queries may run concurrently.
pub struct HybridSearch {
    backends: Vec<Arc<dyn SearchBackend>>,
    fuser: RwLock<RrfFuser>,
    enricher: Enricher,
    structure: RwLock<StructureIndex>,
    cache: QueryCache,
    config: SearchConfig,
    metrics: Mutex<HybridMetrics>,
    closed: AtomicBool,
}

impl HybridSearch {
    /// Create an orchestrator over `backends` with default settings
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>, fuser: RrfFuser) -> Self {
        HybridSearch {
            backends,
            fuser: RwLock::new(fuser),
            enricher: Enricher::default(),
            structure: RwLock::new(StructureIndex::new()),
            cache: QueryCache::from_config(&Default::default()),
            config: SearchConfig::default(),
            metrics: Mutex::new(HybridMetrics::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Build from a validated `RaglineConfig`
    pub fn from_config(
        backends: Vec<Arc<dyn SearchBackend>>,
        config: &RaglineConfig,
    ) -> RaglineResult<Self> {
        config.validate()?;
        Ok(Self::new(backends, RrfFuser::from_config(&config.fusion)?)
            .with_enricher(Enricher::new(config.enrichment.clone()))
            .with_cache(QueryCache::from_config(&config.cache))
            .with_search_config(config.search.clone()))
    }

    /// Builder: set the enricher
    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = enricher;
        self
    }

    /// Builder: set the cache
    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    /// Builder: set timeouts, retries and candidate depth
    pub fn with_search_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Names of the configured backends
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// RRF smoothing constant currently in use
    pub fn smoothing_constant(&self) -> u32 {
        self.fuser.read().smoothing_constant()
    }

    /// Current fusion weights
    pub fn weights(&self) -> BTreeMap<String, f32> {
        self.fuser.read().weights().clone()
    }

    /// Replace fusion weights and drop every cached result.
    ///
    /// On a validation error the old weights and the cache are untouched.
    pub fn set_weights(&self, weights: BTreeMap<String, f32>) -> RaglineResult<()> {
        self.fuser.write().set_weights(weights)?;
        self.cache.clear();
        debug!(target: "ragline::hybrid", "Fusion weights changed, cache cleared");
        Ok(())
    }

    /// Number of records known to the structure index
    pub fn structure_len(&self) -> usize {
        self.structure.read().len()
    }

    /// Query cache
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn ensure_open(&self) -> RaglineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RaglineError::backend("hybrid", "orchestrator closed"));
        }
        Ok(())
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// Index records into every backend and the structure index.
    ///
    /// Writes fan out concurrently. The cache is cleared once afterwards,
    /// in one write-locked step, even if a backend failed.
    pub async fn index(&self, records: &[Record]) -> RaglineResult<()> {
        self.ensure_open()?;
        let writes = self.backends.iter().map(|b| b.index(records));
        let outcomes = join_all(writes).await;

        self.structure.write().upsert(records);
        self.cache.clear();

        let mut first_err = None;
        for (backend, outcome) in self.backends.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(
                    target: "ragline::hybrid",
                    backend = backend.name(),
                    error = %e,
                    "Indexing failed"
                );
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        debug!(
            target: "ragline::hybrid",
            count = records.len(),
            "Indexed records, cache cleared"
        );
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Search every backend, fuse, enrich.
    ///
    /// Backend failures are contained; the only error is a closed
    /// orchestrator.
    pub async fn search(&self, query: &Query) -> RaglineResult<HybridResponse> {
        self.ensure_open()?;
        let start = Instant::now();

        if let Some(results) = self.cache.get(query) {
            let elapsed = start.elapsed();
            let mut metrics = self.metrics.lock();
            metrics.cache_hits += 1;
            metrics.record_latency(elapsed);
            return Ok(HybridResponse::from_cached(results, elapsed));
        }
        self.metrics.lock().cache_misses += 1;
        // Read before fan-out: an index() that lands mid-search bumps it
        let generation = self.cache.generation();

        let depth = query
            .top_k
            .saturating_mul(self.config.candidate_multiplier.max(1));
        let candidate_query = query.with_top_k(depth);
        let outcomes = join_all(
            self.backends
                .iter()
                .map(|b| self.call_backend(Arc::clone(b), &candidate_query)),
        )
        .await;

        let mut lists = Vec::with_capacity(outcomes.len());
        let mut failed_backends = Vec::new();
        {
            let mut metrics = self.metrics.lock();
            for outcome in outcomes {
                let entry = metrics.backends.entry(outcome.name.clone()).or_default();
                entry.calls += outcome.calls;
                entry.failures += outcome.failures;
                entry.total_micros += outcome.elapsed.as_micros() as u64;
                match outcome.hits {
                    Ok(hits) => lists.push((outcome.name, hits)),
                    Err(_) => failed_backends.push(outcome.name),
                }
            }
        }

        let merge_start = Instant::now();
        let fused = self.fuser.read().fuse(lists, query.top_k);
        let merge_elapsed = merge_start.elapsed();

        let enrich_start = Instant::now();
        let outcome: EnrichmentOutcome = if self.config.enrich {
            let structure = self.structure.read();
            self.enricher.enrich(fused.results, &structure)
        } else {
            Enricher::passthrough(fused.results)
        };
        let enrich_elapsed = enrich_start.elapsed();

        if failed_backends.is_empty() {
            if let Err(e) = self
                .cache
                .put_if_current(query, &outcome.results, generation)
            {
                warn!(target: "ragline::hybrid", error = %e, "Failed to cache results");
            }
        }

        let elapsed = start.elapsed();
        {
            let mut metrics = self.metrics.lock();
            metrics.merge_micros += merge_elapsed.as_micros() as u64;
            metrics.enrich_micros += enrich_elapsed.as_micros() as u64;
            metrics.record_latency(elapsed);
        }
        info!(
            target: "ragline::hybrid",
            top_k = query.top_k,
            results = outcome.results.len(),
            failed = failed_backends.len(),
            elapsed_micros = elapsed.as_micros() as u64,
            "Hybrid search complete"
        );

        Ok(HybridResponse {
            results: outcome.results,
            from_cache: false,
            failed_backends,
            truncated: fused.truncated,
            baseline_tokens: outcome.baseline_tokens,
            final_tokens: outcome.final_tokens,
            elapsed,
        })
    }

    /// One backend call with timeout and retries
    async fn call_backend(&self, backend: Arc<dyn SearchBackend>, query: &Query) -> BackendOutcome {
        let name = backend.name().to_string();
        let timeout_ms = self.config.backend_timeout_ms;
        let attempts = self.config.backend_retries.saturating_add(1);
        let start = Instant::now();
        let mut failures = 0;
        let mut last_err = None;

        for attempt in 1..=attempts {
            let result =
                match tokio::time::timeout(Duration::from_millis(timeout_ms), backend.search(query))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout {
                        backend: name.clone(),
                        timeout_ms,
                    }),
                };
            match result {
                Ok(hits) => {
                    return BackendOutcome {
                        name,
                        hits: Ok(hits),
                        calls: attempt as u64,
                        failures,
                        elapsed: start.elapsed(),
                    };
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        target: "ragline::hybrid",
                        backend = %name,
                        attempt,
                        error = %e,
                        "Backend search failed"
                    );
                    let retry = e.is_retryable();
                    last_err = Some(e);
                    if !retry {
                        break;
                    }
                }
            }
        }

        BackendOutcome {
            hits: Err(last_err
                .unwrap_or_else(|| BackendError::unavailable(&name, "no attempts made"))),
            name,
            calls: failures,
            failures,
            elapsed: start.elapsed(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Metrics snapshot
    pub fn metrics(&self) -> HybridMetrics {
        self.metrics.lock().clone()
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Close every backend and drop the cache. Later calls fail.
    pub async fn close(&self) -> RaglineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let outcomes = join_all(self.backends.iter().map(|b| b.close())).await;
        self.cache.clear();
        self.structure.write().clear();

        let mut first_err: Option<RaglineError> = None;
        for outcome in outcomes {
            if let Err(e) = outcome {
                if first_err.is_none() {
                    first_err = Some(e.into());
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragline_search::{HashingEmbedder, LexicalBackend, VectorBackend};
    use std::sync::atomic::AtomicUsize;

    fn corpus() -> Vec<Record> {
        vec![
            Record::new("h1", "Financial Results")
                .with_meta("chunk_type", "section")
                .with_meta("page", 1)
                .with_meta("order", 0),
            Record::new("p1", "Revenue grew twelve percent year over year.")
                .with_meta("chunk_type", "paragraph")
                .with_meta("page", 1)
                .with_meta("order", 1)
                .with_meta("parent_section", "Financial Results"),
            Record::new("p2", "Operating margin improved on lower costs.")
                .with_meta("chunk_type", "paragraph")
                .with_meta("page", 1)
                .with_meta("order", 2)
                .with_meta("parent_section", "Financial Results"),
            Record::new("p3", "Headcount was flat across regions.")
                .with_meta("chunk_type", "paragraph")
                .with_meta("page", 2)
                .with_meta("order", 0),
        ]
    }

    fn hybrid() -> HybridSearch {
        let lexical: Arc<dyn SearchBackend> = Arc::new(LexicalBackend::new());
        let vector: Arc<dyn SearchBackend> =
            Arc::new(VectorBackend::new(Arc::new(HashingEmbedder::new(128))));
        HybridSearch::new(vec![lexical, vector], RrfFuser::default())
    }

    /// Backend that counts calls and can be told to fail or hang
    struct ScriptedBackend {
        name: String,
        calls: AtomicUsize,
        fail_first: usize,
        hang: bool,
    }

    impl ScriptedBackend {
        fn new(name: &str) -> Self {
            ScriptedBackend {
                name: name.to_string(),
                calls: AtomicUsize::new(0),
                fail_first: 0,
                hang: false,
            }
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }
        async fn index(&self, _records: &[Record]) -> Result<(), BackendError> {
            Ok(())
        }
        async fn search(&self, query: &Query) -> Result<Vec<SearchResult>, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if n < self.fail_first {
                return Err(BackendError::unavailable(&self.name, "scripted failure"));
            }
            Ok((0..query.top_k.min(3))
                .map(|i| SearchResult {
                    id: format!("{}-{}", self.name, i),
                    score: 1.0 - i as f32 * 0.1,
                    content: format!("doc {}", i),
                    metadata: Default::default(),
                })
                .collect())
        }
        async fn close(&self) -> Result<(), BackendError> {
            Ok(())
        }
        fn len(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn test_search_fuses_both_backends() {
        let h = hybrid();
        h.index(&corpus()).await.unwrap();
        let resp = h.search(&Query::new("revenue grew", 2)).await.unwrap();
        assert!(!resp.from_cache);
        assert!(resp.failed_backends.is_empty());
        assert_eq!(resp.results[0].result.id, "p1");
        assert_eq!(resp.results[0].result.backend_count(), 2);
        assert!(resp.results.len() <= 2);
    }

    #[tokio::test]
    async fn test_second_search_hits_cache() {
        let h = hybrid();
        h.index(&corpus()).await.unwrap();
        let q = Query::new("revenue grew", 2);
        let first = h.search(&q).await.unwrap();
        let second = h.search(&Query::new("  REVENUE grew ", 2)).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.results, second.results);

        let m = h.metrics();
        assert_eq!(m.cache_hits, 1);
        assert_eq!(m.cache_misses, 1);
        assert_eq!(m.queries, 2);
    }

    #[tokio::test]
    async fn test_index_clears_cache() {
        let h = hybrid();
        h.index(&corpus()).await.unwrap();
        let q = Query::new("revenue", 2);
        h.search(&q).await.unwrap();
        assert_eq!(h.cache().len(), 1);

        h.index(&[Record::new("p9", "Revenue guidance raised")]).await.unwrap();
        assert!(h.cache().is_empty());
        assert!(!h.search(&q).await.unwrap().from_cache);
    }

    #[tokio::test]
    async fn test_set_weights_clears_cache_and_validates() {
        let h = hybrid();
        h.index(&corpus()).await.unwrap();
        h.search(&Query::new("revenue", 2)).await.unwrap();

        let bad = BTreeMap::from([("lexical".to_string(), 0.9), ("vector".to_string(), 0.5)]);
        assert!(h.set_weights(bad).is_err());
        assert_eq!(h.cache().len(), 1, "failed update leaves cache alone");

        let good = BTreeMap::from([("lexical".to_string(), 0.5), ("vector".to_string(), 0.5)]);
        h.set_weights(good.clone()).unwrap();
        assert!(h.cache().is_empty());
        assert_eq!(h.weights(), good);
    }

    #[tokio::test]
    async fn test_enrichment_applied() {
        let h = hybrid();
        h.index(&corpus()).await.unwrap();
        let resp = h.search(&Query::new("operating margin", 1)).await.unwrap();
        let top = &resp.results[0];
        assert_eq!(top.result.id, "p2");
        assert!(resp.final_tokens >= resp.baseline_tokens);
        if top.enriched {
            assert!(top.result.content.contains("Operating margin"));
        }
    }

    #[tokio::test]
    async fn test_failing_backend_is_contained() {
        let ok: Arc<dyn SearchBackend> = Arc::new(ScriptedBackend::new("lexical"));
        let mut broken = ScriptedBackend::new("vector");
        broken.fail_first = usize::MAX;
        let broken = Arc::new(broken);
        let h = HybridSearch::new(
            vec![ok, broken.clone() as Arc<dyn SearchBackend>],
            RrfFuser::default(),
        );

        let resp = h.search(&Query::new("anything", 3)).await.unwrap();
        assert_eq!(resp.failed_backends, vec!["vector".to_string()]);
        assert_eq!(resp.results.len(), 3);
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2, "one retry");
        assert!(h.cache().is_empty(), "degraded responses are not cached");

        let m = h.metrics();
        assert_eq!(m.backends["vector"].failures, 2);
        assert_eq!(m.backends["lexical"].failures, 0);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mut flaky = ScriptedBackend::new("lexical");
        flaky.fail_first = 1;
        let flaky = Arc::new(flaky);
        let h = HybridSearch::new(
            vec![flaky.clone() as Arc<dyn SearchBackend>],
            RrfFuser::new(60, BTreeMap::from([("lexical".to_string(), 1.0)])).unwrap(),
        );
        let resp = h.search(&Query::new("anything", 2)).await.unwrap();
        assert!(resp.failed_backends.is_empty());
        assert_eq!(resp.results.len(), 2);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_contained() {
        let ok: Arc<dyn SearchBackend> = Arc::new(ScriptedBackend::new("lexical"));
        let mut slow = ScriptedBackend::new("vector");
        slow.hang = true;
        let h = HybridSearch::new(vec![ok, Arc::new(slow)], RrfFuser::default())
            .with_search_config(SearchConfig {
                backend_timeout_ms: 20,
                backend_retries: 0,
                ..SearchConfig::default()
            });

        let resp = h.search(&Query::new("anything", 2)).await.unwrap();
        assert_eq!(resp.failed_backends, vec!["vector".to_string()]);
        assert_eq!(resp.results.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_orchestrator_rejects_calls() {
        let h = hybrid();
        h.index(&corpus()).await.unwrap();
        h.close().await.unwrap();
        assert!(h.search(&Query::new("revenue", 2)).await.is_err());
        assert!(h.index(&corpus()).await.is_err());
        assert!(h.close().await.is_ok());
    }

    #[test]
    fn test_incremental_mean() {
        let mut m = HybridMetrics::default();
        m.record_latency(Duration::from_micros(100));
        m.record_latency(Duration::from_micros(300));
        m.record_latency(Duration::from_micros(200));
        assert!((m.avg_latency_micros - 200.0).abs() < 1e-9);
        assert_eq!(m.queries, 3);
    }

    #[test]
    fn test_hybrid_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HybridSearch>();
    }
}
