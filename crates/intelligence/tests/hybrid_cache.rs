//! Cache behaviour of the hybrid orchestrator, observed through backend
//! call counts

use async_trait::async_trait;
use ragline_core::{CacheConfig, Query, Record, SearchResult};
use parking_lot::RwLock;
use ragline_intelligence::{HybridSearch, QueryCache, RrfFuser};
use ragline_search::{BackendError, SearchBackend};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct CountingBackend {
    name: &'static str,
    searches: AtomicUsize,
}

impl CountingBackend {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(CountingBackend {
            name,
            searches: AtomicUsize::new(0),
        })
    }

    fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for CountingBackend {
    fn name(&self) -> &str {
        self.name
    }
    async fn index(&self, _records: &[Record]) -> Result<(), BackendError> {
        Ok(())
    }
    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>, BackendError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok((0..query.top_k.min(4))
            .map(|i| SearchResult::from_record(&Record::new(format!("d{}", i), "text"), 1.0))
            .collect())
    }
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
    fn len(&self) -> usize {
        4
    }
}

fn setup(cache: QueryCache) -> (HybridSearch, Arc<CountingBackend>, Arc<CountingBackend>) {
    let lexical = CountingBackend::new("lexical");
    let vector = CountingBackend::new("vector");
    let hybrid = HybridSearch::new(
        vec![
            lexical.clone() as Arc<dyn SearchBackend>,
            vector.clone() as Arc<dyn SearchBackend>,
        ],
        RrfFuser::default(),
    )
    .with_cache(cache);
    (hybrid, lexical, vector)
}

#[tokio::test]
async fn test_cache_hit_makes_zero_backend_calls() {
    let (hybrid, lexical, vector) = setup(QueryCache::new(Duration::from_secs(60), true));
    let q = Query::new("quarterly revenue", 3);

    let first = hybrid.search(&q).await.unwrap();
    assert_eq!((lexical.searches(), vector.searches()), (1, 1));

    let second = hybrid.search(&q).await.unwrap();
    assert!(second.from_cache);
    assert_eq!((lexical.searches(), vector.searches()), (1, 1));
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn test_expired_entry_goes_back_to_backends() {
    let (hybrid, lexical, _) = setup(QueryCache::new(Duration::from_millis(30), true));
    let q = Query::new("quarterly revenue", 3);

    hybrid.search(&q).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let again = hybrid.search(&q).await.unwrap();
    assert!(!again.from_cache);
    assert_eq!(lexical.searches(), 2);
}

#[tokio::test]
async fn test_disabled_cache_always_searches() {
    let (hybrid, lexical, _) = setup(QueryCache::from_config(&CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    }));
    let q = Query::new("quarterly revenue", 3);
    hybrid.search(&q).await.unwrap();
    hybrid.search(&q).await.unwrap();
    assert_eq!(lexical.searches(), 2);
}

#[tokio::test]
async fn test_reindex_invalidates_for_concurrent_readers() {
    let (hybrid, lexical, _) = setup(QueryCache::new(Duration::from_secs(60), true));
    let hybrid = Arc::new(hybrid);
    let q = Query::new("quarterly revenue", 3);
    hybrid.search(&q).await.unwrap();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&hybrid);
            let q = q.clone();
            tokio::spawn(async move { h.search(&q).await.unwrap().results.len() })
        })
        .collect();
    hybrid.index(&[Record::new("new", "fresh text")]).await.unwrap();
    for r in readers {
        assert_eq!(r.await.unwrap(), 3);
    }

    assert!(hybrid.cache_stats().entries <= 1);
    assert!(lexical.searches() >= 2, "re-index forced at least one fresh search");
}

#[tokio::test]
async fn test_distinct_params_do_not_share_entries() {
    let (hybrid, lexical, _) = setup(QueryCache::new(Duration::from_secs(60), true));
    hybrid.search(&Query::new("revenue", 3)).await.unwrap();
    hybrid.search(&Query::new("revenue", 2)).await.unwrap();
    hybrid
        .search(&Query::new("revenue", 3).with_filter("page", 1))
        .await
        .unwrap();
    assert_eq!(lexical.searches(), 3);
    assert_eq!(hybrid.cache_stats().entries, 3);
}

/// Backend whose next search snapshots its records, then parks until
/// released
struct GatedBackend {
    ids: RwLock<Vec<String>>,
    gate_next: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SearchBackend for GatedBackend {
    fn name(&self) -> &str {
        "lexical"
    }
    async fn index(&self, records: &[Record]) -> Result<(), BackendError> {
        *self.ids.write() = records.iter().map(|r| r.id.clone()).collect();
        Ok(())
    }
    async fn search(&self, _query: &Query) -> Result<Vec<SearchResult>, BackendError> {
        let snapshot = self.ids.read().clone();
        if self.gate_next.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(snapshot
            .iter()
            .map(|id| SearchResult::from_record(&Record::new(id.as_str(), "text"), 1.0))
            .collect())
    }
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
    fn len(&self) -> usize {
        self.ids.read().len()
    }
}

fn ids(results: &[ragline_intelligence::EnrichedResult]) -> Vec<String> {
    results.iter().map(|r| r.result.id.clone()).collect()
}

#[tokio::test]
async fn test_search_spanning_reindex_does_not_cache_stale_results() {
    let gated = Arc::new(GatedBackend {
        ids: RwLock::new(Vec::new()),
        gate_next: AtomicBool::new(false),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let fuser = RrfFuser::new(60, BTreeMap::from([("lexical".to_string(), 1.0)])).unwrap();
    let hybrid = Arc::new(
        HybridSearch::new(vec![gated.clone() as Arc<dyn SearchBackend>], fuser)
            .with_cache(QueryCache::new(Duration::from_secs(60), true)),
    );
    hybrid.index(&[Record::new("old", "text")]).await.unwrap();
    let q = Query::new("quarterly revenue", 3);

    gated.gate_next.store(true, Ordering::SeqCst);
    let in_flight = {
        let h = Arc::clone(&hybrid);
        let q = q.clone();
        tokio::spawn(async move { h.search(&q).await.unwrap() })
    };
    gated.entered.notified().await;
    hybrid.index(&[Record::new("new", "text")]).await.unwrap();
    gated.release.notify_one();

    let stale = in_flight.await.unwrap();
    assert_eq!(ids(&stale.results), vec!["old"]);
    assert_eq!(hybrid.cache_stats().entries, 0);

    let after = hybrid.search(&q).await.unwrap();
    assert!(!after.from_cache);
    assert_eq!(ids(&after.results), vec!["new"]);

    let cached = hybrid.search(&q).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(ids(&cached.results), vec!["new"]);
}
