//! Orchestrated search through the facade

use crate::common::*;
use std::collections::BTreeMap;

#[tokio::test]
async fn test_search_ranks_exact_match_first() {
    let rag = indexed().await;
    let resp = rag.search(&Query::new("operating margin", 3)).await.unwrap();
    assert_eq!(resp.results[0].result.id, "p-margin");
    assert!(resp.results.len() <= 3);
    assert!(resp.failed_backends.is_empty());
}

#[tokio::test]
async fn test_search_results_unique_and_ordered() {
    let rag = indexed().await;
    let resp = rag.search(&Query::new("revenue segment cloud", 5)).await.unwrap();
    let mut ids: Vec<&str> = resp.results.iter().map(|r| r.result.id.as_str()).collect();
    let n = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), n);
    for pair in resp.results.windows(2) {
        assert!(pair[0].result.fused_score >= pair[1].result.fused_score);
    }
}

#[tokio::test]
async fn test_enrichment_respects_budget() {
    let rag = indexed().await;
    let resp = rag.search(&Query::new("revenue by segment", 4)).await.unwrap();
    let max = (resp.baseline_tokens as f64 * 1.3).floor() as usize;
    assert!(resp.final_tokens <= max);
    let total: usize = resp
        .results
        .iter()
        .map(|r| ragline::estimate_tokens(&r.result.content))
        .sum();
    assert!(total <= max);
}

#[tokio::test]
async fn test_filters_reach_backends() {
    let rag = indexed().await;
    let resp = rag
        .search(&Query::new("revenue headcount", 5).with_filter("page", 2))
        .await
        .unwrap();
    assert!(!resp.results.is_empty());
    assert!(resp.results.iter().all(|r| r.result.metadata["page"] == 2));
}

#[tokio::test]
async fn test_repeat_search_served_from_cache() {
    let rag = indexed().await;
    let q = Query::new("operating margin", 3);
    rag.search(&q).await.unwrap();
    let again = rag.search(&q).await.unwrap();
    assert!(again.from_cache);

    let metrics = rag.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.backends["lexical"].calls, 1);
    assert_eq!(metrics.backends["vector"].calls, 1);
}

#[tokio::test]
async fn test_weight_change_invalidates_cache() {
    let rag = indexed().await;
    let q = Query::new("operating margin", 3);
    rag.search(&q).await.unwrap();

    rag.set_weights(BTreeMap::from([
        ("lexical".to_string(), 1.0),
        ("vector".to_string(), 0.0),
    ]))
    .unwrap();
    let resp = rag.search(&q).await.unwrap();
    assert!(!resp.from_cache);
    assert_eq!(resp.results[0].result.id, "p-margin");
    assert!(resp.results[0].result.backend_ranks.contains_key("lexical"));
}

#[tokio::test]
async fn test_close_rejects_further_work() {
    let rag = indexed().await;
    rag.close().await.unwrap();
    assert!(rag.search(&Query::new("revenue", 2)).await.is_err());
}
