//! Fusion of backend result lists
//!
//! This module provides:
//! - Fuser trait for pluggable fusion algorithms
//! - RrfFuser: weighted Reciprocal Rank Fusion keyed by backend name
//! - weighted_rrf_fuse: N-way fusion with per-list weights
//!
//! Backend scores are never compared across backends; only ranks are.

use ragline_core::config::validate_weights;
use ragline_core::{FusionConfig, RaglineResult, RankedResult, SearchResult};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

// ============================================================================
// FusedResult
// ============================================================================

/// Result of fusing several ranked lists
#[derive(Debug, Clone, Default)]
pub struct FusedResult {
    /// Final ranked list, ids unique
    pub results: Vec<RankedResult>,
    /// Whether more candidates existed than `top_k`
    pub truncated: bool,
}

// ============================================================================
// Fuser Trait
// ============================================================================

/// Pluggable fusion interface
///
/// Takes `(backend name, best-first results)` pairs and returns one list
/// truncated to `top_k`.
pub trait Fuser: Send + Sync {
    /// Fuse results from multiple backends
    fn fuse(&self, results: Vec<(String, Vec<SearchResult>)>, top_k: usize) -> FusedResult;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

// ============================================================================
// Shared RRF helpers
// ============================================================================

/// Accumulate one list into the per-id accumulators.
fn accumulate(
    acc: &mut HashMap<String, RankedResult>,
    backend: &str,
    hits: Vec<SearchResult>,
    weight: f32,
    smoothing_constant: u32,
) {
    for (pos, hit) in hits.into_iter().enumerate() {
        let rank = (pos + 1) as u32;
        let entry = acc
            .entry(hit.id.clone())
            .or_insert_with(|| RankedResult::from_hit(hit));
        // A backend listing the same id twice counts once, at its best rank
        if entry.backend_ranks.contains_key(backend) {
            continue;
        }
        entry.backend_ranks.insert(backend.to_string(), rank);
        entry.fused_score += weight / (smoothing_constant as f32 + rank as f32);
    }
}

/// Sort by fused score descending, id ascending, then truncate.
fn finish(acc: HashMap<String, RankedResult>, top_k: usize) -> FusedResult {
    let mut results: Vec<RankedResult> = acc.into_values().collect();
    results.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    let truncated = results.len() > top_k;
    results.truncate(top_k);
    FusedResult { results, truncated }
}

// ============================================================================
// RrfFuser
// ============================================================================

/// Weighted Reciprocal Rank Fusion
///
/// RRF(d) = Σ_i weight_i / (c + rank_i(d)), ranks 1-indexed per backend.
///
/// # Example
///
/// ```text
/// weights: lexical 0.6, vector 0.4, c = 60
///   lexical: [a, b]      vector: [b, c]
///
///   a: 0.6/61                 = 0.00984
///   b: 0.6/62 + 0.4/61        = 0.01623  <- highest
///   c: 0.4/62                 = 0.00645
///
/// Final ranking: [b, a, c]
/// ```
#[derive(Debug, Clone)]
pub struct RrfFuser {
    /// Smoothing constant (default 60)
    smoothing_constant: u32,
    /// Backend name -> weight, summing to 1.0 (±0.01)
    weights: BTreeMap<String, f32>,
}

impl Default for RrfFuser {
    fn default() -> Self {
        let config = FusionConfig::default();
        RrfFuser {
            smoothing_constant: config.smoothing_constant,
            weights: config.backend_weights,
        }
    }
}

impl RrfFuser {
    /// Create a fuser, validating the weights.
    ///
    /// # Errors
    ///
    /// `Configuration` if any weight is negative or they do not sum to
    /// 1.0 within ±0.01.
    pub fn new(smoothing_constant: u32, weights: BTreeMap<String, f32>) -> RaglineResult<Self> {
        validate_weights(weights.iter().map(|(k, w)| (k.as_str(), *w)))?;
        Ok(RrfFuser {
            smoothing_constant,
            weights,
        })
    }

    /// Create a fuser from the `[fusion]` config section
    pub fn from_config(config: &FusionConfig) -> RaglineResult<Self> {
        Self::new(config.smoothing_constant, config.backend_weights.clone())
    }

    /// Smoothing constant
    pub fn smoothing_constant(&self) -> u32 {
        self.smoothing_constant
    }

    /// Current weights
    pub fn weights(&self) -> &BTreeMap<String, f32> {
        &self.weights
    }

    /// Replace the weights. On error the old weights stay in place.
    pub fn set_weights(&mut self, weights: BTreeMap<String, f32>) -> RaglineResult<()> {
        validate_weights(weights.iter().map(|(k, w)| (k.as_str(), *w)))?;
        self.weights = weights;
        Ok(())
    }

    /// N-way fusion with explicit per-list weights and this fuser's constant
    pub fn fuse_weighted(
        &self,
        lists: Vec<(Vec<SearchResult>, f32)>,
        top_k: usize,
    ) -> RaglineResult<FusedResult> {
        weighted_rrf_fuse(lists, self.smoothing_constant, top_k)
    }
}

impl Fuser for RrfFuser {
    fn fuse(&self, results: Vec<(String, Vec<SearchResult>)>, top_k: usize) -> FusedResult {
        let mut acc: HashMap<String, RankedResult> = HashMap::new();
        for (backend, hits) in results {
            let Some(&weight) = self.weights.get(&backend) else {
                warn!(
                    target: "ragline::fuser",
                    backend = %backend,
                    "No fusion weight configured, results ignored"
                );
                continue;
            };
            accumulate(&mut acc, &backend, hits, weight, self.smoothing_constant);
        }
        finish(acc, top_k)
    }

    fn name(&self) -> &str {
        "rrf"
    }
}

// ============================================================================
// Weighted RRF (N-way)
// ============================================================================

/// Fuse N ranked lists with per-list weights.
///
/// Weights follow the same validation as backend weights. Lists are named
/// `list0`, `list1`, ... in `backend_ranks`.
pub fn weighted_rrf_fuse(
    lists: Vec<(Vec<SearchResult>, f32)>,
    smoothing_constant: u32,
    top_k: usize,
) -> RaglineResult<FusedResult> {
    let names: Vec<String> = (0..lists.len()).map(|i| format!("list{}", i)).collect();
    validate_weights(names.iter().map(String::as_str).zip(lists.iter().map(|(_, w)| *w)))?;

    let mut acc: HashMap<String, RankedResult> = HashMap::new();
    for (name, (hits, weight)) in names.iter().zip(lists) {
        accumulate(&mut acc, name, hits, weight, smoothing_constant);
    }
    Ok(finish(acc, top_k))
}

// ============================================================================
// Tests
// ============================================================================
