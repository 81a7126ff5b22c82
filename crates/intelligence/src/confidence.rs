//! Confidence estimation: "is this result set enough to answer?"
//!
//! Callers only see the [`ConfidenceEstimator`] contract, so the heuristic
//! here can be swapped for a learned model without touching the adaptive
//! loop.
//!
//! `HeuristicEstimator` blends three signals, each in `[0, 1]`:
//! - term coverage: share of distinct query terms found in the retrieved text
//! - score magnitude: top fused score relative to the best attainable RRF
//!   score `1 / (c + 1)` (a document ranked first by every backend)
//! - fill ratio: results returned relative to `top_k`

use crate::enrich::EnrichedResult;
use async_trait::async_trait;
use ragline_core::{estimate_tokens, Query, RaglineError};
use ragline_search::tokenize_unique;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// One confidence reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Score in `[0, 1]`
    pub score: f32,
    /// Whether `score` met the estimator's threshold
    pub is_sufficient: bool,
    /// The reading is a conservative default, not a real estimate
    pub degraded: bool,
    /// Approximate tokens the check consumed
    pub tokens: usize,
}

impl Confidence {
    /// Conservative reading used when no real estimate is possible
    pub fn degraded(tokens: usize) -> Self {
        Confidence {
            score: 0.0,
            is_sufficient: false,
            degraded: true,
            tokens,
        }
    }
}

/// Scores a query/result-set pair
#[async_trait]
pub trait ConfidenceEstimator: Send + Sync {
    /// Name for debugging and logging
    fn name(&self) -> &str;

    /// Estimate confidence that `results` answer `query`
    async fn estimate(&self, query: &Query, results: &[EnrichedResult]) -> Confidence;
}

// ============================================================================
// HeuristicEstimator
// ============================================================================

const COVERAGE_WEIGHT: f32 = 0.5;
const MAGNITUDE_WEIGHT: f32 = 0.3;
const FILL_WEIGHT: f32 = 0.2;

/// Cheap lexical/score heuristic
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    threshold: f32,
    smoothing_constant: u32,
}

impl HeuristicEstimator {
    /// Create an estimator with the sufficiency threshold and the RRF
    /// smoothing constant used by the fuser
    pub fn new(threshold: f32, smoothing_constant: u32) -> Self {
        HeuristicEstimator {
            threshold,
            smoothing_constant,
        }
    }

    /// Sufficiency threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn best_attainable(&self) -> f32 {
        1.0 / (self.smoothing_constant as f32 + 1.0)
    }

    /// Synchronous scoring, shared by the trait impl and tests
    pub fn score(&self, query: &Query, results: &[EnrichedResult]) -> Confidence {
        let tokens = estimate_tokens(&query.text)
            + results.iter().map(|r| r.enriched_tokens).sum::<usize>();

        let terms = tokenize_unique(&query.text);
        if terms.is_empty() || results.is_empty() {
            let reason = if terms.is_empty() {
                "query has no searchable terms"
            } else {
                "no results to assess"
            };
            warn!(
                target: "ragline::confidence",
                error = %RaglineError::EstimationDegraded(reason.to_string()),
                "Falling back to insufficient"
            );
            return Confidence::degraded(tokens);
        }

        let seen: HashSet<String> = results
            .iter()
            .flat_map(|r| tokenize_unique(&r.result.content))
            .collect();
        let covered = terms.iter().filter(|t| seen.contains(*t)).count();
        let coverage = covered as f32 / terms.len() as f32;

        let top = results
            .iter()
            .map(|r| r.result.fused_score)
            .fold(0.0f32, f32::max);
        let magnitude = (top / self.best_attainable()).clamp(0.0, 1.0);

        let fill = if query.top_k == 0 {
            1.0
        } else {
            (results.len() as f32 / query.top_k as f32).min(1.0)
        };

        let score = (COVERAGE_WEIGHT * coverage + MAGNITUDE_WEIGHT * magnitude + FILL_WEIGHT * fill)
            .clamp(0.0, 1.0);

        Confidence {
            score,
            is_sufficient: score >= self.threshold,
            degraded: false,
            tokens,
        }
    }
}

#[async_trait]
impl ConfidenceEstimator for HeuristicEstimator {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn estimate(&self, query: &Query, results: &[EnrichedResult]) -> Confidence {
        self.score(query, results)
    }
}
