//! Adaptive retrieval controller
//!
//! Drives [`HybridSearch`] with a growing `k` until the confidence
//! estimator is satisfied or a cost/size/iteration limit is hit, then hands
//! the final context to a [`Generator`].
//!
//! # State machine
//!
//! ```text
//!   k = initial_k, iteration = 0
//!        │
//!        ▼
//!   ┌─ search(k) ─ estimate ─ iteration += 1 ─┐
//!   │                                          │
//!   │  sufficient            → Generate        │
//!   │  ledger ≥ ceiling      → CostLimited     │
//!   │  k ≥ max_k             → KLimited        │
//!   │  iteration ≥ max_iter  → IterationLimited│
//!   │  else k = min(k + step, max_k) ──────────┘
//!   ▼
//!  generate(query, context) → RetrievalOutcome
//! ```
//!
//! Iterations are strictly sequential. Once a terminal state is reached no
//! further backend call is made.

use crate::confidence::{Confidence, ConfidenceEstimator};
use crate::enrich::EnrichedResult;
use crate::generate::Generator;
use crate::hybrid::HybridSearch;
use crate::ledger::{CostBreakdown, CostLedger, OperationKind};
use chrono::{DateTime, Utc};
use ragline_core::{AdaptiveConfig, Metadata, Query, RaglineError, RaglineResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Trace action for a step that widened the search
pub const ACTION_EXPAND: &str = "expand";

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Confidence met the threshold
    Generate,
    /// The ledger reached the token ceiling
    CostLimited,
    /// `k` reached `max_k`
    KLimited,
    /// The iteration cap was reached
    IterationLimited,
}

impl Termination {
    /// Action recorded in the trace for the terminal step
    pub fn action(&self) -> &'static str {
        match self {
            Termination::Generate => "generate",
            Termination::CostLimited => "fallback",
            Termination::KLimited | Termination::IterationLimited => "exhausted",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// One loop step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// 1-based iteration number
    pub iteration: usize,
    /// `k` used for this step
    pub k: usize,
    /// Confidence score of this step
    pub confidence: f32,
    /// `expand`, `generate`, `fallback` or `exhausted`
    pub action: String,
    /// When the step finished
    pub timestamp: DateTime<Utc>,
}

/// Wall time spent per phase, summed over iterations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimingBreakdown {
    /// Orchestrator calls
    pub retrieval: Duration,
    /// Confidence estimates
    pub confidence: Duration,
    /// Final generation
    pub generation: Duration,
    /// Whole run
    pub total: Duration,
}

/// Result bundle of one adaptive run
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    /// Generated answer
    pub answer: String,
    /// Context handed to the generator
    pub context: Vec<EnrichedResult>,
    /// `k` of the final step
    pub final_k: usize,
    /// Steps taken
    pub iterations: usize,
    /// Confidence of the final step
    pub confidence: Confidence,
    /// Why the loop stopped
    pub termination: Termination,
    /// Tokens and cost of this run
    pub cost: CostBreakdown,
    /// Time per phase
    pub timing: TimingBreakdown,
    /// Step log
    pub trace: Vec<TraceEntry>,
}

impl RetrievalOutcome {
    /// Action of the last trace entry
    pub fn final_action(&self) -> &str {
        self.termination.action()
    }
}

/// Confidence/cost governed retrieval loop
pub struct AdaptiveRetriever {
    search: Arc<HybridSearch>,
    estimator: Arc<dyn ConfidenceEstimator>,
    generator: Arc<dyn Generator>,
    config: AdaptiveConfig,
    ledger: Arc<CostLedger>,
}

impl AdaptiveRetriever {
    /// Create a controller.
    ///
    /// # Errors
    ///
    /// `Configuration` if the adaptive config is invalid.
    pub fn new(
        search: Arc<HybridSearch>,
        estimator: Arc<dyn ConfidenceEstimator>,
        generator: Arc<dyn Generator>,
        config: AdaptiveConfig,
    ) -> RaglineResult<Self> {
        config.validate()?;
        Ok(AdaptiveRetriever {
            search,
            estimator,
            generator,
            config,
            ledger: Arc::new(CostLedger::default()),
        })
    }

    /// Builder: share a ledger across runs (every run also keeps its own)
    pub fn with_ledger(mut self, ledger: Arc<CostLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Shared ledger accumulating every run
    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    /// Loop settings
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    fn record(&self, run: &CostLedger, kind: OperationKind, tokens: usize, meta: Metadata) {
        run.record(kind, tokens, meta.clone());
        self.ledger.record(kind, tokens, meta);
    }

    /// Run the loop for `query`. `query.top_k` is replaced by the loop's `k`;
    /// filters and `min_score` are kept.
    ///
    /// # Errors
    ///
    /// `Generation` if the generator fails; orchestrator errors (closed)
    /// pass through. Backend failures never surface here.
    pub async fn retrieve(&self, query: &Query) -> RaglineResult<RetrievalOutcome> {
        let run_start = Instant::now();
        let run_ledger = CostLedger::new(self.ledger.rate());
        let mut timing = TimingBreakdown::default();
        let mut trace = Vec::new();
        let mut k = self.config.initial_k;
        let mut iteration = 0usize;

        let (termination, context, confidence) = loop {
            let step_query = query.with_top_k(k);

            let t = Instant::now();
            let response = self.search.search(&step_query).await?;
            timing.retrieval += t.elapsed();
            self.record(
                &run_ledger,
                OperationKind::Retrieval,
                response.final_tokens,
                step_meta(iteration + 1, k),
            );

            let t = Instant::now();
            let confidence = self.estimator.estimate(&step_query, &response.results).await;
            timing.confidence += t.elapsed();
            self.record(
                &run_ledger,
                OperationKind::ConfidenceCheck,
                confidence.tokens,
                step_meta(iteration + 1, k),
            );

            iteration += 1;

            let termination = if confidence.is_sufficient {
                Some(Termination::Generate)
            } else if run_ledger.exceeds(self.config.cost_ceiling_tokens) {
                Some(Termination::CostLimited)
            } else if k >= self.config.max_k {
                Some(Termination::KLimited)
            } else if iteration >= self.config.max_iterations {
                Some(Termination::IterationLimited)
            } else {
                None
            };

            trace.push(TraceEntry {
                iteration,
                k,
                confidence: confidence.score,
                action: termination
                    .map(|t| t.action())
                    .unwrap_or(ACTION_EXPAND)
                    .to_string(),
                timestamp: Utc::now(),
            });

            match termination {
                Some(t) => break (t, response.results, confidence),
                None => {
                    let next = (k + self.config.expansion_step).min(self.config.max_k);
                    debug!(
                        target: "ragline::adaptive",
                        iteration,
                        confidence = confidence.score,
                        from = k,
                        to = next,
                        "Confidence insufficient, expanding"
                    );
                    k = next;
                }
            }
        };

        let t = Instant::now();
        let generation = self
            .generator
            .generate(&query.text, &context)
            .await
            .map_err(RaglineError::from)?;
        timing.generation = t.elapsed();

        let mut meta = step_meta(iteration, k);
        meta.insert("generator".into(), self.generator.name().into());
        self.record(
            &run_ledger,
            OperationKind::Generation,
            generation.tokens_consumed,
            meta,
        );
        timing.total = run_start.elapsed();

        let cost = run_ledger.breakdown();
        info!(
            target: "ragline::adaptive",
            iterations = iteration,
            final_k = k,
            confidence = confidence.score,
            termination = %termination,
            tokens = cost.total_tokens,
            "Adaptive retrieval complete"
        );

        Ok(RetrievalOutcome {
            answer: generation.answer,
            context,
            final_k: k,
            iterations: iteration,
            confidence,
            termination,
            cost,
            timing,
            trace,
        })
    }
}

fn step_meta(iteration: usize, k: usize) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("iteration".into(), iteration.into());
    meta.insert("k".into(), k.into());
    meta
}
