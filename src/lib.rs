//! Ragline - hybrid retrieval for question answering
//!
//! Ragline combines a lexical (BM25) backend and a vector backend, fuses
//! their rankings with weighted Reciprocal Rank Fusion, enriches matched
//! chunks with structural context under a token budget, and widens the
//! search adaptively until the confidence/cost trade-off is met.
//!
//! # Quick Start
//!
//! ```
//! use ragline::{Ragline, RaglineConfig, Record};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let rag = Ragline::from_config(RaglineConfig::default()).unwrap();
//! rag.index(&[
//!     Record::new("p1", "Revenue grew 12% year over year.").with_meta("page", 1),
//!     Record::new("p2", "Headcount was flat.").with_meta("page", 1),
//! ])
//! .await
//! .unwrap();
//!
//! let outcome = rag.ask("How much did revenue grow?").await.unwrap();
//! assert!(outcome.iterations >= 1);
//! assert_eq!(outcome.context[0].result.id, "p1");
//! # });
//! ```
//!
//! # Architecture
//!
//! ```text
//! Ragline ── AdaptiveRetriever ── HybridSearch ──┬── LexicalBackend
//!                │                    │          └── VectorBackend ── Embedder
//!                │                    ├── RrfFuser
//!                │                    ├── Enricher / StructureIndex
//!                │                    └── QueryCache
//!                ├── ConfidenceEstimator
//!                ├── CostLedger
//!                └── Generator
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub use ragline_core::{
    estimate_tokens, Query, RaglineConfig, RaglineError, RaglineResult, RankedResult, Record,
    SearchResult,
};
pub use ragline_intelligence::{
    AdaptiveRetriever, ApiGenerator, Confidence, ConfidenceEstimator, CostBreakdown, CostLedger,
    EnrichedResult, ExtractiveGenerator, GenerateError, Generation, Generator, HeuristicEstimator,
    HybridMetrics, HybridResponse, HybridSearch, OperationKind, RetrievalOutcome, Termination,
    TraceEntry,
};
pub use ragline_search::{
    Embedder, HashingEmbedder, IpcEmbedder, LexicalBackend, SearchBackend, VectorBackend,
};

/// Fully wired retrieval pipeline
///
/// Owns the orchestrator, the adaptive controller and a ledger shared by
/// every `ask`. Safe to share across tasks behind an `Arc`.
pub struct Ragline {
    config: RaglineConfig,
    hybrid: Arc<HybridSearch>,
    retriever: AdaptiveRetriever,
}

impl Ragline {
    /// Open a working directory: load `ragline.toml`, writing the default
    /// template on first open, then build the pipeline.
    ///
    /// Must be called inside a tokio runtime when an IPC embedder is
    /// configured.
    pub fn open<P: AsRef<Path>>(dir: P) -> RaglineResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Self::from_config(RaglineConfig::load(dir)?)
    }

    /// Build the pipeline from a configuration.
    ///
    /// Uses the IPC embedder when `[embedder].command` is set, otherwise
    /// the hashing embedder. Uses `ApiGenerator` when `[model]` is set,
    /// otherwise `ExtractiveGenerator`.
    pub fn from_config(config: RaglineConfig) -> RaglineResult<Self> {
        let generator: Arc<dyn Generator> = match &config.model {
            Some(model) => Arc::new(ApiGenerator::from_config(model)),
            None => Arc::new(ExtractiveGenerator),
        };
        Self::with_generator(config, generator)
    }

    /// Build the pipeline with a caller-supplied generator
    pub fn with_generator(
        config: RaglineConfig,
        generator: Arc<dyn Generator>,
    ) -> RaglineResult<Self> {
        config.validate()?;

        let embedder: Arc<dyn Embedder> = match &config.embedder.command {
            Some(command) => Arc::new(
                IpcEmbedder::spawn(command, config.embedder.model.clone(), config.embedder.dimension)
                    .map_err(RaglineError::from)?,
            ),
            None => Arc::new(HashingEmbedder::new(config.embedder.dimension)),
        };
        let backends: Vec<Arc<dyn SearchBackend>> = vec![
            Arc::new(LexicalBackend::new()),
            Arc::new(VectorBackend::new(embedder)),
        ];
        let hybrid = Arc::new(HybridSearch::from_config(backends, &config)?);

        let estimator = Arc::new(HeuristicEstimator::new(
            config.adaptive.confidence_threshold,
            config.fusion.smoothing_constant,
        ));
        let ledger = Arc::new(CostLedger::new(config.cost.usd_per_1k_tokens));
        let retriever = AdaptiveRetriever::new(
            Arc::clone(&hybrid),
            estimator,
            generator,
            config.adaptive.clone(),
        )?
        .with_ledger(ledger);

        tracing::debug!(
            target: "ragline",
            backends = ?hybrid.backend_names(),
            "Pipeline ready"
        );

        Ok(Ragline {
            config,
            hybrid,
            retriever,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RaglineConfig {
        &self.config
    }

    /// The orchestrator, for direct searches and metrics
    pub fn hybrid(&self) -> &Arc<HybridSearch> {
        &self.hybrid
    }

    /// Ledger accumulating the cost of every `ask`
    pub fn ledger(&self) -> &Arc<CostLedger> {
        self.retriever.ledger()
    }

    /// Index records into every backend. Clears the query cache.
    pub async fn index(&self, records: &[Record]) -> RaglineResult<()> {
        self.hybrid.index(records).await
    }

    /// One orchestrated search, no adaptive loop and no generation
    pub async fn search(&self, query: &Query) -> RaglineResult<HybridResponse> {
        self.hybrid.search(query).await
    }

    /// Answer a question with the adaptive loop
    pub async fn ask(&self, question: &str) -> RaglineResult<RetrievalOutcome> {
        self.ask_query(&Query::new(question, self.config.adaptive.initial_k))
            .await
    }

    /// Answer with filters or `min_score`; `top_k` is driven by the loop
    pub async fn ask_query(&self, query: &Query) -> RaglineResult<RetrievalOutcome> {
        self.retriever.retrieve(query).await
    }

    /// Change fusion weights at runtime. Clears the query cache.
    pub fn set_weights(&self, weights: BTreeMap<String, f32>) -> RaglineResult<()> {
        self.hybrid.set_weights(weights)
    }

    /// Orchestrator metrics snapshot
    pub fn metrics(&self) -> HybridMetrics {
        self.hybrid.metrics()
    }

    /// Close backends (and the embedding server, if any)
    pub async fn close(&self) -> RaglineResult<()> {
        self.hybrid.close().await
    }
}
