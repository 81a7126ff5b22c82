//! Context enrichment under a token budget
//!
//! Matched chunks are expanded with structurally related material (parent
//! heading, child paragraphs, table caption, neighbouring paragraphs) so the
//! generator sees more than an isolated fragment.
//!
//! # Budget
//!
//! `baseline` is the estimated token count of the merged set and
//! `max = floor(baseline * (1 + max_token_increase_ratio))`. Results are
//! walked in ranked order with `used = baseline`:
//!
//! 1. If `max - used` is below 10% of the chunk's own tokens, skip it
//! 2. Try each level of the ladder (`Full`, then `Medium`) and accept the
//!    first whose incremental cost fits `max - used`
//! 3. Otherwise keep the original chunk
//!
//! Later items are never retried, so the tail of a long list may go
//! unenriched once the budget is spent.

mod structure;

pub use structure::{ChunkKind, StructNode, StructureIndex};

use ragline_core::{estimate_tokens, EnrichmentConfig, RankedResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fraction of a chunk's own size that must remain in the budget before
/// enrichment is attempted
const MIN_REMAINING_FRACTION: f64 = 0.1;

const JOINER: &str = "\n\n";

// ============================================================================
// EnrichmentLevel
// ============================================================================

/// One rung of the enrichment ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentLevel {
    /// section: parent + up to 2 children; table: caption + both
    /// neighbours; paragraph: ±radius neighbours
    Full,
    /// section: parent only; table: caption only; paragraph: one neighbour
    Medium,
}

/// Levels in the order they are tried
pub const LADDER: [EnrichmentLevel; 2] = [EnrichmentLevel::Full, EnrichmentLevel::Medium];

/// Material gathered for one chunk, in document order around it
#[derive(Debug, Default)]
struct Expansion {
    before: Vec<String>,
    after: Vec<String>,
}

impl Expansion {
    fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    fn render(self, original: &str) -> String {
        let mut parts = self.before;
        parts.push(original.to_string());
        parts.extend(self.after);
        parts.join(JOINER)
    }
}

impl EnrichmentLevel {
    /// Gather material for a chunk. `None` when this level adds nothing.
    fn expand(
        &self,
        kind: ChunkKind,
        id: &str,
        index: &StructureIndex,
        config: &EnrichmentConfig,
    ) -> Option<Expansion> {
        let mut exp = Expansion::default();
        match (kind, self) {
            (ChunkKind::Section, level) => {
                exp.before.extend(index.parent_heading(id));
                if *level == EnrichmentLevel::Full {
                    exp.after.extend(
                        index
                            .child_paragraphs(id, 2)
                            .into_iter()
                            .map(|n| n.content.clone()),
                    );
                }
            }
            (ChunkKind::Table, level) => {
                let caption = index.get(id).and_then(|n| n.caption.clone());
                if *level == EnrichmentLevel::Full {
                    exp.before.extend(
                        index
                            .paragraphs_before(id, 1)
                            .into_iter()
                            .map(|n| n.content.clone()),
                    );
                    exp.before.extend(caption);
                    exp.after.extend(
                        index
                            .paragraphs_after(id, 1)
                            .into_iter()
                            .map(|n| n.content.clone()),
                    );
                } else {
                    exp.before.extend(caption);
                }
            }
            (ChunkKind::Paragraph, EnrichmentLevel::Full) => {
                let radius = config.paragraph_radius;
                exp.before.extend(
                    index
                        .paragraphs_before(id, radius)
                        .into_iter()
                        .map(|n| n.content.clone()),
                );
                exp.after.extend(
                    index
                        .paragraphs_after(id, radius)
                        .into_iter()
                        .map(|n| n.content.clone()),
                );
            }
            (ChunkKind::Paragraph, EnrichmentLevel::Medium) => {
                if let Some(prev) = index.paragraphs_before(id, 1).pop() {
                    exp.before.push(prev.content.clone());
                } else if let Some(next) = index.paragraphs_after(id, 1).into_iter().next() {
                    exp.after.push(next.content.clone());
                }
            }
        }
        (!exp.is_empty()).then_some(exp)
    }
}

// ============================================================================
// EnrichedResult
// ============================================================================

/// A ranked result tagged with how it was enriched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    /// The ranked result; `content` holds the enriched text when enriched
    #[serde(flatten)]
    pub result: RankedResult,
    /// Whether content was expanded
    pub enriched: bool,
    /// Structural type used to pick the expansion
    pub enrichment_kind: ChunkKind,
    /// Level accepted, if any
    pub enrichment_level: Option<EnrichmentLevel>,
    /// Estimated tokens before enrichment
    pub original_tokens: usize,
    /// Estimated tokens after enrichment
    pub enriched_tokens: usize,
}

impl EnrichedResult {
    /// Tag a result as not enriched
    pub fn plain(result: RankedResult) -> Self {
        let tokens = estimate_tokens(&result.content);
        EnrichedResult {
            enrichment_kind: ChunkKind::from_metadata(&result.metadata),
            result,
            enriched: false,
            enrichment_level: None,
            original_tokens: tokens,
            enriched_tokens: tokens,
        }
    }
}

/// Output of one enrichment pass
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutcome {
    /// Results in the original ranked order
    pub results: Vec<EnrichedResult>,
    /// Estimated tokens of the merged set before enrichment
    pub baseline_tokens: usize,
    /// Estimated tokens after enrichment
    pub final_tokens: usize,
    /// Budget ceiling
    pub max_tokens: usize,
}

impl EnrichmentOutcome {
    /// Number of results that were expanded
    pub fn enriched_count(&self) -> usize {
        self.results.iter().filter(|r| r.enriched).count()
    }
}

// ============================================================================
// Enricher
// ============================================================================

/// Budget-bounded context enrichment
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    config: EnrichmentConfig,
}

impl Enricher {
    /// Create an enricher
    pub fn new(config: EnrichmentConfig) -> Self {
        Enricher { config }
    }

    /// Current config
    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    fn kind_enabled(&self, kind: ChunkKind) -> bool {
        match kind {
            ChunkKind::Section => self.config.enrich_sections,
            ChunkKind::Table => self.config.enrich_tables,
            ChunkKind::Paragraph => self.config.enrich_paragraphs,
        }
    }

    /// Enrich a merged set against the full corpus structure
    pub fn enrich(&self, results: Vec<RankedResult>, index: &StructureIndex) -> EnrichmentOutcome {
        let baseline: usize = results.iter().map(|r| estimate_tokens(&r.content)).sum();
        let ratio = self.config.max_token_increase_ratio.max(0.0);
        let max_tokens = (baseline as f64 * (1.0 + ratio)).floor() as usize;
        let mut used = baseline;

        let mut out = Vec::with_capacity(results.len());
        for result in results {
            let mut tagged = EnrichedResult::plain(result);
            let kind = tagged.enrichment_kind;
            let own = tagged.original_tokens;
            let remaining = max_tokens.saturating_sub(used);

            if !self.kind_enabled(kind) || (remaining as f64) < own as f64 * MIN_REMAINING_FRACTION {
                out.push(tagged);
                continue;
            }

            for level in LADDER {
                let Some(expansion) = level.expand(kind, &tagged.result.id, index, &self.config)
                else {
                    continue;
                };
                let content = expansion.render(&tagged.result.content);
                let new_tokens = estimate_tokens(&content);
                let cost = new_tokens.saturating_sub(own);
                if cost <= remaining {
                    used += cost;
                    tagged.result.content = content;
                    tagged.enriched = true;
                    tagged.enrichment_level = Some(level);
                    tagged.enriched_tokens = new_tokens;
                    break;
                }
            }
            out.push(tagged);
        }

        let outcome = EnrichmentOutcome {
            results: out,
            baseline_tokens: baseline,
            final_tokens: used,
            max_tokens,
        };
        debug!(
            target: "ragline::enrich",
            baseline = outcome.baseline_tokens,
            used = outcome.final_tokens,
            max = outcome.max_tokens,
            enriched = outcome.enriched_count(),
            "Enrichment pass complete"
        );
        outcome
    }

    /// Tag results as not enriched without touching them
    pub fn passthrough(results: Vec<RankedResult>) -> EnrichmentOutcome {
        let results: Vec<EnrichedResult> = results.into_iter().map(EnrichedResult::plain).collect();
        let tokens = results.iter().map(|r| r.original_tokens).sum();
        EnrichmentOutcome {
            results,
            baseline_tokens: tokens,
            final_tokens: tokens,
            max_tokens: tokens,
        }
    }
}
