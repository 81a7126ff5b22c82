//! Cost ledger
//!
//! Append-only log of token-consuming operations. Token counts come from
//! [`estimate_tokens`](ragline_core::estimate_tokens), a character-count
//! heuristic (about four characters per token). Totals are approximations
//! for budgeting, not billing-grade counts.
//!
//! Every `CostLedger` owns its entries; two ledgers never share state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ragline_core::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of operation a cost entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Context returned by one retrieval round
    Retrieval,
    /// One confidence estimate
    ConfidenceCheck,
    /// Final answer generation
    Generation,
}

impl OperationKind {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Retrieval => "retrieval",
            OperationKind::ConfidenceCheck => "confidence_check",
            OperationKind::Generation => "generation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// Operation kind
    pub kind: OperationKind,
    /// Approximate tokens
    pub tokens: usize,
    /// Free-form context (iteration, k, model, ...)
    pub metadata: Metadata,
    /// When the entry was appended
    pub recorded_at: DateTime<Utc>,
}

/// Totals per operation kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Tokens per kind
    pub tokens_by_kind: BTreeMap<OperationKind, usize>,
    /// Entries per kind
    pub calls_by_kind: BTreeMap<OperationKind, usize>,
    /// Sum over all kinds
    pub total_tokens: usize,
    /// `total_tokens` converted at the ledger's rate
    pub total_cost_usd: f64,
}

impl CostBreakdown {
    /// Tokens recorded for one kind
    pub fn tokens(&self, kind: OperationKind) -> usize {
        self.tokens_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Append-only cost log
#[derive(Debug)]
pub struct CostLedger {
    entries: Mutex<Vec<CostEntry>>,
    usd_per_1k_tokens: f64,
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new(ragline_core::CostConfig::default().usd_per_1k_tokens)
    }
}

impl CostLedger {
    /// Create an empty ledger with a token→cost rate
    pub fn new(usd_per_1k_tokens: f64) -> Self {
        CostLedger {
            entries: Mutex::new(Vec::new()),
            usd_per_1k_tokens,
        }
    }

    /// Rate used by [`total_cost`](Self::total_cost)
    pub fn rate(&self) -> f64 {
        self.usd_per_1k_tokens
    }

    /// Append an event
    pub fn record(&self, kind: OperationKind, tokens: usize, metadata: Metadata) {
        self.entries.lock().push(CostEntry {
            kind,
            tokens,
            metadata,
            recorded_at: Utc::now(),
        });
    }

    /// Running total of approximate tokens
    pub fn total_tokens(&self) -> usize {
        self.entries.lock().iter().map(|e| e.tokens).sum()
    }

    /// Running total cost at the configured rate
    pub fn total_cost(&self) -> f64 {
        self.cost_of(self.total_tokens())
    }

    fn cost_of(&self, tokens: usize) -> f64 {
        tokens as f64 / 1000.0 * self.usd_per_1k_tokens
    }

    /// Whether the running total reached `ceiling_tokens`
    pub fn exceeds(&self, ceiling_tokens: usize) -> bool {
        self.total_tokens() >= ceiling_tokens
    }

    /// Per-kind totals
    pub fn breakdown(&self) -> CostBreakdown {
        let entries = self.entries.lock();
        let mut out = CostBreakdown::default();
        for e in entries.iter() {
            *out.tokens_by_kind.entry(e.kind).or_insert(0) += e.tokens;
            *out.calls_by_kind.entry(e.kind).or_insert(0) += 1;
            out.total_tokens += e.tokens;
        }
        out.total_cost_usd = self.cost_of(out.total_tokens);
        out
    }

    /// Snapshot of all entries in append order
    pub fn entries(&self) -> Vec<CostEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries (between independent benchmark runs)
    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}
