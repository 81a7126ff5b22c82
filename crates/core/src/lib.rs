//! Core types for Ragline
//!
//! This crate defines the foundational types shared by every layer:
//! - Record, Query: what gets indexed and what gets asked
//! - SearchResult, RankedResult: backend-native and fused ranking units
//! - Metadata filters applied by backends
//! - Approximate token estimation used for budgets and cost
//! - RaglineError: the error hierarchy
//! - RaglineConfig: `ragline.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod filter;
pub mod tokens;
pub mod types;

pub use config::{
    AdaptiveConfig, CacheConfig, CostConfig, EmbedderConfig, EnrichmentConfig, FusionConfig,
    ModelConfig, RaglineConfig, SearchConfig, CONFIG_FILE_NAME,
};
pub use error::{RaglineError, RaglineResult};
pub use filter::matches_filters;
pub use tokens::{estimate_tokens, estimate_tokens_all, CHARS_PER_TOKEN};
pub use types::{Filters, Metadata, Query, RankedResult, Record, SearchResult};
