//! Ragline configuration via `ragline.toml`
//!
//! Every field has a serde default, so an empty file is a valid config.
//! On first `load`, a commented default `ragline.toml` is written to the
//! directory. To change settings, edit the file and reopen.

use crate::error::{RaglineError, RaglineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "ragline.toml";

/// Allowed deviation of the backend weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f32 = 0.01;

// ============================================================================
// Fusion
// ============================================================================

/// Reciprocal rank fusion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusionConfig {
    /// The `c` in `weight / (c + rank)` (default 60)
    #[serde(default = "default_smoothing_constant")]
    pub smoothing_constant: u32,
    /// Per-backend weights, must sum to 1.0 (±0.01)
    #[serde(default = "default_backend_weights")]
    pub backend_weights: BTreeMap<String, f32>,
}

fn default_smoothing_constant() -> u32 {
    60
}

fn default_backend_weights() -> BTreeMap<String, f32> {
    BTreeMap::from([("lexical".to_string(), 0.6), ("vector".to_string(), 0.4)])
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            smoothing_constant: default_smoothing_constant(),
            backend_weights: default_backend_weights(),
        }
    }
}

impl FusionConfig {
    /// Validate weights: non-empty, non-negative, summing to 1.0 (±0.01)
    pub fn validate(&self) -> RaglineResult<()> {
        validate_weights(self.backend_weights.iter().map(|(k, w)| (k.as_str(), *w)))
    }
}

/// Shared weight validation for named and positional weight sets
pub fn validate_weights<'a>(weights: impl IntoIterator<Item = (&'a str, f32)>) -> RaglineResult<()> {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for (name, weight) in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(RaglineError::config(format!(
                "backend weight for '{}' must be a non-negative number, got {}",
                name, weight
            )));
        }
        sum += weight;
        count += 1;
    }
    if count == 0 {
        return Err(RaglineError::config("at least one backend weight is required"));
    }
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(RaglineError::config(format!(
            "backend weights must sum to 1.0 (±{}), got {:.4}",
            WEIGHT_SUM_TOLERANCE, sum
        )));
    }
    Ok(())
}

// ============================================================================
// Enrichment
// ============================================================================

/// Context enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentConfig {
    /// Attach parent heading and child paragraphs to section chunks
    #[serde(default = "default_true")]
    pub enrich_sections: bool,
    /// Attach caption and surrounding paragraphs to table chunks
    #[serde(default = "default_true")]
    pub enrich_tables: bool,
    /// Attach neighbouring paragraphs to paragraph chunks
    #[serde(default = "default_true")]
    pub enrich_paragraphs: bool,
    /// Neighbours on each side for full paragraph enrichment
    #[serde(default = "default_paragraph_radius")]
    pub paragraph_radius: usize,
    /// Allowed growth of the merged set's estimated tokens
    #[serde(default = "default_max_token_increase_ratio")]
    pub max_token_increase_ratio: f64,
}

fn default_true() -> bool {
    true
}

fn default_paragraph_radius() -> usize {
    1
}

fn default_max_token_increase_ratio() -> f64 {
    0.3
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enrich_sections: true,
            enrich_tables: true,
            enrich_paragraphs: true,
            paragraph_radius: default_paragraph_radius(),
            max_token_increase_ratio: default_max_token_increase_ratio(),
        }
    }
}

impl EnrichmentConfig {
    /// Validate the growth ratio
    pub fn validate(&self) -> RaglineResult<()> {
        if !self.max_token_increase_ratio.is_finite() || self.max_token_increase_ratio < 0.0 {
            return Err(RaglineError::config(format!(
                "max_token_increase_ratio must be >= 0, got {}",
                self.max_token_increase_ratio
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Adaptive retrieval
// ============================================================================

/// Adaptive retrieval loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveConfig {
    /// Result width of the first round
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,
    /// Widest result set the loop may request
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    /// Minimum confidence to accept a result set
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Per-query estimated token ceiling
    #[serde(default = "default_cost_ceiling_tokens")]
    pub cost_ceiling_tokens: usize,
    /// Increase of k per expansion
    #[serde(default = "default_expansion_step")]
    pub expansion_step: usize,
    /// Hard cap on rounds, independent of k
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_initial_k() -> usize {
    2
}

fn default_max_k() -> usize {
    6
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_cost_ceiling_tokens() -> usize {
    8000
}

fn default_expansion_step() -> usize {
    2
}

fn default_max_iterations() -> usize {
    5
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_k: default_initial_k(),
            max_k: default_max_k(),
            confidence_threshold: default_confidence_threshold(),
            cost_ceiling_tokens: default_cost_ceiling_tokens(),
            expansion_step: default_expansion_step(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl AdaptiveConfig {
    /// Validate k ordering and loop bounds
    pub fn validate(&self) -> RaglineResult<()> {
        if self.initial_k == 0 {
            return Err(RaglineError::config("initial_k must be at least 1"));
        }
        if self.initial_k > self.max_k {
            return Err(RaglineError::config(format!(
                "initial_k ({}) must not exceed max_k ({})",
                self.initial_k, self.max_k
            )));
        }
        if self.expansion_step == 0 {
            return Err(RaglineError::config("expansion_step must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(RaglineError::config("max_iterations must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RaglineError::config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Cache / search / cost
// ============================================================================

/// Query result cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Enable the cache
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Per-backend call timeout in milliseconds
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    /// Retries per backend call before it contributes zero results
    #[serde(default = "default_backend_retries")]
    pub backend_retries: u32,
    /// Each backend is asked for `top_k * candidate_multiplier` candidates
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Run context enrichment on merged results
    #[serde(default = "default_true")]
    pub enrich: bool,
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

fn default_backend_retries() -> u32 {
    1
}

fn default_candidate_multiplier() -> usize {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: default_backend_timeout_ms(),
            backend_retries: default_backend_retries(),
            candidate_multiplier: default_candidate_multiplier(),
            enrich: true,
        }
    }
}

/// Token to cost conversion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostConfig {
    /// Cost in USD per 1000 estimated tokens
    #[serde(default = "default_usd_per_1k_tokens")]
    pub usd_per_1k_tokens: f64,
}

fn default_usd_per_1k_tokens() -> f64 {
    0.002
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            usd_per_1k_tokens: default_usd_per_1k_tokens(),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Embedder settings
///
/// Without `command`, a local hashing embedder of `dimension` is used.
/// With `command`, Ragline spawns an embedding server speaking line-delimited
/// JSON on stdin/stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedderConfig {
    /// Embedding dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Embedding server command line, e.g. `["python3", "embedding_server.py"]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Model name sent with each request
    #[serde(default = "default_embed_model")]
    pub model: String,
}

fn default_dimension() -> usize {
    384
}

fn default_embed_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            command: None,
            model: default_embed_model(),
        }
    }
}

/// Configuration for an external generation endpoint.
///
/// Persisted in `ragline.toml` under the `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// OpenAI-compatible API endpoint (e.g. "http://localhost:11434/v1")
    pub endpoint: String,
    /// Model name (e.g. "qwen3:1.7b")
    pub model: String,
    /// Optional API key for authenticated endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in milliseconds (default: 30000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sampling temperature (default: 0.2)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum answer tokens (default: 800)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    800
}

// ============================================================================
// RaglineConfig
// ============================================================================

/// Ragline configuration loaded from `ragline.toml`.
///
/// # Example
///
/// ```toml
/// [fusion]
/// smoothing_constant = 60
/// backend_weights = { lexical = 0.6, vector = 0.4 }
///
/// [adaptive]
/// initial_k = 2
/// max_k = 6
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RaglineConfig {
    /// Rank fusion
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Context enrichment
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Adaptive loop
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    /// Query cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Orchestrator
    #[serde(default)]
    pub search: SearchConfig,
    /// Cost conversion
    #[serde(default)]
    pub cost: CostConfig,
    /// Embedder
    #[serde(default)]
    pub embedder: EmbedderConfig,
    /// Optional generation endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
}

impl RaglineConfig {
    /// Validate every section. Fails fast on the first problem.
    pub fn validate(&self) -> RaglineResult<()> {
        self.fusion.validate()?;
        self.enrichment.validate()?;
        self.adaptive.validate()?;
        if self.search.candidate_multiplier == 0 {
            return Err(RaglineError::config("candidate_multiplier must be at least 1"));
        }
        if self.embedder.dimension == 0 {
            return Err(RaglineError::config("embedder dimension must be at least 1"));
        }
        if self.cost.usd_per_1k_tokens < 0.0 {
            return Err(RaglineError::config("usd_per_1k_tokens must be >= 0"));
        }
        Ok(())
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(content: &str) -> RaglineResult<Self> {
        let config: RaglineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Ragline configuration

# Reciprocal rank fusion: score = sum(weight / (smoothing_constant + rank))
[fusion]
smoothing_constant = 60
# Must sum to 1.0 (±0.01). Keys are backend names.
backend_weights = { lexical = 0.6, vector = 0.4 }

# Structural context attached to matched chunks
[enrichment]
enrich_sections = true
enrich_tables = true
enrich_paragraphs = true
paragraph_radius = 1
# Enriched set may grow by at most this fraction of its estimated tokens
max_token_increase_ratio = 0.3

# Adaptive retrieval loop
[adaptive]
initial_k = 2
max_k = 6
confidence_threshold = 0.7
cost_ceiling_tokens = 8000
expansion_step = 2
max_iterations = 5

[cache]
enabled = true
ttl_secs = 300

[search]
backend_timeout_ms = 5000
backend_retries = 1
candidate_multiplier = 2
enrich = true

[cost]
usd_per_1k_tokens = 0.002

# Without `command`, a local hashing embedder is used.
[embedder]
dimension = 384
model = "all-MiniLM-L6-v2"
# command = ["python3", "embedding_server.py"]

# Generation endpoint. Uncomment and configure to enable answers.
# [model]
# endpoint = "http://localhost:11434/v1"
# model = "qwen3:1.7b"
# api_key = "your-api-key"      # optional
# timeout_ms = 30000             # optional, default 30000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> RaglineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            RaglineError::Configuration(msg) => RaglineError::Configuration(format!(
                "invalid config file '{}': {}",
                path.display(),
                msg
            )),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> RaglineResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> RaglineResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RaglineError::Serialization(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `ragline.toml` from a directory, creating the default first.
    pub fn load(dir: &Path) -> RaglineResult<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        Self::write_default_if_missing(&path)?;
        Self::from_file(&path)
    }
}
