//! BM25 scoring with metadata field boosting
//!
//! For each query term t:
//! score += IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl/avgdl))
//!
//! Where:
//! - tf = term frequency in document
//! - dl = document length
//! - avgdl = average document length
//! - k1 = term saturation parameter (default 1.2)
//! - b = length normalization parameter (default 0.75)
//!
//! After the body score, each boosted metadata field (section title,
//! caption) containing a query term multiplies the score by `field_boost`.

use crate::tokenizer::tokenize;
use ragline_core::Metadata;

/// Metadata fields whose text boosts a matching document
pub const DEFAULT_BOOSTED_FIELDS: &[&str] = &["section_title", "caption"];

/// BM25 scorer
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    /// k1 parameter: term frequency saturation (default 1.2)
    k1: f32,
    /// b parameter: length normalization (default 0.75)
    b: f32,
    /// Multiplier per boosted field hit (default 1.2)
    field_boost: f32,
    /// Metadata keys checked for boosting
    boosted_fields: Vec<String>,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Bm25Scorer {
            k1: 1.2,
            b: 0.75,
            field_boost: 1.2,
            boosted_fields: DEFAULT_BOOSTED_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Bm25Scorer {
    /// Create a scorer with custom parameters
    pub fn new(k1: f32, b: f32) -> Self {
        Bm25Scorer {
            k1,
            b,
            ..Self::default()
        }
    }

    /// Builder: set field boost factor (1.0 disables boosting)
    pub fn with_field_boost(mut self, factor: f32) -> Self {
        self.field_boost = factor;
        self
    }

    /// Builder: set boosted metadata fields
    pub fn with_boosted_fields(mut self, fields: &[&str]) -> Self {
        self.boosted_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Score contribution of one term in one document
    pub fn term_score(&self, idf: f32, tf: u32, doc_len: u32, avg_doc_len: f32) -> f32 {
        if tf == 0 {
            return 0.0;
        }
        let tf = tf as f32;
        let avg_len = avg_doc_len.max(1.0);
        let tf_component = (tf * (self.k1 + 1.0))
            / (tf + self.k1 * (1.0 - self.b + self.b * doc_len as f32 / avg_len));
        idf * tf_component
    }

    /// Multiplier for boosted metadata fields that contain any query term
    pub fn field_multiplier(&self, query_terms: &[String], metadata: &Metadata) -> f32 {
        let mut multiplier = 1.0;
        for field in &self.boosted_fields {
            let Some(text) = metadata.get(field).and_then(|v| v.as_str()) else {
                continue;
            };
            let field_terms = tokenize(text);
            if query_terms.iter().any(|q| field_terms.contains(q)) {
                multiplier *= self.field_boost;
            }
        }
        multiplier
    }

    /// Scorer name for logs
    pub fn name(&self) -> &str {
        "bm25"
    }
}
