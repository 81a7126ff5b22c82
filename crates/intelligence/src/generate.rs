//! Generation collaborator
//!
//! The adaptive loop hands its final context to a [`Generator`] and records
//! the tokens it reports. Two implementations ship here:
//! - `ApiGenerator`: OpenAI-compatible chat completions (feature `api`)
//! - `ExtractiveGenerator`: returns the best context chunk verbatim, for
//!   offline use and tests

use crate::enrich::EnrichedResult;
use crate::llm_client::{self, LlmClientError};
use async_trait::async_trait;
use ragline_core::{estimate_tokens, ModelConfig, RaglineError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Answer produced by a generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Answer text
    pub answer: String,
    /// Approximate tokens consumed (prompt plus answer)
    pub tokens_consumed: usize,
}

/// Errors raised by generators
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The model endpoint failed
    #[error(transparent)]
    Client(#[from] LlmClientError),
    /// The blocking task running the request panicked or was cancelled
    #[error("generation task failed: {0}")]
    Task(String),
}

impl From<GenerateError> for RaglineError {
    fn from(e: GenerateError) -> Self {
        RaglineError::Generation(e.to_string())
    }
}

/// Turns a query plus retrieved context into an answer
#[async_trait]
pub trait Generator: Send + Sync {
    /// Name for debugging and logging
    fn name(&self) -> &str;

    /// Produce an answer for `query` from `context`
    async fn generate(
        &self,
        query: &str,
        context: &[EnrichedResult],
    ) -> Result<Generation, GenerateError>;
}

// ============================================================================
// Prompt
// ============================================================================

const SYSTEM_PROMPT: &str = "Answer the question using only the numbered context passages. \
Cite passages as [n]. If the context does not contain the answer, say so.";

/// Render the context as numbered passages, best first.
pub fn render_context(context: &[EnrichedResult]) -> String {
    let mut out = String::new();
    for (i, item) in context.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("[{}] {}", i + 1, item.result.content));
    }
    out
}

fn build_messages(query: &str, context: &[EnrichedResult]) -> serde_json::Value {
    serde_json::json!([
        {"role": "system", "content": SYSTEM_PROMPT},
        {
            "role": "user",
            "content": format!("Context:\n{}\n\nQuestion: {}", render_context(context), query),
        },
    ])
}

// ============================================================================
// ApiGenerator
// ============================================================================

/// Generator backed by an OpenAI-compatible chat completions endpoint.
///
/// Works with Ollama, vLLM, llama.cpp server, OpenAI and other compatible
/// providers. Without the `api` feature every call fails with
/// `FeatureDisabled`.
pub struct ApiGenerator {
    url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl ApiGenerator {
    /// Build from the `[model]` section of `ragline.toml`
    pub fn from_config(config: &ModelConfig) -> Self {
        ApiGenerator {
            url: llm_client::completions_url(&config.endpoint),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Full URL requests are sent to
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, query: &str, context: &[EnrichedResult]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": build_messages(query, context),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for ApiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        query: &str,
        context: &[EnrichedResult],
    ) -> Result<Generation, GenerateError> {
        let body = self.request_body(query, context);
        let prompt_tokens = estimate_tokens(&body.to_string());
        let url = self.url.clone();
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        let answer = tokio::task::spawn_blocking(move || {
            llm_client::retry_once(
                || llm_client::call_chat_completions(&url, api_key.as_deref(), timeout, &body),
                |text| text.trim().to_string(),
                |answer| answer.is_empty(),
                || LlmClientError::Parse("model returned an empty answer after retry".into()),
                "ragline::generate",
            )
        })
        .await
        .map_err(|e| GenerateError::Task(e.to_string()))??;

        Ok(Generation {
            tokens_consumed: prompt_tokens + estimate_tokens(&answer),
            answer,
        })
    }
}

// ============================================================================
// ExtractiveGenerator
// ============================================================================

/// Returns the top context passage as the answer. No model involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveGenerator;

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(
        &self,
        _query: &str,
        context: &[EnrichedResult],
    ) -> Result<Generation, GenerateError> {
        let answer = context
            .first()
            .map(|c| c.result.content.clone())
            .unwrap_or_default();
        Ok(Generation {
            tokens_consumed: estimate_tokens(&answer),
            answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::{RankedResult, SearchResult};

    fn ctx(id: &str, content: &str) -> EnrichedResult {
        EnrichedResult::plain(RankedResult::from_hit(SearchResult {
            id: id.to_string(),
            score: 1.0,
            content: content.to_string(),
            metadata: Default::default(),
        }))
    }

    fn model_config() -> ModelConfig {
        ModelConfig {
            endpoint: "http://localhost:11434/v1/".to_string(),
            model: "qwen3:1.7b".to_string(),
            api_key: None,
            timeout_ms: 50,
            temperature: 0.2,
            max_tokens: 64,
        }
    }

    #[test]
    fn test_render_context_numbers_passages() {
        let rendered = render_context(&[ctx("a", "first"), ctx("b", "second")]);
        assert_eq!(rendered, "[1] first\n\n[2] second");
    }

    #[test]
    fn test_api_generator_url() {
        let g = ApiGenerator::from_config(&model_config());
        assert_eq!(g.url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(g.name(), "qwen3:1.7b");
    }

    #[test]
    fn test_request_body_shape() {
        let g = ApiGenerator::from_config(&model_config());
        let body = g.request_body("what grew?", &[ctx("a", "revenue grew")]);
        assert_eq!(body["model"], "qwen3:1.7b");
        assert_eq!(body["max_tokens"], 64);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("[1] revenue grew"));
        assert!(user.ends_with("Question: what grew?"));
    }

    #[cfg(not(feature = "api"))]
    #[tokio::test]
    async fn test_api_generator_without_feature() {
        let g = ApiGenerator::from_config(&model_config());
        let err = g.generate("q", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Client(LlmClientError::FeatureDisabled("api"))
        ));
        let converted: RaglineError = err.into();
        assert!(matches!(converted, RaglineError::Generation(_)));
    }

    #[tokio::test]
    async fn test_extractive_generator() {
        let g = ExtractiveGenerator;
        let out = g
            .generate("q", &[ctx("a", "revenue grew 12%"), ctx("b", "other")])
            .await
            .unwrap();
        assert_eq!(out.answer, "revenue grew 12%");
        assert_eq!(out.tokens_consumed, estimate_tokens("revenue grew 12%"));

        let empty = g.generate("q", &[]).await.unwrap();
        assert!(empty.answer.is_empty());
        assert_eq!(empty.tokens_consumed, 0);
    }
}
