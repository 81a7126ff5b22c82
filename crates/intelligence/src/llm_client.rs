//! Shared HTTP plumbing for OpenAI-compatible chat completion endpoints
//!
//! Used by [`ApiGenerator`](crate::generate::ApiGenerator). The HTTP call is
//! only compiled with the `api` feature; without it every call fails with
//! [`LlmClientError::FeatureDisabled`].

use thiserror::Error;

/// Errors raised while talking to a chat completions endpoint
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Transport failure or non-2xx status
    #[error("network error: {0}")]
    Network(String),
    /// Response body did not have the expected shape
    #[error("parse error: {0}")]
    Parse(String),
    /// The endpoint did not answer within the configured timeout
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    /// The crate was built without the named feature
    #[error("feature '{0}' is not enabled")]
    FeatureDisabled(&'static str),
}

/// Build the chat completions URL from a base endpoint.
///
/// `http://localhost:11434/v1/` becomes
/// `http://localhost:11434/v1/chat/completions`.
pub fn completions_url(endpoint: &str) -> String {
    format!("{}/chat/completions", endpoint.trim_end_matches('/'))
}

/// Extract `choices[0].message.content` from a chat completions response.
pub fn parse_completion(body: &str) -> Result<String, LlmClientError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| LlmClientError::Parse(e.to_string()))?;
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmClientError::Parse("missing choices[0].message.content".to_string()))
}

/// POST a chat completions request and return the message content.
///
/// Blocking; callers on an async runtime run it on a blocking task.
#[cfg(feature = "api")]
pub fn call_chat_completions(
    url: &str,
    api_key: Option<&str>,
    timeout: std::time::Duration,
    body: &serde_json::Value,
) -> Result<String, LlmClientError> {
    let bytes =
        serde_json::to_vec(body).map_err(|e| LlmClientError::Parse(e.to_string()))?;

    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let mut request = agent.post(url).header("Content-Type", "application/json");
    if let Some(key) = api_key {
        request = request.header("Authorization", &format!("Bearer {}", key));
    }

    let mut response = request.send(&bytes[..]).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("timed out") || msg.contains("Timeout") {
            LlmClientError::Timeout(timeout.as_millis() as u64)
        } else {
            LlmClientError::Network(msg)
        }
    })?;

    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| LlmClientError::Network(e.to_string()))?;

    parse_completion(&text)
}

/// Placeholder for builds without the `api` feature.
#[cfg(not(feature = "api"))]
pub fn call_chat_completions(
    _url: &str,
    _api_key: Option<&str>,
    _timeout: std::time::Duration,
    _body: &serde_json::Value,
) -> Result<String, LlmClientError> {
    Err(LlmClientError::FeatureDisabled("api"))
}

/// Call once, and retry once if the call fails or parses to nothing.
///
/// `is_empty_fn` decides whether a parsed result counts as empty;
/// `on_empty_err` builds the error returned when the retry is also empty.
pub fn retry_once<T, E: std::fmt::Display>(
    call_fn: impl Fn() -> Result<String, E>,
    parse_fn: impl Fn(&str) -> T,
    is_empty_fn: impl Fn(&T) -> bool,
    on_empty_err: impl FnOnce() -> E,
    operation: &str,
) -> Result<T, E> {
    match call_fn() {
        Ok(text) => {
            let result = parse_fn(&text);
            if !is_empty_fn(&result) {
                return Ok(result);
            }
            tracing::warn!(
                target: "ragline::llm_client",
                op = operation,
                "Empty response, retrying once"
            );
        }
        Err(e) => {
            tracing::warn!(
                target: "ragline::llm_client",
                op = operation,
                error = %e,
                "Call failed, retrying once"
            );
        }
    }

    match call_fn() {
        Ok(text) => {
            let result = parse_fn(&text);
            if is_empty_fn(&result) {
                tracing::warn!(
                    target: "ragline::llm_client",
                    op = operation,
                    "Retry also returned an empty response"
                );
                Err(on_empty_err())
            } else {
                Ok(result)
            }
        }
        Err(e) => {
            tracing::warn!(
                target: "ragline::llm_client",
                op = operation,
                error = %e,
                "Retry also failed"
            );
            Err(e)
        }
    }
}
