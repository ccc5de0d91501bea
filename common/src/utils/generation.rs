//! The generation service referenced in §6: `generate(model, prompt, options)
//! -> {response?, reasoning?}`. Used by the Extractor (§4.6) for entity/
//! relationship extraction and by the Retrieval Engine (§4.9.2) for
//! fulltext query rewriting.
//!
//! `async-openai`'s typed chat-completion response has no slot for a
//! "reasoning" field, but locally hosted chat models fronted by an
//! OpenAI-compatible proxy (Ollama, vLLM, and similar) commonly emit one
//! alongside `content` for models that think before answering. Reading it
//! back requires the raw response body, so this provider talks to the
//! `/chat/completions` endpoint directly with `reqwest` rather than through
//! `async_openai::Client`, while still authenticating and addressing it the
//! same way `EmbeddingProvider` does.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::{error::AppError, utils::config::AppConfig};

#[derive(Clone)]
pub struct GenerationProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.1, max_tokens: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub response: Option<String>,
    pub reasoning: Option<String>,
}

impl GenerationResponse {
    /// The primary output, falling back to the reasoning channel when the
    /// model left the answer slot empty (§4.6 step 2, §4.9.2 step 1).
    pub fn text_or_reasoning(&self) -> Option<&str> {
        self.response
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.reasoning.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl GenerationProvider {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            timeout: Duration::from_secs(config.extraction_timeout_secs),
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        Self { http: reqwest::Client::new(), base_url, api_key, timeout }
    }

    #[instrument(skip(self, prompt), fields(model, prompt_len = prompt.len()))]
    pub async fn generate(&self, model: &str, prompt: &str, options: GenerationOptions) -> Result<GenerationResponse, AppError> {
        let body = ChatRequest {
            model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let message = payload.pointer("/choices/0/message");

        let response_text = message
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let reasoning = message
            .and_then(|m| m.get("reasoning_content").or_else(|| m.get("reasoning")))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(GenerationResponse { response: response_text, reasoning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_or_reasoning_prefers_non_empty_response() {
        let both = GenerationResponse { response: Some("keywords: a b c".into()), reasoning: Some("thinking...".into()) };
        assert_eq!(both.text_or_reasoning(), Some("keywords: a b c"));

        let reasoning_only = GenerationResponse { response: Some("   ".into()), reasoning: Some("final answer: x y z".into()) };
        assert_eq!(reasoning_only.text_or_reasoning(), Some("final answer: x y z"));

        let neither = GenerationResponse { response: None, reasoning: None };
        assert_eq!(neither.text_or_reasoning(), None);
    }
}
