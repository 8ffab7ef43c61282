//! HTTP answer generator for OpenAI-compatible chat completion backends.
//!
//! Enabled with the `llm` cargo feature. [`HttpGenerator`] uses reqwest's
//! blocking client because bus handlers run synchronously; callers inside a
//! tokio runtime must dispatch onto a blocking thread.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use parley_core::{ParleyError, Result};

use crate::responder::AnswerGenerator;

const SYSTEM_PROMPT: &str = "You are an assistant that answers questions using only the provided context. \
If the answer is not in the context, say that you don't have enough information. \
Do not make up answers.";

/// Configuration for [`HttpGenerator`] loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String, // e.g., http://localhost:8000/v1
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("PARLEY_LLM_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: std::env::var("PARLEY_LLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "qwen2.5-0.5b-instruct".to_string()),
            api_key: std::env::var("PARLEY_LLM_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("PARLEY_LLM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
            temperature: std::env::var("PARLEY_LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.7),
            max_tokens: std::env::var("PARLEY_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(500),
        }
    }
}

/// Answers by posting the question and retrieved context to `/chat/completions`.
pub struct HttpGenerator {
    http: Client,
    cfg: LlmConfig,
}

impl HttpGenerator {
    pub fn new(cfg: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::default())
    }

    pub fn config(&self) -> &LlmConfig {
        &self.cfg
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }
}

/// Chat Completions request body for `query` over `context`.
pub fn chat_body(cfg: &LlmConfig, query: &str, context: &[String]) -> Value {
    let user = format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        context.join("\n"),
        query
    );
    json!({
        "model": cfg.model,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": user},
        ],
        "max_tokens": cfg.max_tokens,
        "temperature": cfg.temperature,
    })
}

/// Pulls `choices[0].message.content` out of a Chat Completions reply.
pub fn answer_from_chat(val: &Value) -> Result<String> {
    if let Some(msg) = val.pointer("/error/message").and_then(|v| v.as_str()) {
        return Err(ParleyError::Worker(format!("LLM API error: {msg}")));
    }
    val.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ParleyError::Worker("Missing choices[0].message.content in chat completions".into())
        })
}

impl AnswerGenerator for HttpGenerator {
    fn generate(&self, query: &str, context: &[String]) -> Result<String> {
        let url = self.chat_url();
        debug!(target: "responder", url = %url, model = %self.cfg.model, "POST chat completions");

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .json(&chat_body(&self.cfg, query, context))
            .send()
            .map_err(|e| ParleyError::Worker(format!("Chat Completions HTTP error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            error!(target: "responder", %status, body = %text, "Chat Completions error");
            return Err(ParleyError::Worker(format!(
                "Chat Completions error: status={status} body={text}"
            )));
        }

        let val: Value = resp.json().map_err(|e| {
            ParleyError::Worker(format!("Failed to parse Chat Completions JSON: {e}"))
        })?;
        answer_from_chat(&val)
    }
}
