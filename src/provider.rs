//! Text-generation provider abstraction and the DeepSeek implementation.
//!
//! The pipeline talks to [`TextGenerator`]; tests substitute stubs. The
//! concrete provider calls a DeepSeek-compatible chat-completions
//! endpoint with `stream: true` and assembles the reply from SSE deltas.
//!
//! Failure semantics:
//! - transport errors and non-2xx responses surface as `Err` (the
//!   composer substitutes its fallback text),
//! - a malformed individual stream chunk is logged and skipped; the rest
//!   of the stream is still consumed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::warn;

use crate::config::ProviderConfig;

/// Instruction sent as the system message on every call.
pub const SYSTEM_PROMPT: &str =
    "You are an engineering lead who analyzes development work from commit history.";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logs and the health endpoint.
    fn model_name(&self) -> &str;

    /// Generate the full text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// DeepSeek-compatible streaming chat-completions client.
pub struct DeepSeekGenerator {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl DeepSeekGenerator {
    /// Build a generator from config, taking the API key from the
    /// `DEEPSEEK_API_KEY` environment variable. A missing key is an
    /// error here so daemon startup fails fast.
    pub fn from_env(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let Some(api_key) = api_key else {
            bail!("DEEPSEEK_API_KEY environment variable is missing or empty");
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            url: config.url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for DeepSeekGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("chat-completions request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat-completions error {}: {}", status, text.trim());
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.context("chat-completions stream interrupted")?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                match parse_sse_line(line.trim()) {
                    SseEvent::Delta(delta) => content.push_str(&delta),
                    SseEvent::Done => return Ok(content),
                    SseEvent::Skip => {}
                }
            }
        }

        Ok(content)
    }
}

enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

/// Interpret one SSE line. Non-data lines and empty deltas are skipped;
/// a chunk that fails to parse is skipped without aborting the stream.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let chunk: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!("skipping malformed stream chunk: {e}");
            return SseEvent::Skip;
        }
    };

    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(delta) if !delta.is_empty() => SseEvent::Delta(delta.to_string()),
        _ => SseEvent::Skip,
    }
}
