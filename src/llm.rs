//! Text generation provider: an OpenAI-compatible chat completions client.
//!
//! [`OpenAiChatClient`] posts a single non-streaming request to
//! `{url}/chat/completions` with a bearer key and reads the first choice.
//! Health is `GET {url}/models`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// One chat turn as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Body of a `POST /chat/completions` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
}

/// Failure reported by a [`TextGenerator`]. `status` is set when the
/// provider answered with a non-2xx HTTP status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("generation failed (status {status:?}): {body}")]
pub struct GenerationError {
    pub status: Option<u16>,
    pub body: String,
}

impl GenerationError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self {
            status: None,
            body: msg.into(),
        }
    }
}

/// Reachability of an AI dependency, for the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeStatus {
    pub available: bool,
    pub message: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one completion and return the raw (untrimmed) content of the
    /// first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;

    async fn health(&self) -> ProbeStatus;
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    health_timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            client,
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::other(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GenerationError::other(e.to_string()))?;

        if !status.is_success() {
            let mut detail = body.trim().to_string();
            if detail.is_empty() {
                detail = status.canonical_reason().unwrap_or("unknown").to_string();
            }
            return Err(GenerationError {
                status: Some(status.as_u16()),
                body: detail,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::other(format!("invalid llm response: {}", e)))?;
        let first = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::other("llm response has no choices"))?;

        Ok(first.message.content.unwrap_or_default())
    }

    async fn health(&self) -> ProbeStatus {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.health_timeout)
            .send()
            .await;

        let (available, message) = match resp {
            Err(_) => (false, "LLM endpoint unreachable"),
            Ok(r) if r.status().is_success() => (true, "LLM endpoint reachable"),
            Ok(r) if r.status() == reqwest::StatusCode::UNAUTHORIZED => {
                (false, "LLM reachable but API key rejected")
            }
            Ok(_) => (false, "LLM endpoint responded with non-2xx"),
        };
        ProbeStatus {
            available,
            message: message.to_string(),
        }
    }
}
