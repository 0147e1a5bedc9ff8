//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: never produces a vector; retrieval runs lexical-only.
//! - **[`HttpEmbedder`]**: calls a caption/embedding sidecar (`POST /api/embed`).
//! - **[`OpenAIEmbedder`]**: calls an OpenAI-compatible `/v1/embeddings` endpoint
//!   with retry and backoff.
//!
//! Also provides vector utilities for SQLite BLOB storage:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The OpenAI embedder uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Query embedding sits on the interactive search path, so the default
//! `max_retries` is 0 and the timeout is short.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::models::Signal;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"bge-m3"`).
    fn model_name(&self) -> &str;

    /// Expected vector dimensionality.
    fn dims(&self) -> usize;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Embed one text. `Ok(None)` means the provider has nothing to offer
    /// (disabled, or an empty vector came back).
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    /// Cheap reachability probe.
    async fn health(&self) -> Result<()>;
}

/// Embed `text` as a best-effort [`Signal`]. Never fails.
///
/// A vector whose length differs from [`EmbeddingProvider::dims`] is
/// reported as [`Signal::Errored`].
pub async fn embed_signal(provider: &dyn EmbeddingProvider, text: &str) -> Signal<Vec<f32>> {
    if !provider.is_enabled() {
        return Signal::Absent;
    }
    match provider.embed(text).await {
        Ok(Some(vec)) if vec.is_empty() => Signal::Absent,
        Ok(Some(vec)) if vec.len() != provider.dims() => Signal::Errored(format!(
            "{} returned {} dims, expected {}",
            provider.model_name(),
            vec.len(),
            provider.dims()
        )),
        other => Signal::from(other),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider. Every query degrades to lexical-only ranking.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
    async fn health(&self) -> Result<()> {
        bail!("Embedding provider is disabled")
    }
}

// ============ HTTP sidecar ============

/// Embedding provider backed by the caption/embedding sidecar service.
///
/// `POST {url}/api/embed` with `{"text": ...}` returns `{"vector": [...]}`;
/// `GET {url}/health` is the reachability probe.
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    dims: usize,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    vector: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.url required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone().unwrap_or_else(|| "sidecar".to_string()),
            dims: config.dims,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("embed request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("embed service error {}: {}", status, body);
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("invalid embed response")?;
        if parsed.vector.is_empty() {
            return Ok(None);
        }
        Ok(Some(parsed.vector))
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("embed service health returned {}", response.status());
        }
        Ok(())
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using an OpenAI-compatible API.
///
/// Calls `POST {url}/embeddings` (default `https://api.openai.com/v1`) with
/// the configured model. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if `model` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dims: config.dims,
            max_retries: config.max_retries,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return Ok(parse_openai_response(&json)?.into_iter().next());
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("embedding API health returned {}", response.status());
        }
        Ok(())
    }
}

/// Extract the `data[].embedding` arrays in `index` order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"http"` | [`HttpEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "http" => Ok(Box::new(HttpEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial values are
/// ignored; callers that care check the length first.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Zero for mismatched lengths or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
