use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_provider")]
    pub provider: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint (e.g. MinIO). Enables path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_secs: u64,
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            bucket: default_bucket(),
            region: default_region(),
            endpoint_url: None,
            presign_ttl_secs: default_presign_ttl(),
            timeout_secs: default_storage_timeout(),
        }
    }
}

fn default_storage_provider() -> String {
    "s3".to_string()
}
fn default_bucket() -> String {
    "asset-harness".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_presign_ttl() -> u64 {
    3600
}
fn default_storage_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
        }
    }
}

fn default_queue_name() -> String {
    "assets:tasks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Accepted MIME types. A declared type is accepted when it equals an
    /// entry or starts with it, so `"text/plain; charset=utf-8"` and
    /// `"image/"` entries both work.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_allowed_mime_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "application/pdf",
        "text/plain",
        "application/json",
        "text/markdown",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl IngestConfig {
    pub fn allows(&self, mime_type: &str) -> bool {
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime.is_empty() {
            return false;
        }
        self.allowed_mime_types
            .iter()
            .any(|allowed| mime.starts_with(&allowed.to_ascii_lowercase()))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,
    #[serde(default = "default_vector_candidates")]
    pub vector_candidates: i64,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight_per_hour: f64,
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// Upper bound on the nearest-neighbour query; past it search ranks
    /// lexically.
    #[serde(default = "default_vector_timeout")]
    pub vector_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            vector_candidates: default_vector_candidates(),
            vector_weight: default_vector_weight(),
            recency_weight_per_hour: default_recency_weight(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_threshold: default_threshold(),
            preview_chars: default_preview_chars(),
            vector_timeout_secs: default_vector_timeout(),
        }
    }
}

fn default_vector_timeout() -> u64 {
    3
}
fn default_candidate_limit() -> i64 {
    500
}
fn default_vector_candidates() -> i64 {
    100
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_recency_weight() -> f64 {
    0.001
}
fn default_limit() -> i64 {
    20
}
fn default_max_limit() -> i64 {
    100
}
fn default_threshold() -> f64 {
    0.15
}
fn default_preview_chars() -> usize {
    240
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_visual_dims")]
    pub visual_dims: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            url: None,
            model: None,
            dims: default_dims(),
            visual_dims: default_visual_dims(),
            timeout_secs: default_embedding_timeout(),
            max_retries: 0,
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_dims() -> usize {
    1024
}
fn default_visual_dims() -> usize {
    512
}
fn default_embedding_timeout() -> u64 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Environment variable holding the bearer key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            timeout_secs: default_llm_timeout(),
            health_timeout_secs: default_health_timeout(),
        }
    }
}

fn default_llm_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}
fn default_llm_model() -> String {
    "local-model".to_string()
}
fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    800
}
fn default_top_p() -> f32 {
    0.9
}
fn default_llm_timeout() -> u64 {
    90
}
fn default_health_timeout() -> u64 {
    2
}

impl LlmConfig {
    /// Bearer key from the configured environment variable, or `"sk-local"`.
    pub fn api_key(&self) -> String {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| "sk-local".to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: i64,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: i64,
    #[serde(default = "default_rag_threshold")]
    pub threshold: f64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            threshold: default_rag_threshold(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_top_k() -> i64 {
    5
}
fn default_max_top_k() -> i64 {
    12
}
fn default_rag_threshold() -> f64 {
    0.05
}
fn default_system_prompt() -> String {
    "You are a helpful assistant for a personal asset library. Answer using only the \
     retrieved context. Cite sources with their [n] markers. If the context does not \
     contain the answer, say that you could not find it."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// A config with every default applied and the given database path.
    /// Used by tests and by in-memory setups.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            rag: RagConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Storage
    match config.storage.provider.as_str() {
        "s3" | "memory" => {}
        other => anyhow::bail!(
            "Unknown storage provider: '{}'. Must be s3 or memory.",
            other
        ),
    }
    if config.storage.bucket.trim().is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }

    // Ingest
    if config.ingest.max_upload_bytes == 0 {
        anyhow::bail!("ingest.max_upload_bytes must be > 0");
    }
    if config.ingest.allowed_mime_types.is_empty() {
        anyhow::bail!("ingest.allowed_mime_types must not be empty");
    }

    // Retrieval
    let retrieval = &config.retrieval;
    if retrieval.max_limit < 1 {
        anyhow::bail!("retrieval.max_limit must be >= 1");
    }
    if retrieval.default_limit < 1 || retrieval.default_limit > retrieval.max_limit {
        anyhow::bail!("retrieval.default_limit must be in [1, retrieval.max_limit]");
    }
    if !(0.0..=1.0).contains(&retrieval.vector_weight) {
        anyhow::bail!("retrieval.vector_weight must be in [0.0, 1.0]");
    }
    if retrieval.vector_timeout_secs == 0 {
        anyhow::bail!("retrieval.vector_timeout_secs must be > 0");
    }
    if retrieval.candidate_limit < 1 {
        anyhow::bail!("retrieval.candidate_limit must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "http" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, http, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider == "http" && config.embedding.url.is_none() {
            anyhow::bail!("embedding.url must be specified when provider is 'http'");
        }
        if config.embedding.provider == "openai" && config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'openai'");
        }
    }

    // RAG
    if config.rag.max_top_k < 1 {
        anyhow::bail!("rag.max_top_k must be >= 1");
    }

    Ok(())
}
