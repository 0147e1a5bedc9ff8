//! Fakes and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use asset_harness::config::{Config, RetrievalConfig};
use asset_harness::embedding::{DisabledProvider, EmbeddingProvider};
use asset_harness::llm::{CompletionRequest, GenerationError, ProbeStatus, TextGenerator};
use asset_harness::models::{
    Asset, AssetAnalysis, AssetStatus, EmbeddingRecord, ProcessingTask,
};
use asset_harness::object_store::{MemoryObjectStore, ObjectStore};
use asset_harness::queue::{MemoryQueue, TaskQueue};
use asset_harness::search::RetrievalEngine;
use asset_harness::services::{Collaborators, Services};
use asset_harness::store::memory::InMemoryStore;
use asset_harness::store::{AssetPage, MetadataStore, Neighbor, VectorDims};

pub const DIMS: usize = 4;

pub fn dims() -> VectorDims {
    VectorDims {
        semantic: DIMS,
        visual: 2,
    }
}

pub fn completed_asset(
    id: &str,
    file: &str,
    mime: &str,
    caption: Option<&str>,
    text: Option<&str>,
    created_at: DateTime<Utc>,
) -> Asset {
    Asset {
        id: id.to_string(),
        bucket: "assets".to_string(),
        object_key: format!("{}/{}", id, file),
        mime_type: mime.to_string(),
        size_bytes: 1024,
        caption: caption.map(str::to_string),
        content_text: text.map(str::to_string),
        metadata: serde_json::json!({ "original_filename": file }),
        status: AssetStatus::Completed,
        created_at,
        updated_at: created_at,
        deleted_at: None,
    }
}

// ============ Embedding ============

/// Returns a fixed vector, or fails every call.
pub struct FixedEmbedder {
    pub vector: Option<Vec<f32>>,
    pub fail: bool,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        if self.fail {
            bail!("embedding sidecar unreachable");
        }
        Ok(self.vector.clone())
    }
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ============ Text generation ============

/// Records every request and replays a canned response.
pub struct RecordingGenerator {
    pub response: Result<String, GenerationError>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingGenerator {
    pub fn answering(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            response: Err(GenerationError {
                status: Some(status),
                body: body.to_string(),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        self.response.clone()
    }

    async fn health(&self) -> ProbeStatus {
        ProbeStatus {
            available: true,
            message: "recording".to_string(),
        }
    }
}

// ============ Failing collaborators ============

pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    fn bucket(&self) -> &str {
        "assets"
    }
    async fn put(&self, _key: &str, _bytes: &[u8], _content_type: &str) -> Result<String> {
        bail!("minio unavailable")
    }
    async fn presigned_get(&self, _bucket: &str, _key: &str, _ttl: Duration) -> Result<String> {
        bail!("minio unavailable")
    }
    async fn delete(&self, _bucket: &str, _key: &str) -> Result<()> {
        bail!("minio unavailable")
    }
    async fn ensure_bucket(&self) -> Result<()> {
        bail!("minio unavailable")
    }
}

/// Accepts writes but never finishes minting a presigned URL.
pub struct StallingObjectStore;

#[async_trait]
impl ObjectStore for StallingObjectStore {
    fn bucket(&self) -> &str {
        "assets"
    }
    async fn put(&self, key: &str, _bytes: &[u8], _content_type: &str) -> Result<String> {
        Ok(key.to_string())
    }
    async fn presigned_get(&self, _bucket: &str, _key: &str, _ttl: Duration) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        bail!("presign never returned")
    }
    async fn delete(&self, _bucket: &str, _key: &str) -> Result<()> {
        Ok(())
    }
    async fn ensure_bucket(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FailingQueue;

#[async_trait]
impl TaskQueue for FailingQueue {
    async fn push(&self, _item: &str) -> Result<()> {
        bail!("queue unavailable")
    }
    async fn pop(&self) -> Result<Option<String>> {
        bail!("queue unavailable")
    }
    async fn len(&self) -> Result<u64> {
        bail!("queue unavailable")
    }
}

/// Wraps an [`InMemoryStore`] and fails (or stalls on) the named operation.
pub struct FailingStore {
    pub inner: InMemoryStore,
    pub fail_on: &'static str,
    pub stall_on: &'static str,
}

impl FailingStore {
    pub fn new(fail_on: &'static str) -> Self {
        Self {
            inner: InMemoryStore::new(dims()),
            fail_on,
            stall_on: "",
        }
    }

    /// Never answers `op` in any reasonable time.
    pub fn stalling(op: &'static str) -> Self {
        Self {
            inner: InMemoryStore::new(dims()),
            fail_on: "",
            stall_on: op,
        }
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.fail_on == op {
            bail!("{} failed: database is locked", op);
        }
        Ok(())
    }

    async fn stall(&self, op: &str) {
        if self.stall_on == op {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
    }
}

#[async_trait]
impl MetadataStore for FailingStore {
    async fn insert_asset(&self, asset: &Asset) -> Result<()> {
        self.check("insert_asset")?;
        self.inner.insert_asset(asset).await
    }
    async fn insert_task(&self, task: &ProcessingTask) -> Result<()> {
        self.check("insert_task")?;
        self.inner.insert_task(task).await
    }
    async fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        self.check("get_asset")?;
        self.inner.get_asset(id).await
    }
    async fn list_assets(
        &self,
        status: Option<AssetStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<AssetPage> {
        self.check("list_assets")?;
        self.inner.list_assets(status, offset, limit).await
    }
    async fn recent_completed(&self, limit: i64) -> Result<Vec<Asset>> {
        self.check("recent_completed")?;
        self.inner.recent_completed(limit).await
    }
    async fn nearest_assets(&self, query: &[f32], limit: i64) -> Result<Vec<Neighbor>> {
        self.check("nearest_assets")?;
        self.stall("nearest_assets").await;
        self.inner.nearest_assets(query, limit).await
    }
    async fn latest_task(&self, asset_id: &str) -> Result<Option<ProcessingTask>> {
        self.check("latest_task")?;
        self.inner.latest_task(asset_id).await
    }
    async fn soft_delete_asset(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.check("soft_delete_asset")?;
        self.inner.soft_delete_asset(id, now).await
    }
    async fn set_asset_status(
        &self,
        id: &str,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check("set_asset_status")?;
        self.inner.set_asset_status(id, status, now).await
    }
    async fn complete_asset(
        &self,
        id: &str,
        analysis: &AssetAnalysis,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check("complete_asset")?;
        self.inner.complete_asset(id, analysis, now).await
    }
    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        self.check("upsert_embedding")?;
        self.inner.upsert_embedding(record).await
    }
    async fn update_task(&self, task: &ProcessingTask) -> Result<()> {
        self.check("update_task")?;
        self.inner.update_task(task).await
    }
}

// ============ Graph builders ============

pub fn engine(
    store: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> RetrievalEngine {
    RetrievalEngine::new(
        store,
        objects,
        embedder,
        RetrievalConfig::default(),
        Duration::from_secs(900),
    )
}

pub struct MemoryGraph {
    pub services: Services,
    pub store: Arc<InMemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub queue: Arc<MemoryQueue>,
    pub generator: Arc<RecordingGenerator>,
}

/// A full service graph over in-memory collaborators, with the embedding
/// provider disabled.
pub fn memory_services(config: Config, generator: RecordingGenerator) -> MemoryGraph {
    let store = Arc::new(InMemoryStore::new(VectorDims {
        semantic: config.embedding.dims,
        visual: config.embedding.visual_dims,
    }));
    let objects = Arc::new(MemoryObjectStore::new(&config.storage.bucket));
    let queue = Arc::new(MemoryQueue::new());
    let generator = Arc::new(generator);
    let services = Services::from_parts(
        config,
        Collaborators {
            store: store.clone(),
            objects: objects.clone(),
            queue: queue.clone(),
            embedder: Arc::new(DisabledProvider),
            generator: generator.clone(),
        },
    );
    MemoryGraph {
        services,
        store,
        objects,
        queue,
        generator,
    }
}
