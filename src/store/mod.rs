//! Metadata store abstraction.
//!
//! The [`MetadataStore`] trait is everything the ingestion coordinator, the
//! retrieval engine, and the external processing worker need from durable
//! storage: asset and task CRUD, status-filtered listing, and a
//! nearest-neighbour query over embedding rows.
//!
//! Two backends exist: [`SqliteStore`](crate::sqlite_store::SqliteStore) for
//! real deployments and [`memory::InMemoryStore`] for tests and ephemeral
//! setups. Implementations must be `Send + Sync`.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Asset, AssetAnalysis, AssetStatus, EmbeddingRecord, ProcessingTask};

/// One page of assets plus the total number of matching rows.
#[derive(Debug, Clone, Default)]
pub struct AssetPage {
    pub assets: Vec<Asset>,
    pub total: i64,
}

/// An `(asset id, cosine distance)` pair from [`MetadataStore::nearest_assets`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub asset_id: String,
    pub distance: f64,
}

/// Configured vector dimensionalities. Writes with any other length are
/// rejected; stored rows with any other length are reported as corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDims {
    pub semantic: usize,
    pub visual: usize,
}

impl VectorDims {
    pub fn check(&self, record: &EmbeddingRecord) -> Result<()> {
        if let Some(v) = &record.semantic {
            if v.len() != self.semantic {
                bail!(
                    "semantic vector for asset {} has {} dims, expected {}",
                    record.asset_id,
                    v.len(),
                    self.semantic
                );
            }
        }
        if let Some(v) = &record.visual {
            if v.len() != self.visual {
                bail!(
                    "visual vector for asset {} has {} dims, expected {}",
                    record.asset_id,
                    v.len(),
                    self.visual
                );
            }
        }
        Ok(())
    }
}

/// Durable storage for assets, processing tasks, and embeddings.
///
/// | Method | Used by |
/// |--------|---------|
/// | [`insert_asset`](MetadataStore::insert_asset), [`insert_task`](MetadataStore::insert_task) | ingestion |
/// | [`get_asset`](MetadataStore::get_asset), [`list_assets`](MetadataStore::list_assets), [`latest_task`](MetadataStore::latest_task), [`soft_delete_asset`](MetadataStore::soft_delete_asset) | asset management |
/// | [`recent_completed`](MetadataStore::recent_completed), [`nearest_assets`](MetadataStore::nearest_assets) | retrieval |
/// | [`set_asset_status`](MetadataStore::set_asset_status), [`complete_asset`](MetadataStore::complete_asset), [`upsert_embedding`](MetadataStore::upsert_embedding), [`update_task`](MetadataStore::update_task) | processing worker |
///
/// Soft-deleted assets are invisible to every read.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_asset(&self, asset: &Asset) -> Result<()>;

    async fn insert_task(&self, task: &ProcessingTask) -> Result<()>;

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>>;

    /// Newest first, optionally filtered by status.
    async fn list_assets(
        &self,
        status: Option<AssetStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<AssetPage>;

    /// The `limit` most recently created `COMPLETED` assets, newest first.
    async fn recent_completed(&self, limit: i64) -> Result<Vec<Asset>>;

    /// Assets whose semantic vector is nearest to `query`, ascending cosine
    /// distance, at most `limit` rows.
    async fn nearest_assets(&self, query: &[f32], limit: i64) -> Result<Vec<Neighbor>>;

    /// Most recently created processing task for an asset.
    async fn latest_task(&self, asset_id: &str) -> Result<Option<ProcessingTask>>;

    /// Mark the asset deleted and drop its embedding row. Returns `false`
    /// when no live asset has that id.
    async fn soft_delete_asset(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn set_asset_status(
        &self,
        id: &str,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Store worker output and move the asset to `COMPLETED`.
    async fn complete_asset(
        &self,
        id: &str,
        analysis: &AssetAnalysis,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Create or replace the embedding row. Rejects wrong dimensionality.
    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()>;

    async fn update_task(&self, task: &ProcessingTask) -> Result<()>;
}
