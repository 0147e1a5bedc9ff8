//! In-memory [`MetadataStore`] implementation for tests and ephemeral runs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Nearest-neighbour
//! ordering is brute-force cosine distance over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::embedding::cosine_similarity;
use crate::models::{Asset, AssetAnalysis, AssetStatus, EmbeddingRecord, ProcessingTask};

use super::{AssetPage, MetadataStore, Neighbor, VectorDims};

pub struct InMemoryStore {
    dims: VectorDims,
    assets: RwLock<HashMap<String, Asset>>,
    tasks: RwLock<Vec<ProcessingTask>>,
    embeddings: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryStore {
    pub fn new(dims: VectorDims) -> Self {
        Self {
            dims,
            assets: RwLock::new(HashMap::new()),
            tasks: RwLock::new(Vec::new()),
            embeddings: RwLock::new(HashMap::new()),
        }
    }

    /// Number of asset rows, including soft-deleted ones.
    pub fn asset_count(&self) -> usize {
        self.assets.read().unwrap().len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    pub fn embedding(&self, asset_id: &str) -> Option<EmbeddingRecord> {
        self.embeddings.read().unwrap().get(asset_id).cloned()
    }

    /// Raw row access that ignores soft deletion.
    pub fn raw_asset(&self, id: &str) -> Option<Asset> {
        self.assets.read().unwrap().get(id).cloned()
    }
}

/// Newest first, then id ascending.
fn by_recency(a: &Asset, b: &Asset) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn insert_asset(&self, asset: &Asset) -> Result<()> {
        let mut assets = self.assets.write().unwrap();
        if assets.contains_key(&asset.id) {
            anyhow::bail!("asset {} already exists", asset.id);
        }
        assets.insert(asset.id.clone(), asset.clone());
        Ok(())
    }

    async fn insert_task(&self, task: &ProcessingTask) -> Result<()> {
        self.tasks.write().unwrap().push(task.clone());
        Ok(())
    }

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        let assets = self.assets.read().unwrap();
        Ok(assets.get(id).filter(|a| a.deleted_at.is_none()).cloned())
    }

    async fn list_assets(
        &self,
        status: Option<AssetStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<AssetPage> {
        let assets = self.assets.read().unwrap();
        let mut live: Vec<&Asset> = assets
            .values()
            .filter(|a| a.deleted_at.is_none())
            .filter(|a| status.map_or(true, |s| a.status == s))
            .collect();
        live.sort_by(|a, b| by_recency(a, b));

        let total = live.len() as i64;
        let page = live
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(AssetPage {
            assets: page,
            total,
        })
    }

    async fn recent_completed(&self, limit: i64) -> Result<Vec<Asset>> {
        Ok(self
            .list_assets(Some(AssetStatus::Completed), 0, limit)
            .await?
            .assets)
    }

    async fn nearest_assets(&self, query: &[f32], limit: i64) -> Result<Vec<Neighbor>> {
        let assets = self.assets.read().unwrap();
        let embeddings = self.embeddings.read().unwrap();

        let mut neighbors = Vec::new();
        for record in embeddings.values() {
            let live = assets
                .get(&record.asset_id)
                .is_some_and(|a| a.deleted_at.is_none());
            let Some(vector) = record.semantic.as_ref().filter(|_| live) else {
                continue;
            };
            if vector.len() != self.dims.semantic {
                anyhow::bail!(
                    "corrupt embedding for asset {}: {} dims, expected {}",
                    record.asset_id,
                    vector.len(),
                    self.dims.semantic
                );
            }
            neighbors.push(Neighbor {
                asset_id: record.asset_id.clone(),
                distance: 1.0 - cosine_similarity(query, vector) as f64,
            });
        }

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.asset_id.cmp(&b.asset_id))
        });
        neighbors.truncate(limit.max(0) as usize);
        Ok(neighbors)
    }

    async fn latest_task(&self, asset_id: &str) -> Result<Option<ProcessingTask>> {
        let tasks = self.tasks.read().unwrap();
        // Later pushes win ties on created_at.
        Ok(tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.asset_id == asset_id)
            .max_by_key(|(idx, t)| (t.created_at, *idx))
            .map(|(_, t)| t.clone()))
    }

    async fn soft_delete_asset(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut assets = self.assets.write().unwrap();
        match assets.get_mut(id) {
            Some(asset) if asset.deleted_at.is_none() => {
                asset.deleted_at = Some(now);
                asset.updated_at = now;
            }
            _ => return Ok(false),
        }
        self.embeddings.write().unwrap().remove(id);
        Ok(true)
    }

    async fn set_asset_status(
        &self,
        id: &str,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut assets = self.assets.write().unwrap();
        match assets.get_mut(id) {
            Some(asset) if asset.deleted_at.is_none() => {
                asset.status = status;
                asset.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_asset(
        &self,
        id: &str,
        analysis: &AssetAnalysis,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut assets = self.assets.write().unwrap();
        match assets.get_mut(id) {
            Some(asset) if asset.deleted_at.is_none() => {
                asset.caption = analysis.caption.clone();
                asset.content_text = analysis.content_text.clone();
                if let Some(meta) = &analysis.metadata {
                    asset.metadata = meta.clone();
                }
                asset.status = AssetStatus::Completed;
                asset.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        self.dims.check(record)?;
        self.embeddings
            .write()
            .unwrap()
            .insert(record.asset_id.clone(), record.clone());
        Ok(())
    }

    async fn update_task(&self, task: &ProcessingTask) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => anyhow::bail!("processing task {} not found", task.id),
        }
    }
}
