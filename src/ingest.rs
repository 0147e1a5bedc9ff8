//! Ingestion coordinator and asset management.
//!
//! [`IngestionCoordinator::ingest`] validates an upload, then performs four
//! side effects in order:
//!
//! ```text
//! object put ─▶ asset insert (PENDING) ─▶ task insert (QUEUED) ─▶ queue push
//! ```
//!
//! Validation runs before any I/O. A failing step aborts with an error
//! naming that step; earlier steps are not rolled back, so an object may be
//! stored without an asset row. Re-uploading is the recovery path.
//!
//! The coordinator only ever creates `PENDING` assets. Status transitions
//! belong to the external processing worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::models::{Asset, AssetStatus, ProcessingTask};
use crate::object_store::{presign_or_empty, ObjectStore};
use crate::queue::TaskQueue;
use crate::store::MetadataStore;
use crate::text;

/// An incoming file.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    /// Client-side file name; only its extension is used for the key.
    pub filename: &'a str,
    pub mime_type: &'a str,
    /// Size declared by the client. The larger of this and the actual
    /// byte count is checked against the ceiling.
    pub declared_size: u64,
    pub bytes: &'a [u8],
}

impl Upload<'_> {
    fn effective_size(&self) -> u64 {
        self.declared_size.max(self.bytes.len() as u64)
    }
}

/// Current state of an asset plus its latest processing attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AssetStatusReport {
    pub asset_id: String,
    pub status: AssetStatus,
    pub task: Option<ProcessingTask>,
}

/// An asset as shown to clients: the stored row plus derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct AssetView {
    #[serde(flatten)]
    pub asset: Asset,
    pub file_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetListing {
    pub assets: Vec<AssetView>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

pub struct IngestionCoordinator {
    store: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn TaskQueue>,
    config: IngestConfig,
    presign_ttl: Duration,
    presign_timeout: Duration,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn TaskQueue>,
        config: IngestConfig,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            queue,
            config,
            presign_ttl,
            presign_timeout: Duration::from_secs(5),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Reject uploads that are too large or of an unsupported type.
    pub fn validate(&self, upload: &Upload<'_>) -> Result<()> {
        let size = upload.effective_size();
        if size > self.config.max_upload_bytes {
            return Err(Error::FileTooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }
        if !self.config.allows(upload.mime_type) {
            return Err(Error::InvalidFileType(upload.mime_type.to_string()));
        }
        Ok(())
    }

    pub async fn ingest(&self, upload: Upload<'_>) -> Result<Asset> {
        self.ingest_at(upload, Utc::now()).await
    }

    pub async fn ingest_at(&self, upload: Upload<'_>, now: DateTime<Utc>) -> Result<Asset> {
        self.validate(&upload)?;

        let id = uuid::Uuid::new_v4().to_string();
        let key = text::storage_key(&id, upload.filename);
        let mime_type = upload.mime_type.trim().to_string();

        let object_key = self
            .objects
            .put(&key, upload.bytes, &mime_type)
            .await
            .map_err(Error::ObjectStore)?;
        info!(asset_id = %id, key = %object_key, bytes = upload.bytes.len(), "stored object");

        let asset = Asset {
            id: id.clone(),
            bucket: self.objects.bucket().to_string(),
            object_key,
            mime_type,
            size_bytes: upload.effective_size() as i64,
            caption: None,
            content_text: None,
            metadata: serde_json::json!({ "original_filename": upload.filename }),
            status: AssetStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store
            .insert_asset(&asset)
            .await
            .map_err(Error::MetadataStore)?;

        let task = ProcessingTask::queued(&id, now);
        self.store
            .insert_task(&task)
            .await
            .map_err(Error::MetadataStore)?;

        self.queue.push(&id).await.map_err(Error::Queue)?;
        info!(asset_id = %id, task_id = %task.id, "asset queued for processing");

        Ok(asset)
    }

    pub async fn asset_status(&self, id: &str) -> Result<AssetStatusReport> {
        let asset = self.require(id).await?;
        let task = self
            .store
            .latest_task(id)
            .await
            .map_err(Error::MetadataStore)?;
        Ok(AssetStatusReport {
            asset_id: asset.id,
            status: asset.status,
            task,
        })
    }

    /// Newest first. `page` below 1 means 1; `per_page` is clamped into
    /// `[1, MAX_PER_PAGE]` with non-positive meaning the default.
    pub async fn list_assets(
        &self,
        status: Option<AssetStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<AssetListing> {
        let page = page.max(1);
        let per_page = if per_page <= 0 {
            DEFAULT_PER_PAGE
        } else {
            per_page.min(MAX_PER_PAGE)
        };

        let found = self
            .store
            .list_assets(status, (page - 1) * per_page, per_page)
            .await
            .map_err(Error::MetadataStore)?;

        let mut assets = Vec::with_capacity(found.assets.len());
        for asset in found.assets {
            assets.push(self.view(asset).await);
        }
        Ok(AssetListing {
            assets,
            total: found.total,
            page,
            per_page,
        })
    }

    pub async fn get_asset(&self, id: &str) -> Result<AssetView> {
        let asset = self.require(id).await?;
        Ok(self.view(asset).await)
    }

    /// Remove the backing object, then soft-delete the row and its
    /// embedding.
    pub async fn delete_asset(&self, id: &str) -> Result<()> {
        let asset = self.require(id).await?;

        self.objects
            .delete(&asset.bucket, &asset.object_key)
            .await
            .map_err(Error::ObjectStore)?;

        let deleted = self
            .store
            .soft_delete_asset(id, Utc::now())
            .await
            .map_err(Error::MetadataStore)?;
        if !deleted {
            warn!(asset_id = %id, "asset vanished during delete");
            return Err(Error::AssetNotFound(id.to_string()));
        }
        info!(asset_id = %id, "asset deleted");
        Ok(())
    }

    async fn require(&self, id: &str) -> Result<Asset> {
        self.store
            .get_asset(id)
            .await
            .map_err(Error::MetadataStore)?
            .ok_or_else(|| Error::AssetNotFound(id.to_string()))
    }

    async fn view(&self, asset: Asset) -> AssetView {
        let url = presign_or_empty(
            self.objects.as_ref(),
            &asset.bucket,
            &asset.object_key,
            self.presign_ttl,
            self.presign_timeout,
        )
        .await;
        AssetView {
            file_name: asset.file_name().to_string(),
            asset,
            url,
        }
    }
}
