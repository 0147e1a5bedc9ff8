//! SQLite-backed [`MetadataStore`] implementation.
//!
//! Timestamps are stored as Unix milliseconds so that creation order is
//! stable for assets created within the same second. Vectors are stored as
//! little-endian `f32` BLOBs; cosine distance is computed here, after the
//! rows are read, and the result is ordered nearest first.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Asset, AssetAnalysis, AssetStatus, EmbeddingRecord, ProcessingTask};
use crate::store::{AssetPage, MetadataStore, Neighbor, VectorDims};

/// SQLite implementation of the [`MetadataStore`] trait.
///
/// Wraps a [`SqlitePool`] and translates every method into one or more SQL
/// statements against the schema created by [`crate::migrate`].
pub struct SqliteStore {
    pool: SqlitePool,
    dims: VectorDims,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, dims: VectorDims) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const ASSET_COLUMNS: &str = "id, bucket, object_key, mime_type, size_bytes, caption, \
     content_text, metadata_json, status, created_at, updated_at, deleted_at";

const TASK_COLUMNS: &str =
    "id, asset_id, status, stage, progress, error_message, created_at, started_at, completed_at";

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("invalid timestamp: {}", ms))
}

fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

fn asset_from_row(row: &SqliteRow) -> Result<Asset> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("corrupt metadata for asset {}", id))?;
    let status: String = row.get("status");
    Ok(Asset {
        id,
        bucket: row.get("bucket"),
        object_key: row.get("object_key"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        caption: row.get("caption"),
        content_text: row.get("content_text"),
        metadata,
        status: status.parse()?,
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
        deleted_at: opt_from_millis(row.get("deleted_at"))?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<ProcessingTask> {
    let status: String = row.get("status");
    let stage: String = row.get("stage");
    Ok(ProcessingTask {
        id: row.get("id"),
        asset_id: row.get("asset_id"),
        status: status.parse()?,
        stage: stage.parse()?,
        progress: row.get("progress"),
        error_message: row.get("error_message"),
        created_at: from_millis(row.get("created_at"))?,
        started_at: opt_from_millis(row.get("started_at"))?,
        completed_at: opt_from_millis(row.get("completed_at"))?,
    })
}

/// Decode a stored vector, treating any length mismatch as corruption.
fn decode_vector(asset_id: &str, blob: &[u8], expected: usize) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        anyhow::bail!(
            "corrupt embedding for asset {}: {} bytes is not a whole number of f32 values",
            asset_id,
            blob.len()
        );
    }
    let vec = blob_to_vec(blob);
    if vec.len() != expected {
        anyhow::bail!(
            "corrupt embedding for asset {}: {} dims, expected {}",
            asset_id,
            vec.len(),
            expected
        );
    }
    Ok(vec)
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn insert_asset(&self, asset: &Asset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, bucket, object_key, mime_type, size_bytes, caption,
                                content_text, metadata_json, status, created_at,
                                updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&asset.id)
        .bind(&asset.bucket)
        .bind(&asset.object_key)
        .bind(&asset.mime_type)
        .bind(asset.size_bytes)
        .bind(&asset.caption)
        .bind(&asset.content_text)
        .bind(asset.metadata.to_string())
        .bind(asset.status.as_str())
        .bind(to_millis(asset.created_at))
        .bind(to_millis(asset.updated_at))
        .bind(asset.deleted_at.map(to_millis))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert asset {}", asset.id))?;
        Ok(())
    }

    async fn insert_task(&self, task: &ProcessingTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_tasks (id, asset_id, status, stage, progress, error_message,
                                          created_at, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.asset_id)
        .bind(task.status.as_str())
        .bind(task.stage.as_str())
        .bind(task.progress)
        .bind(&task.error_message)
        .bind(to_millis(task.created_at))
        .bind(task.started_at.map(to_millis))
        .bind(task.completed_at.map(to_millis))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert processing task for asset {}", task.asset_id))?;
        Ok(())
    }

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM assets WHERE id = ? AND deleted_at IS NULL",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(asset_from_row).transpose()
    }

    async fn list_assets(
        &self,
        status: Option<AssetStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<AssetPage> {
        let status_str = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assets WHERE deleted_at IS NULL AND (? IS NULL OR status = ?)",
        )
        .bind(status_str)
        .bind(status_str)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM assets \
             WHERE deleted_at IS NULL AND (? IS NULL OR status = ?) \
             ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            ASSET_COLUMNS
        ))
        .bind(status_str)
        .bind(status_str)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        let assets = rows.iter().map(asset_from_row).collect::<Result<Vec<_>>>()?;
        Ok(AssetPage { assets, total })
    }

    async fn recent_completed(&self, limit: i64) -> Result<Vec<Asset>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM assets \
             WHERE deleted_at IS NULL AND status = 'COMPLETED' \
             ORDER BY created_at DESC, id ASC LIMIT ?",
            ASSET_COLUMNS
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(asset_from_row).collect()
    }

    async fn nearest_assets(&self, query: &[f32], limit: i64) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query(
            r#"
            SELECT e.asset_id, e.semantic
            FROM asset_embeddings e
            JOIN assets a ON a.id = e.asset_id
            WHERE a.deleted_at IS NULL AND e.semantic IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut neighbors = Vec::with_capacity(rows.len());
        for row in &rows {
            let asset_id: String = row.get("asset_id");
            let blob: Vec<u8> = row.get("semantic");
            let vector = decode_vector(&asset_id, &blob, self.dims.semantic)?;
            let distance = 1.0 - cosine_similarity(query, &vector) as f64;
            neighbors.push(Neighbor { asset_id, distance });
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
        let row = sqlx::query(&format!(
            "SELECT {} FROM processing_tasks WHERE asset_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            TASK_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn soft_delete_asset(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE assets SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(to_millis(now))
        .bind(to_millis(now))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM asset_embeddings WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn set_asset_status(
        &self,
        id: &str,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE assets SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(status.as_str())
        .bind(to_millis(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_asset(
        &self,
        id: &str,
        analysis: &AssetAnalysis,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assets SET
                caption = ?,
                content_text = ?,
                metadata_json = COALESCE(?, metadata_json),
                status = 'COMPLETED',
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&analysis.caption)
        .bind(&analysis.content_text)
        .bind(analysis.metadata.as_ref().map(|m| m.to_string()))
        .bind(to_millis(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        self.dims.check(record)?;
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO asset_embeddings (asset_id, semantic_dims, semantic, visual_dims, visual, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(asset_id) DO UPDATE SET
                semantic_dims = excluded.semantic_dims,
                semantic = excluded.semantic,
                visual_dims = excluded.visual_dims,
                visual = excluded.visual,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.asset_id)
        .bind(record.semantic.as_ref().map(|v| v.len() as i64))
        .bind(record.semantic.as_deref().map(vec_to_blob))
        .bind(record.visual.as_ref().map(|v| v.len() as i64))
        .bind(record.visual.as_deref().map(vec_to_blob))
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert embedding for asset {}", record.asset_id))?;

        Ok(())
    }

    async fn update_task(&self, task: &ProcessingTask) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_tasks SET
                status = ?, stage = ?, progress = ?, error_message = ?,
                started_at = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(task.stage.as_str())
        .bind(task.progress)
        .bind(&task.error_message)
        .bind(task.started_at.map(to_millis))
        .bind(task.completed_at.map(to_millis))
        .bind(&task.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("processing task {} not found", task.id);
        }
        Ok(())
    }
}
