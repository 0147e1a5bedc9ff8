//! Core data models used throughout Asset Harness.
//!
//! These types represent the assets, processing attempts, and embedding rows
//! that flow through ingestion, plus the derived search views built at query
//! time. Timestamps are UTC; the SQLite store persists them as Unix
//! milliseconds.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of an [`Asset`].
///
/// Transitions `Pending → Processing → {Completed, Failed}` are driven by the
/// external processing worker. Ingestion only ever creates `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "PENDING",
            AssetStatus::Processing => "PROCESSING",
            AssetStatus::Completed => "COMPLETED",
            AssetStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(AssetStatus::Pending),
            "PROCESSING" => Ok(AssetStatus::Processing),
            "COMPLETED" => Ok(AssetStatus::Completed),
            "FAILED" => Ok(AssetStatus::Failed),
            other => bail!("unknown asset status: '{}'", other),
        }
    }
}

/// Pipeline stage of a [`ProcessingTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStage {
    Queued,
    Downloading,
    Processing,
    Embedding,
    Completed,
    Failed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Queued => "QUEUED",
            ProcessingStage::Downloading => "DOWNLOADING",
            ProcessingStage::Processing => "PROCESSING",
            ProcessingStage::Embedding => "EMBEDDING",
            ProcessingStage::Completed => "COMPLETED",
            ProcessingStage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(ProcessingStage::Queued),
            "DOWNLOADING" => Ok(ProcessingStage::Downloading),
            "PROCESSING" => Ok(ProcessingStage::Processing),
            "EMBEDDING" => Ok(ProcessingStage::Embedding),
            "COMPLETED" => Ok(ProcessingStage::Completed),
            "FAILED" => Ok(ProcessingStage::Failed),
            other => bail!("unknown processing stage: '{}'", other),
        }
    }
}

/// A stored user file plus its derived metadata.
///
/// `caption` and `content_text` are only populated once the asset reaches
/// [`AssetStatus::Completed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub id: String,
    pub bucket: String,
    pub object_key: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub caption: Option<String>,
    pub content_text: Option<String>,
    pub metadata: serde_json::Value,
    pub status: AssetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Asset {
    /// Display name derived from the last segment of the object key.
    pub fn file_name(&self) -> &str {
        crate::text::file_name_from_key(&self.object_key)
    }
}

/// One attempt at processing an [`Asset`].
///
/// An asset may accumulate several rows (retries); the most recent one
/// reflects the current processing state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingTask {
    pub id: String,
    pub asset_id: String,
    pub status: AssetStatus,
    pub stage: ProcessingStage,
    pub progress: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingTask {
    /// A freshly queued attempt for `asset_id`.
    pub fn queued(asset_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset_id.to_string(),
            status: AssetStatus::Pending,
            stage: ProcessingStage::Queued,
            progress: 0.0,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Semantic (and optional visual) vectors for an asset. One-to-one with
/// [`Asset`], keyed by the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub asset_id: String,
    pub semantic: Option<Vec<f32>>,
    pub visual: Option<Vec<f32>>,
}

/// Worker-produced analysis that moves an asset to `COMPLETED`.
#[derive(Debug, Clone, Default)]
pub struct AssetAnalysis {
    pub caption: Option<String>,
    pub content_text: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// A best-effort signal that may be missing or may have failed.
///
/// Keeps "signal absent" distinct from "signal errored" instead of
/// swallowing the failure. Neither variant ever fails the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Present(T),
    Absent,
    Errored(String),
}

impl<T> Signal<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Signal::Present(_))
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Signal::Errored(_))
    }

    pub fn present(&self) -> Option<&T> {
        match self {
            Signal::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Collapse to a value, using `fallback` when absent or errored.
    pub fn unwrap_or(self, fallback: T) -> T {
        match self {
            Signal::Present(v) => v,
            _ => fallback,
        }
    }

    /// Status without the payload, for reporting.
    pub fn state(&self) -> SignalState {
        match self {
            Signal::Present(_) => SignalState::Present,
            Signal::Absent => SignalState::Absent,
            Signal::Errored(_) => SignalState::Errored,
        }
    }
}

impl<T> From<anyhow::Result<Option<T>>> for Signal<T> {
    fn from(res: anyhow::Result<Option<T>>) -> Self {
        match res {
            Ok(Some(v)) => Signal::Present(v),
            Ok(None) => Signal::Absent,
            Err(e) => Signal::Errored(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Present,
    Absent,
    Errored,
}

/// A search result: an [`Asset`] view plus its computed score. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAsset {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_preview: String,
    pub processing_status: AssetStatus,
    pub score: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_through_str() {
        for status in [
            AssetStatus::Pending,
            AssetStatus::Processing,
            AssetStatus::Completed,
            AssetStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AssetStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<AssetStatus>().is_err());
        assert_eq!(
            "completed".parse::<AssetStatus>().unwrap(),
            AssetStatus::Completed
        );
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&AssetStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
    }

    #[test]
    fn test_queued_task_defaults() {
        let task = ProcessingTask::queued("a1", Utc::now());
        assert_eq!(task.stage, ProcessingStage::Queued);
        assert_eq!(task.status, AssetStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_signal_from_result() {
        let present: Signal<u8> = Ok(Some(3)).into();
        assert_eq!(present, Signal::Present(3));

        let absent: Signal<u8> = Ok(None).into();
        assert_eq!(absent.state(), SignalState::Absent);

        let errored: Signal<u8> = Err(anyhow::anyhow!("timeout")).into();
        assert!(errored.is_errored());
        assert_eq!(errored.unwrap_or(7), 7);
    }
}
