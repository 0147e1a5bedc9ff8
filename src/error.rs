//! Typed errors surfaced by the ingestion, retrieval, and chat operations.
//!
//! Collaborator seams (metadata store, object store, queue, providers) speak
//! `anyhow::Result`. The core converts those into [`Error`] at the point of
//! use so every rejected request carries a stable [`ErrorKind`] and
//! [`Error::code`] that callers can branch on without matching messages.
//!
//! | Kind | Variants | HTTP |
//! |------|----------|------|
//! | `validation` | `FileTooLarge`, `InvalidFileType`, `InvalidRequest` | 400 |
//! | `not_found` | `AssetNotFound` | 404 |
//! | `dependency` | `ObjectStore`, `MetadataStore`, `Queue`, `Retrieval` | 500 |
//! | `synthesis` | `Synthesis` | 502 |
//!
//! Degraded signals (embedding and URL-minting failures) never become an
//! [`Error`]; see [`crate::models::Signal`].

use serde::Serialize;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client-correctable input problem. Rejected before any side effect.
    Validation,
    /// The referenced asset does not exist.
    NotFound,
    /// A required collaborator (store, object store, queue) failed.
    Dependency,
    /// The text generation provider failed.
    Synthesis,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("object store error: {0:#}")]
    ObjectStore(anyhow::Error),

    #[error("metadata store error: {0:#}")]
    MetadataStore(anyhow::Error),

    #[error("queue error: {0:#}")]
    Queue(anyhow::Error),

    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("{}", synthesis_message(.status, .body))]
    Synthesis { status: Option<u16>, body: String },
}

fn synthesis_message(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("llm request failed: status={} body={}", code, body),
        None => format!("llm request failed: {}", body),
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileTooLarge { .. } | Error::InvalidFileType(_) | Error::InvalidRequest(_) => {
                ErrorKind::Validation
            }
            Error::AssetNotFound(_) => ErrorKind::NotFound,
            Error::ObjectStore(_)
            | Error::MetadataStore(_)
            | Error::Queue(_)
            | Error::Retrieval(_) => ErrorKind::Dependency,
            Error::Synthesis { .. } => ErrorKind::Synthesis,
        }
    }

    /// Stable machine-readable code, e.g. `"file_too_large"`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::FileTooLarge { .. } => "file_too_large",
            Error::InvalidFileType(_) => "invalid_file_type",
            Error::InvalidRequest(_) => "invalid_request",
            Error::AssetNotFound(_) => "asset_not_found",
            Error::ObjectStore(_) => "object_store_error",
            Error::MetadataStore(_) => "metadata_store_error",
            Error::Queue(_) => "queue_error",
            Error::Retrieval(_) => "retrieval_error",
            Error::Synthesis { .. } => "synthesis_error",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
