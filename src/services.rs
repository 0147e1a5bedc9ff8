//! Explicitly constructed service graph.
//!
//! Every collaborator is built once from [`Config`] and handed to the
//! coordinator, engine, and assembler as an `Arc<dyn Trait>`. Tests build
//! the same graph from in-memory fakes with [`Services::from_parts`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::ingest::IngestionCoordinator;
use crate::llm::{OpenAiChatClient, ProbeStatus, TextGenerator};
use crate::migrate;
use crate::object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use crate::queue::{SqliteQueue, TaskQueue};
use crate::rag::RagAssembler;
use crate::search::RetrievalEngine;
use crate::sqlite_store::SqliteStore;
use crate::store::{MetadataStore, VectorDims};

/// The raw collaborators behind a [`Services`] graph.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn TextGenerator>,
}

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub ingest: Arc<IngestionCoordinator>,
    pub retrieval: Arc<RetrievalEngine>,
    pub rag: Arc<RagAssembler>,
    pub collaborators: Collaborators,
}

/// Reachability of the AI dependencies. Never fails.
#[derive(Debug, Clone, Serialize)]
pub struct AiHealth {
    pub embedding: ProbeStatus,
    pub llm: ProbeStatus,
}

impl Services {
    /// Open the database (running migrations), connect the object store,
    /// and construct providers from `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::migrate(&pool).await?;

        let dims = VectorDims {
            semantic: config.embedding.dims,
            visual: config.embedding.visual_dims,
        };
        let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(pool.clone(), dims));
        let queue: Arc<dyn TaskQueue> = Arc::new(SqliteQueue::new(pool, &config.queue.name));

        let objects: Arc<dyn ObjectStore> = match config.storage.provider.as_str() {
            "memory" => Arc::new(MemoryObjectStore::new(&config.storage.bucket)),
            _ => Arc::new(
                S3ObjectStore::from_config(&config.storage)
                    .context("Failed to configure S3 object store")?,
            ),
        };

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let generator: Arc<dyn TextGenerator> = Arc::new(OpenAiChatClient::new(&config.llm)?);

        Ok(Self::from_parts(
            config,
            Collaborators {
                store,
                objects,
                queue,
                embedder,
                generator,
            },
        ))
    }

    pub fn from_parts(config: Config, parts: Collaborators) -> Self {
        let presign_ttl = Duration::from_secs(config.storage.presign_ttl_secs);

        let ingest = Arc::new(IngestionCoordinator::new(
            parts.store.clone(),
            parts.objects.clone(),
            parts.queue.clone(),
            config.ingest.clone(),
            presign_ttl,
        ));
        let retrieval = Arc::new(RetrievalEngine::new(
            parts.store.clone(),
            parts.objects.clone(),
            parts.embedder.clone(),
            config.retrieval.clone(),
            presign_ttl,
        ));
        let rag = Arc::new(RagAssembler::new(
            retrieval.clone(),
            parts.generator.clone(),
            config.rag.clone(),
            config.llm.clone(),
        ));

        Self {
            config: Arc::new(config),
            ingest,
            retrieval,
            rag,
            collaborators: parts,
        }
    }

    pub async fn ai_health(&self) -> AiHealth {
        let embedder = &self.collaborators.embedder;
        let (embedding, llm) = tokio::join!(
            async {
                if !embedder.is_enabled() {
                    return ProbeStatus {
                        available: false,
                        message: "embedding provider disabled".to_string(),
                    };
                }
                match embedder.health().await {
                    Ok(()) => ProbeStatus {
                        available: true,
                        message: format!("{} reachable", embedder.model_name()),
                    },
                    Err(e) => ProbeStatus {
                        available: false,
                        message: format!("{:#}", e),
                    },
                }
            },
            self.collaborators.generator.health(),
        );
        AiHealth { embedding, llm }
    }
}
