//! # Asset Harness
//!
//! Asset ingestion and hybrid retrieval for a personal file library, with
//! retrieval-augmented chat on top.
//!
//! Uploads are validated, written to an S3-compatible object store, recorded
//! as `PENDING` assets in SQLite, and handed to an external processing worker
//! through a durable queue. Once the worker has captioned, extracted, and
//! embedded an asset it becomes searchable.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐   ┌─────────┐
//! │  Upload  │──▶│ Object store │──▶│   SQLite   │──▶│  Queue  │──▶ worker
//! └──────────┘   └──────────────┘   │ assets+vec │   └─────────┘
//!                                   └─────┬──────┘
//!                      ┌──────────────────┤
//!                      ▼                  ▼
//!                ┌──────────┐       ┌──────────┐
//!                │  Search  │──────▶│   Chat   │──▶ LLM
//!                │ lex+vec  │       │  (RAG)   │
//!                └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ah init                         # create database and bucket
//! ah upload ./scans/invoice.pdf   # ingest a file
//! ah search "march invoice"       # hybrid search
//! ah chat "what did I pay in march?"
//! ah serve                        # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed operation errors |
//! | [`ingest`] | Upload validation and the ingestion state machine |
//! | [`search`] | Hybrid lexical + vector retrieval |
//! | [`rag`] | Context assembly and answer synthesis |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat completion client |
//! | [`object_store`] | S3 and in-memory object storage |
//! | [`queue`] | Processing task queue |
//! | [`store`] | Metadata store trait and in-memory backend |
//! | [`sqlite_store`] | SQLite metadata store |
//! | [`server`] | HTTP server |
//! | [`services`] | Service graph construction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod object_store;
pub mod queue;
pub mod rag;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;
pub mod store;
pub mod text;

pub use error::{Error, ErrorKind, Result};
