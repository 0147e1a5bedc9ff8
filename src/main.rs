//! # Asset Harness CLI (`ah`)
//!
//! The `ah` binary drives ingestion, search, and chat against the configured
//! database and object store, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! ah --config ./config/ah.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ah init` | Create the SQLite database, run migrations, ensure the bucket |
//! | `ah upload <path>` | Ingest a local file |
//! | `ah search "<query>"` | Hybrid search over completed assets |
//! | `ah chat "<query>"` | Retrieval-augmented answer |
//! | `ah status <id>` | Asset status and latest processing task |
//! | `ah assets list` | Page through assets |
//! | `ah assets get <id>` | One asset with a download URL |
//! | `ah assets delete <id>` | Delete the object and soft-delete the asset |
//! | `ah health` | Probe the embedding and LLM providers |
//! | `ah serve` | Start the HTTP server |
//!
//! Logs go to stderr and honour `RUST_LOG`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use asset_harness::config::{self, Config};
use asset_harness::ingest::{AssetView, Upload};
use asset_harness::models::AssetStatus;
use asset_harness::rag::HistoryTurn;
use asset_harness::server;
use asset_harness::services::Services;
use asset_harness::text;

/// Asset Harness CLI: upload assets, search them, and chat over them.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ah.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ah",
    about = "Upload, search and chat over personal assets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ah.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the storage bucket.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest a local file.
    ///
    /// Stores the bytes, records a PENDING asset, and queues it for the
    /// processing worker.
    Upload {
        /// File to upload.
        path: PathBuf,

        /// MIME type. Guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },

    /// Hybrid lexical + vector search over completed assets.
    Search {
        /// The search query. Empty lists the most recent assets.
        #[arg(default_value = "")]
        query: String,

        #[arg(long)]
        limit: Option<i64>,

        /// Minimum score for non-empty queries.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Ask a question answered from the retrieved assets.
    Chat {
        query: String,

        /// Number of sources to retrieve (1 to the configured maximum).
        #[arg(long, default_value_t = 0)]
        top_k: i64,
    },

    /// Show an asset's status and latest processing task.
    Status { id: String },

    /// Manage stored assets.
    Assets {
        #[command(subcommand)]
        action: AssetsAction,
    },

    /// Probe the embedding and LLM providers.
    Health,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum AssetsAction {
    /// List assets, newest first.
    List {
        /// Filter by status (PENDING, PROCESSING, COMPLETED, FAILED).
        #[arg(long)]
        status: Option<AssetStatus>,

        #[arg(long, default_value_t = 1)]
        page: i64,

        #[arg(long, default_value_t = 20)]
        per_page: i64,
    },
    /// Show one asset.
    Get { id: String },
    /// Delete an asset's object and soft-delete its record.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("asset_harness=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(cfg).await?,
        Commands::Serve => server::run_server(cfg).await?,
        command => {
            let services = Services::from_config(cfg).await?;
            run_command(&services, command).await?;
        }
    }

    Ok(())
}

async fn run_init(cfg: Config) -> anyhow::Result<()> {
    let services = Services::from_config(cfg).await?;
    services
        .collaborators
        .objects
        .ensure_bucket()
        .await
        .context("Failed to prepare storage bucket")?;
    println!("Database initialized successfully.");
    println!(
        "Bucket '{}' is ready.",
        services.collaborators.objects.bucket()
    );
    Ok(())
}

async fn run_command(services: &Services, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload { path, mime } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "upload".to_string());
            let mime_type = mime.unwrap_or_else(|| text::guess_mime_type(&filename).to_string());

            let asset = services
                .ingest
                .ingest(Upload {
                    filename: &filename,
                    mime_type: &mime_type,
                    declared_size: bytes.len() as u64,
                    bytes: &bytes,
                })
                .await?;
            println!("Uploaded {} ({} bytes)", filename, asset.size_bytes);
            println!("  id:     {}", asset.id);
            println!("  key:    {}/{}", asset.bucket, asset.object_key);
            println!("  status: {}", asset.status);
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            let defaults = services.retrieval.config();
            let outcome = services
                .retrieval
                .search(
                    &query,
                    limit.unwrap_or(defaults.default_limit),
                    threshold.unwrap_or(defaults.default_threshold),
                )
                .await?;

            if outcome.vector_signal.is_errored() {
                eprintln!("warning: vector search unavailable, results are lexical only");
            }
            if outcome.results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, r) in outcome.results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({}, {})",
                    i + 1,
                    r.score,
                    r.file_name,
                    r.mime_type,
                    r.id
                );
                if let Some(caption) = &r.caption {
                    println!("    caption: {}", caption);
                }
                if !r.content_preview.is_empty() {
                    println!("    text: {}", r.content_preview);
                }
                if !r.url.is_empty() {
                    println!("    url: {}", r.url);
                }
            }
        }
        Commands::Chat { query, top_k } => {
            let history: Vec<HistoryTurn> = Vec::new();
            let answer = services.rag.answer(&query, &history, top_k).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for (i, s) in answer.sources.iter().enumerate() {
                    println!("  [{}] {} ({}) score={:.3}", i + 1, s.file_name, s.id, s.score);
                }
            }
        }
        Commands::Status { id } => {
            let report = services.ingest.asset_status(&id).await?;
            println!("asset:  {}", report.asset_id);
            println!("status: {}", report.status);
            match report.task {
                Some(task) => {
                    println!(
                        "task:   {} stage={} progress={:.0}%",
                        task.id,
                        task.stage,
                        task.progress * 100.0
                    );
                    if let Some(err) = task.error_message {
                        println!("error:  {}", err);
                    }
                }
                None => println!("task:   none"),
            }
        }
        Commands::Assets { action } => match action {
            AssetsAction::List {
                status,
                page,
                per_page,
            } => {
                let listing = services.ingest.list_assets(status, page, per_page).await?;
                println!(
                    "{} assets (page {}, {} per page)",
                    listing.total, listing.page, listing.per_page
                );
                for view in &listing.assets {
                    println!(
                        "  {}  {:<10}  {:>10}  {}",
                        view.asset.id, view.asset.status, view.asset.size_bytes, view.file_name
                    );
                }
            }
            AssetsAction::Get { id } => {
                let view = services.ingest.get_asset(&id).await?;
                print_asset(&view);
            }
            AssetsAction::Delete { id } => {
                services.ingest.delete_asset(&id).await?;
                println!("Deleted {}", id);
            }
        },
        Commands::Health => {
            let health = services.ai_health().await;
            println!(
                "embedding: {} ({})",
                if health.embedding.available { "up" } else { "down" },
                health.embedding.message
            );
            println!(
                "llm:       {} ({})",
                if health.llm.available { "up" } else { "down" },
                health.llm.message
            );
        }
        Commands::Init | Commands::Serve => {}
    }
    Ok(())
}

fn print_asset(view: &AssetView) {
    let asset = &view.asset;
    println!("--- Asset ---");
    println!("id:         {}", asset.id);
    println!("file:       {}", view.file_name);
    println!("mime:       {}", asset.mime_type);
    println!("size:       {} bytes", asset.size_bytes);
    println!("status:     {}", asset.status);
    println!("created_at: {}", asset.created_at.to_rfc3339());
    println!("updated_at: {}", asset.updated_at.to_rfc3339());
    if let Some(caption) = &asset.caption {
        println!("caption:    {}", caption);
    }
    if !view.url.is_empty() {
        println!("url:        {}", view.url);
    }
    if let Some(text) = &asset.content_text {
        println!();
        println!("--- Text ---");
        println!("{}", text);
    }
}
