//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Liveness (returns version) |
//! | `GET`    | `/api/v1/ai/health` | Embedding and LLM reachability |
//! | `POST`   | `/api/v1/assets` | Upload (multipart field `file`) |
//! | `GET`    | `/api/v1/assets` | List (`status`, `page`, `per_page`) |
//! | `GET`    | `/api/v1/assets/{id}` | One asset with a download URL |
//! | `GET`    | `/api/v1/assets/{id}/status` | Status plus latest processing task |
//! | `DELETE` | `/api/v1/assets/{id}` | Delete object, soft-delete row |
//! | `GET`    | `/api/v1/search` | Hybrid search (`q`, `limit`, `threshold`) |
//! | `POST`   | `/api/v1/chat` | Retrieval-augmented answer |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "file_too_large", "message": "file too large: ..." } }
//! ```
//!
//! The status comes from [`ErrorKind`]: validation 400, not found 404,
//! dependency 500, synthesis 502.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::ingest::{AssetListing, AssetStatusReport, AssetView, Upload};
use crate::models::{AssetStatus, ScoredAsset, SignalState};
use crate::rag::{HistoryTurn, RagAnswer};
use crate::services::{AiHealth, Services};
use crate::text;

/// Open every collaborator from `config` and serve until terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Services::from_config(config).await?;
    let app = router(services);

    info!(addr = %bind_addr, "server listening");
    println!("Asset Harness listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router over an existing service graph.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/ai/health", get(handle_ai_health))
        .route(
            "/api/v1/assets",
            post(handle_upload)
                .layer(DefaultBodyLimit::disable())
                .get(handle_list_assets),
        )
        .route(
            "/api/v1/assets/{id}",
            get(handle_get_asset).delete(handle_delete_asset),
        )
        .route("/api/v1/assets/{id}/status", get(handle_asset_status))
        .route("/api/v1/search", get(handle_search))
        .route("/api/v1/chat", post(handle_chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Synthesis => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    Error::InvalidRequest(message.into()).into()
}

/// Lenient numeric query parameter: missing or unparsable means `fallback`.
fn parse_or<T: std::str::FromStr>(raw: Option<&str>, fallback: T) -> T {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_ai_health(State(services): State<Services>) -> Json<AiHealth> {
    Json(services.ai_health().await)
}

// ============ Assets ============

async fn handle_upload(
    State(services): State<Services>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AssetView>), AppError> {
    let limit = services.ingest.config().max_upload_bytes;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .filter(|m| !m.trim().is_empty() && m != "application/octet-stream")
            .unwrap_or_else(|| text::guess_mime_type(&filename).to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > limit {
                return Err(Error::FileTooLarge {
                    size: bytes.len() as u64,
                    limit,
                }
                .into());
            }
        }

        let asset = services
            .ingest
            .ingest(Upload {
                filename: &filename,
                mime_type: &mime_type,
                declared_size: bytes.len() as u64,
                bytes: &bytes,
            })
            .await?;
        let view = services.ingest.get_asset(&asset.id).await?;
        return Ok((StatusCode::CREATED, Json(view)));
    }

    Err(bad_request("multipart field 'file' is required"))
}

#[derive(Deserialize)]
struct ListParams {
    status: Option<String>,
    page: Option<String>,
    per_page: Option<String>,
}

async fn handle_list_assets(
    State(services): State<Services>,
    Query(params): Query<ListParams>,
) -> Result<Json<AssetListing>, AppError> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<AssetStatus>()
                .map_err(|e| bad_request(e.to_string()))?,
        ),
    };
    let listing = services
        .ingest
        .list_assets(
            status,
            parse_or(params.page.as_deref(), 1),
            parse_or(params.per_page.as_deref(), 0),
        )
        .await?;
    Ok(Json(listing))
}

async fn handle_get_asset(
    State(services): State<Services>,
    Path(id): Path<String>,
) -> Result<Json<AssetView>, AppError> {
    Ok(Json(services.ingest.get_asset(&id).await?))
}

async fn handle_asset_status(
    State(services): State<Services>,
    Path(id): Path<String>,
) -> Result<Json<AssetStatusReport>, AppError> {
    Ok(Json(services.ingest.asset_status(&id).await?))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_asset(
    State(services): State<Services>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    services.ingest.delete_asset(&id).await?;
    Ok(Json(MessageResponse {
        message: "Asset deleted successfully".to_string(),
    }))
}

// ============ GET /api/v1/search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<String>,
    threshold: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    total: usize,
    results: Vec<ScoredAsset>,
    vector_signal: SignalState,
}

async fn handle_search(
    State(services): State<Services>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.unwrap_or_default().trim().to_string();
    let defaults = services.retrieval.config();
    let limit = parse_or(params.limit.as_deref(), defaults.default_limit);
    let threshold = parse_or(params.threshold.as_deref(), defaults.default_threshold);

    let outcome = services.retrieval.search(&query, limit, threshold).await?;
    Ok(Json(SearchResponse {
        query,
        total: outcome.results.len(),
        vector_signal: outcome.vector_signal.state(),
        results: outcome.results,
    }))
}

// ============ POST /api/v1/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    history: Vec<HistoryTurn>,
    #[serde(default)]
    top_k: i64,
}

async fn handle_chat(
    State(services): State<Services>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<RagAnswer>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let answer = services
        .rag
        .answer(&req.query, &req.history, req.top_k)
        .await?;
    Ok(Json(answer))
}
