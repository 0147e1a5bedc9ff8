mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use asset_harness::config::Config;
use asset_harness::models::AssetAnalysis;
use asset_harness::server::router;
use asset_harness::store::MetadataStore;

use common::{memory_services, MemoryGraph, RecordingGenerator};

const BOUNDARY: &str = "AssetHarnessBoundary";

fn build_app(generator: RecordingGenerator) -> (Router, MemoryGraph) {
    let mut config = Config::with_db_path("unused.sqlite");
    config.ingest.max_upload_bytes = 64;
    let graph = memory_services(config, generator);
    (router(graph.services.clone()), graph)
}

fn multipart(filename: &str, content_type: Option<&str>, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    if let Some(ct) = content_type {
        body.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/assets")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn chat(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (app, _graph) = build_app(RecordingGenerator::answering("ok"));
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_ai_health_reports_disabled_embedding() {
    let (app, _graph) = build_app(RecordingGenerator::answering("ok"));
    let (status, body) = send(&app, get("/api/v1/ai/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["embedding"]["available"], false);
    assert_eq!(body["llm"]["available"], true);
}

#[tokio::test]
async fn test_upload_then_fetch_status_and_delete() {
    let (app, graph) = build_app(RecordingGenerator::answering("ok"));

    let (status, body) = send(&app, multipart("scan.pdf", Some("application/pdf"), b"%PDF-1.7")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["size_bytes"], 8);
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["file_name"], format!("{}.pdf", id));
    assert!(body["url"].as_str().unwrap().starts_with("memory://asset-harness/"));
    assert_eq!(graph.queue.items(), vec![id.clone()]);

    let (status, body) = send(&app, get(&format!("/api/v1/assets/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["original_filename"], "scan.pdf");

    let (status, body) = send(&app, get(&format!("/api/v1/assets/{}/status", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["task"]["stage"], "QUEUED");

    let (status, body) = send(&app, get("/api/v1/assets?status=pending&per_page=abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["per_page"], 20);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/assets/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert!(graph.objects.is_empty());

    let (status, body) = send(&app, get(&format!("/api/v1/assets/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "asset_not_found");
}

#[tokio::test]
async fn test_upload_guesses_missing_content_type() {
    let (app, _graph) = build_app(RecordingGenerator::answering("ok"));
    let (status, body) = send(&app, multipart("notes.md", None, b"# hi")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mime_type"], "text/markdown");
}

#[tokio::test]
async fn test_upload_validation_errors() {
    let (app, graph) = build_app(RecordingGenerator::answering("ok"));

    let (status, body) = send(&app, multipart("clip.mp4", Some("video/mp4"), b"....")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_file_type");

    let big = vec![b'x'; 200];
    let (status, body) = send(&app, multipart("big.txt", Some("text/plain"), &big)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "file_too_large");

    assert!(graph.objects.is_empty());
    assert_eq!(graph.store.asset_count(), 0);
}

#[tokio::test]
async fn test_search_endpoint() {
    let (app, graph) = build_app(RecordingGenerator::answering("ok"));
    let (_, body) = send(&app, multipart("march.pdf", Some("application/pdf"), b"%PDF")).await;
    let id = body["id"].as_str().unwrap().to_string();
    graph
        .store
        .complete_asset(
            &id,
            &AssetAnalysis {
                caption: Some("March invoice".into()),
                content_text: Some("Total due".into()),
                metadata: None,
            },
            chrono::Utc::now(),
        )
        .await
        .unwrap();

    let (status, body) = send(&app, get("/api/v1/search?q=%20invoice%20&limit=abc&threshold=")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "invoice");
    assert_eq!(body["total"], 1);
    assert_eq!(body["vector_signal"], "absent");
    let hit = &body["results"][0];
    assert_eq!(hit["id"], id.as_str());
    assert_eq!(hit["caption"], "March invoice");
    assert_eq!(hit["processing_status"], "COMPLETED");
    assert!(hit["score"].as_f64().unwrap() > 0.9);

    let (status, body) = send(&app, get("/api/v1/search?q=xyzzy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, body) = send(&app, get("/api/v1/search?q=xyzzy&threshold=NaN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_chat_endpoint() {
    let (app, graph) = build_app(RecordingGenerator::answering("Nothing on file."));

    let (status, body) = send(&app, chat("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");

    let (status, body) = send(&app, chat(r#"{"query": "   "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");

    let payload = json!({
        "query": "what did I pay?",
        "history": [{ "role": "user", "content": "hi" }, { "role": "assistant", "content": "" }],
        "top_k": 3
    });
    let (status, body) = send(&app, chat(&payload.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Nothing on file.");
    assert_eq!(body["sources"], json!([]));

    let requests = graph.generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.len(), 3);
}

#[tokio::test]
async fn test_chat_upstream_failure_is_bad_gateway() {
    let (app, _graph) = build_app(RecordingGenerator::failing(500, "boom"));
    let (status, body) = send(&app, chat(r#"{"query": "hello"}"#)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "synthesis_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("boom"));
}
