mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use asset_harness::config::{LlmConfig, RagConfig};
use asset_harness::embedding::DisabledProvider;
use asset_harness::object_store::MemoryObjectStore;
use asset_harness::rag::{HistoryTurn, RagAssembler, EMPTY_ANSWER};
use asset_harness::store::memory::InMemoryStore;
use asset_harness::store::MetadataStore;
use asset_harness::{Error, ErrorKind};

use common::{completed_asset, dims, engine, RecordingGenerator};

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

async fn assembler(generator: Arc<RecordingGenerator>, assets: usize) -> RagAssembler {
    let store = Arc::new(InMemoryStore::new(dims()));
    for i in 0..assets {
        store
            .insert_asset(&completed_asset(
                &format!("inv{:02}", i),
                &format!("invoice_{:02}.pdf", i),
                "application/pdf",
                Some("monthly invoice"),
                Some("Amount due"),
                t0(),
            ))
            .await
            .unwrap();
    }
    let retrieval = Arc::new(engine(
        store,
        Arc::new(MemoryObjectStore::new("assets")),
        Arc::new(DisabledProvider),
    ));
    RagAssembler::new(
        retrieval,
        generator,
        RagConfig::default(),
        LlmConfig::default(),
    )
}

#[tokio::test]
async fn test_answer_builds_prompt_from_history_and_context() {
    let generator = Arc::new(RecordingGenerator::answering("  You paid 120 EUR [1].  "));
    let rag = assembler(generator.clone(), 1).await;
    let history = vec![
        HistoryTurn {
            role: "user".into(),
            content: "hi".into(),
        },
        HistoryTurn {
            role: "assistant".into(),
            content: "  ".into(),
        },
        HistoryTurn {
            role: "ASSISTANT".into(),
            content: "hello, ask me about your files".into(),
        },
    ];

    let answer = rag
        .answer_at("  invoice  ", &history, 0, t0())
        .await
        .unwrap();

    assert_eq!(answer.answer, "You paid 120 EUR [1].");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].id, "inv00");

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.model, "local-model");
    assert!(!req.stream);

    let roles: Vec<&str> = req.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(req.messages[0].content, RagConfig::default().system_prompt);

    let last = &req.messages[3].content;
    assert!(last.starts_with("User query:\ninvoice\n\nRetrieved context:\n"));
    assert!(last.contains("[1] id=inv00, file=invoice_00.pdf, mime=application/pdf\n"));
    assert!(last.contains("caption: monthly invoice\n"));
    assert!(last.contains("text: Amount due\n"));
}

#[tokio::test]
async fn test_top_k_is_clamped() {
    let generator = Arc::new(RecordingGenerator::answering("ok"));
    let rag = assembler(generator, 20).await;

    assert_eq!(rag.clamp_top_k(0), 5);
    assert_eq!(rag.clamp_top_k(-3), 5);
    assert_eq!(rag.clamp_top_k(50), 12);
    assert_eq!(rag.clamp_top_k(3), 3);

    let defaulted = rag.answer_at("invoice", &[], 0, t0()).await.unwrap();
    assert_eq!(defaulted.sources.len(), 5);
    let capped = rag.answer_at("invoice", &[], 50, t0()).await.unwrap();
    assert_eq!(capped.sources.len(), 12);
}

#[tokio::test]
async fn test_empty_query_is_rejected_before_generation() {
    let generator = Arc::new(RecordingGenerator::answering("ok"));
    let rag = assembler(generator.clone(), 1).await;

    let err = rag.answer_at(" \n ", &[], 5, t0()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn test_provider_error_becomes_synthesis_error() {
    let generator = Arc::new(RecordingGenerator::failing(500, "model crashed"));
    let rag = assembler(generator, 1).await;

    let err = rag.answer_at("invoice", &[], 5, t0()).await.unwrap_err();
    match err {
        Error::Synthesis { status, ref body } => {
            assert_eq!(status, Some(500));
            assert_eq!(body, "model crashed");
        }
        other => panic!("expected synthesis error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_blank_answer_is_replaced() {
    let generator = Arc::new(RecordingGenerator::answering(" \n\t "));
    let rag = assembler(generator, 0).await;

    let answer = rag.answer_at("anything", &[], 5, t0()).await.unwrap();
    assert_eq!(answer.answer, EMPTY_ANSWER);
    assert!(answer.sources.is_empty());
}
