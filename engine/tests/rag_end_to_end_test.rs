//! End-to-end runs over the sample corpus
//!
//! The model is either an in-process script or a real router talking to a
//! mock Ollama server.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use rerag_engine::config::{LLMConfig, RetryConfig};
use rerag_engine::llm::{ollama::OllamaProvider, router::LLMRouter, LLMProvider};
use rerag_engine::rag::testing::ScriptedModel;
use rerag_engine::rag::{EndReason, Phase, RagSettings, RecursiveRag};
use rerag_engine::store::InMemoryStore;
use sdk::EngineError;

const QUESTION: &str = "RAGシステムの仕組みとベクトルデータベースの選定について教えてください。";

fn settings() -> RagSettings {
    RagSettings {
        retrieval_retry: RetryConfig::none(),
        generation_retry: RetryConfig::none(),
        ..RagSettings::default()
    }
}

fn ollama_router(server: &MockServer) -> Arc<LLMRouter> {
    let providers: Vec<Box<dyn LLMProvider>> =
        vec![Box::new(OllamaProvider::new(server.uri(), "llama3.1:8b"))];
    Arc::new(LLMRouter::new(
        providers,
        Arc::new(LLMConfig {
            default_provider: "ollama".to_string(),
            timeout_secs: 5,
            ..LLMConfig::default()
        }),
    ))
}

#[tokio::test]
async fn test_sample_corpus_run_through_router() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "message": {"role": "assistant", "content": "RAGは検索拡張生成です。"},
            "done": true
        })))
        .mount(&server)
        .await;

    let router = ollama_router(&server);
    let rag = RecursiveRag::new(
        Arc::new(InMemoryStore::sample().unwrap()),
        Arc::<LLMRouter>::clone(&router),
        settings(),
    );

    let outcome = rag.run(QUESTION, 2).await.unwrap();

    assert_eq!(outcome.answer, "RAGは検索拡張生成です。");
    assert!(outcome.recursion_depth <= 2);
    assert!(outcome.recursion_depth >= 1);
    assert_eq!(outcome.stats.model_calls, outcome.stats.rounds + 1);
    assert_eq!(outcome.stats.store_calls, outcome.stats.rounds);
    assert_eq!(outcome.documents.len(), 4 * outcome.stats.rounds as usize);

    // The sample documents point at each other, so something gets followed
    assert!(!outcome.processed_targets.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len() as u32, outcome.stats.model_calls);
    assert_eq!(router.last_provider().as_deref(), Some("ollama"));

    // The final prompt carries every collected document
    let last: serde_json::Value = serde_json::from_slice(&requests[requests.len() - 1].body).unwrap();
    let prompt = last["messages"][0]["content"].as_str().unwrap();
    for doc in &outcome.documents {
        assert!(prompt.contains(doc.as_str()));
    }
    assert_eq!(last["options"]["temperature"], json!(0.0));
}

#[tokio::test]
async fn test_no_recursion_on_sample_corpus() {
    let model = Arc::new(ScriptedModel::constant("answer"));
    let rag = RecursiveRag::new(
        Arc::new(InMemoryStore::sample().unwrap()),
        model.clone(),
        settings(),
    );

    let outcome = rag.run(QUESTION, 0).await.unwrap();

    assert_eq!(outcome.recursion_depth, 1);
    assert_eq!(outcome.documents.len(), 4);
    assert_eq!(outcome.end_reason, EndReason::DepthLimit);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_trace_covers_every_phase_in_order() {
    let model = Arc::new(ScriptedModel::constant("answer"));
    let rag = RecursiveRag::new(Arc::new(InMemoryStore::sample().unwrap()), model, settings());

    let outcome = rag.run(QUESTION, 2).await.unwrap();
    let phases: Vec<Phase> = outcome.trace.iter().map(|e| e.phase).collect();

    assert_eq!(phases.first(), Some(&Phase::Retrieving));
    assert_eq!(phases.last(), Some(&Phase::Finalizing));
    for pair in phases.windows(2) {
        let legal = matches!(
            (pair[0], pair[1]),
            (Phase::Retrieving, Phase::Generating)
                | (Phase::Generating, Phase::Deciding)
                | (Phase::Deciding, Phase::Retrieving)
                | (Phase::Deciding, Phase::Finalizing)
        );
        assert!(legal, "illegal transition {:?}", pair);
    }

    let (finalizing, rest) = outcome.trace.split_last().unwrap();
    assert!(finalizing.answered);
    assert!(rest.iter().all(|e| !e.answered));

    // Documents never shrink
    for pair in outcome.trace.windows(2) {
        assert!(pair[0].documents <= pair[1].documents);
    }
}

#[tokio::test]
async fn test_router_outage_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let router = ollama_router(&server);
    let rag = RecursiveRag::new(
        Arc::new(InMemoryStore::sample().unwrap()),
        router as Arc<dyn sdk::GenerationModel>,
        RagSettings {
            generation_retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
                backoff_multiplier: 1.0,
            },
            generation_timeout: Duration::from_secs(5),
            ..settings()
        },
    );

    let err = rag.run(QUESTION, 2).await.unwrap_err();
    assert!(matches!(err, EngineError::LLMProvider(_)));

    // One attempt plus one retry, then the run stops
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
