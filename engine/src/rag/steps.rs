//! The three steps that touch collaborators: retrieve, generate and synthesize
//!
//! Every collaborator call is bounded twice: by a per-call timeout and by the
//! run's cancellation token. Calls are retried through [`with_retry`].

use super::executor::{RagSettings, RunStats};
use super::prompts;
use super::retry::with_retry;
use super::state::RunState;
use super::targets::extract_new_targets;
use sdk::{DocumentStore, EngineError, GenerationModel, ReragErrorExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What one retrieve round did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveReport {
    pub query: String,
    pub added: usize,
    pub failed: bool,
}

/// Await `fut` unless the timeout elapses or the run is cancelled first.
pub async fn bounded_call<T, Fut>(
    cancel: &CancellationToken,
    limit: Duration,
    operation: &str,
    fut: Fut,
) -> Result<T, EngineError>
where
    Fut: Future<Output = Result<T, EngineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(EngineError::Timeout {
                operation: operation.to_string(),
                secs: limit.as_secs(),
            }),
        },
    }
}

/// Query the store for the next target and append whatever comes back.
///
/// A recoverable store failure that survives every retry costs the round its
/// documents but not the run: nothing is appended, the failure is counted and
/// the depth still advances.
pub async fn retrieve(
    state: &mut RunState,
    store: &dyn DocumentStore,
    settings: &RagSettings,
    cancel: &CancellationToken,
    stats: &mut RunStats,
) -> Result<RetrieveReport, EngineError> {
    let query = state.next_query().to_string();
    let (query_ref, top_k, limit) = (query.as_str(), settings.top_k, settings.retrieval_timeout);

    tracing::debug!(depth = state.recursion_depth(), query = %query, "Retrieving");
    stats.store_calls += 1;

    let result = with_retry(&settings.retrieval_retry, cancel, "retrieve", move || {
        bounded_call(cancel, limit, "retrieval", store.similarity_search(query_ref, top_k))
    })
    .await;

    let (added, failed) = match result {
        Ok(docs) => (state.append_documents(docs.into_iter().map(|d| d.text)), false),
        Err(e) if e.is_recoverable() => {
            stats.retrieval_failures += 1;
            tracing::warn!(
                store = store.name(),
                query = %query,
                error = %e,
                "Retrieval failed, continuing without new documents"
            );
            (0, true)
        }
        Err(e) => return Err(e),
    };

    state.complete_retrieval();
    tracing::debug!(
        depth = state.recursion_depth(),
        added,
        total = state.documents().len(),
        "Retrieved documents"
    );

    Ok(RetrieveReport {
        query,
        added,
        failed,
    })
}

/// Produce an intermediate answer and record the targets it uncovers.
///
/// Returns the intermediate answer; it has no further use in the run.
pub async fn generate(
    state: &mut RunState,
    model: &dyn GenerationModel,
    settings: &RagSettings,
    cancel: &CancellationToken,
    stats: &mut RunStats,
) -> Result<String, EngineError> {
    let prompt = prompts::intermediate_prompt(
        state.question(),
        state.documents(),
        settings.context_window,
    );

    stats.model_calls += 1;
    let response = complete(model, &prompt, settings, cancel, "generate").await?;

    let new_targets = {
        let corpus: Vec<&str> = state
            .documents()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(response.as_str()))
            .collect();
        extract_new_targets(&corpus, state.processed_targets())
    };

    tracing::debug!(targets = ?new_targets, "Extracted new targets");
    state.record_targets(new_targets);

    Ok(response)
}

/// Produce the final answer from every collected document.
pub async fn synthesize(
    state: &mut RunState,
    model: &dyn GenerationModel,
    settings: &RagSettings,
    cancel: &CancellationToken,
    stats: &mut RunStats,
) -> Result<(), EngineError> {
    let prompt = prompts::synthesis_prompt(state.question(), state.documents());

    tracing::debug!(documents = state.documents().len(), "Synthesizing final answer");
    stats.model_calls += 1;
    let answer = complete(model, &prompt, settings, cancel, "synthesize").await?;

    state.set_answer(answer)
}

async fn complete(
    model: &dyn GenerationModel,
    prompt: &str,
    settings: &RagSettings,
    cancel: &CancellationToken,
    label: &str,
) -> Result<String, EngineError> {
    let limit = settings.generation_timeout;
    with_retry(&settings.generation_retry, cancel, label, move || {
        bounded_call(cancel, limit, "generation", model.complete(prompt))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::rag::testing::{ScriptedModel, ScriptedStore};

    fn settings() -> RagSettings {
        RagSettings {
            retrieval_retry: RetryConfig::none(),
            generation_retry: RetryConfig::none(),
            ..RagSettings::default()
        }
    }

    #[tokio::test]
    async fn test_bounded_call_passes_result_through() {
        let cancel = CancellationToken::new();
        let value = bounded_call(&cancel, Duration::from_secs(1), "op", async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_call_times_out() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = bounded_call(&cancel, Duration::from_secs(2), "op", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        match result {
            Err(EngineError::Timeout { operation, secs }) => {
                assert_eq!(operation, "op");
                assert_eq!(secs, 2);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounded_call_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = bounded_call(&cancel, Duration::from_secs(1), "op", async { Ok(1) }).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_retrieve_appends_and_advances() {
        let store = ScriptedStore::new().with("q", &["a", "b"]);
        let mut state = RunState::new("q", 2);
        let mut stats = RunStats::default();

        let report = retrieve(&mut state, &store, &settings(), &CancellationToken::new(), &mut stats)
            .await
            .unwrap();

        assert_eq!(report.query, "q");
        assert_eq!(report.added, 2);
        assert!(!report.failed);
        assert_eq!(state.documents(), &["a", "b"]);
        assert_eq!(state.recursion_depth(), 1);
        assert_eq!(stats.store_calls, 1);
        assert_eq!(store.last_k(), Some(settings().top_k));
    }

    #[tokio::test]
    async fn test_retrieve_degrades_on_store_failure() {
        let store = ScriptedStore::new().failing_always();
        let mut state = RunState::new("q", 2);
        let mut stats = RunStats::default();

        let report = retrieve(&mut state, &store, &settings(), &CancellationToken::new(), &mut stats)
            .await
            .unwrap();

        assert!(report.failed);
        assert_eq!(report.added, 0);
        assert!(state.documents().is_empty());
        assert_eq!(state.recursion_depth(), 1);
        assert_eq!(stats.retrieval_failures, 1);
    }

    #[tokio::test]
    async fn test_retrieve_propagates_permanent_errors() {
        let store = ScriptedStore::new().failing_with(|| EngineError::Config("index missing".into()));
        let mut state = RunState::new("q", 2);
        let mut stats = RunStats::default();

        let err = retrieve(&mut state, &store, &settings(), &CancellationToken::new(), &mut stats)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(state.recursion_depth(), 0);
    }

    #[tokio::test]
    async fn test_generate_scans_documents_and_answer() {
        let model = ScriptedModel::constant("see https://example.com/next");
        let mut state = RunState::new("q", 2);
        state.append_documents(vec!["「Guide」を参照".to_string()]);
        state.complete_retrieval();
        let mut stats = RunStats::default();

        let answer = generate(&mut state, &model, &settings(), &CancellationToken::new(), &mut stats)
            .await
            .unwrap();

        assert_eq!(answer, "see https://example.com/next");
        assert_eq!(state.new_targets(), &["Guide", "https://example.com/next"]);
        assert_eq!(state.processed_targets(), state.new_targets());
        assert_eq!(stats.model_calls, 1);
    }

    #[tokio::test]
    async fn test_generate_prompt_is_windowed() {
        let model = ScriptedModel::constant("ok");
        let mut state = RunState::new("q", 2);
        state.append_documents((0..8).map(|i| format!("doc-{}", i)));
        let settings = RagSettings {
            context_window: 3,
            ..settings()
        };

        generate(&mut state, &model, &settings, &CancellationToken::new(), &mut RunStats::default())
            .await
            .unwrap();

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("doc-2"));
        assert!(!prompt.contains("doc-3"));
    }

    #[tokio::test]
    async fn test_synthesize_sets_answer_from_all_documents() {
        let model = ScriptedModel::constant("final");
        let mut state = RunState::new("q", 2);
        state.append_documents((0..8).map(|i| format!("doc-{}", i)));

        synthesize(&mut state, &model, &settings(), &CancellationToken::new(), &mut RunStats::default())
            .await
            .unwrap();

        assert_eq!(state.answer(), "final");
        assert!(model.prompts()[0].contains("doc-7"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let model = ScriptedModel::constant("unused").failing_always();
        let mut state = RunState::new("q", 2);

        let err = generate(&mut state, &model, &settings(), &CancellationToken::new(), &mut RunStats::default())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Generation(_)));
        assert!(state.new_targets().is_empty());
    }
}
