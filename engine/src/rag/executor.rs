//! Recursive RAG executor
//!
//! Drives one run through the fixed phase sequence:
//!
//! 1. **Retrieving**: search the store for the question or the next target
//! 2. **Generating**: intermediate answer over a bounded document window,
//!    then target discovery
//! 3. **Deciding**: recurse or stop
//! 4. **Finalizing**: one synthesis call over every collected document
//!
//! The executor owns the run's state outright; the collaborators are shared
//! handles and may serve several runs at once.

use super::decision::{decide, Decision, EndReason};
use super::phase::Phase;
use super::state::RunState;
use super::steps;
use super::{DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_RECURSIONS};
use crate::config::{Config, RetryConfig};
use sdk::{DocumentStore, EngineError, GenerationModel};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Tunables for a `RecursiveRag` instance
#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    /// Used by [`RecursiveRag::run_default`]
    pub max_recursions: u32,
    /// Documents requested from the store per round
    pub top_k: usize,
    /// Documents included in each intermediate prompt
    pub context_window: usize,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
    pub retrieval_retry: RetryConfig,
    pub generation_retry: RetryConfig,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            max_recursions: DEFAULT_MAX_RECURSIONS,
            top_k: 4,
            context_window: DEFAULT_CONTEXT_WINDOW,
            retrieval_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
            retrieval_retry: RetryConfig::default(),
            generation_retry: RetryConfig::default(),
        }
    }
}

impl RagSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_recursions: config.rag.max_recursions,
            top_k: config.retrieval.top_k,
            context_window: config.rag.context_window,
            retrieval_timeout: config.retrieval.timeout(),
            generation_timeout: config.llm.timeout(),
            retrieval_retry: config.retrieval.retry.clone(),
            generation_retry: config.llm.retry.clone(),
        }
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Retrieve steps that queried the store (retries not counted)
    pub store_calls: u32,
    /// Generate and synthesize steps that queried the model (retries not counted)
    pub model_calls: u32,
    /// Retrieve rounds that came back empty-handed after all retries
    pub retrieval_failures: u32,
    /// Completed retrieve-generate rounds
    pub rounds: u32,
}

/// One entry per phase executed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub phase: Phase,
    /// Recursion depth after the phase ran
    pub depth: u32,
    /// Document count after the phase ran
    pub documents: usize,
    /// Whether the final answer had been set after the phase ran
    pub answered: bool,
    pub detail: String,
}

impl TraceEvent {
    fn record(phase: Phase, state: &RunState, detail: impl Into<String>) -> Self {
        Self {
            phase,
            depth: state.recursion_depth(),
            documents: state.documents().len(),
            answered: state.is_answered(),
            detail: detail.into(),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub question: String,
    pub answer: String,
    pub documents: Vec<String>,
    pub processed_targets: Vec<String>,
    pub recursion_depth: u32,
    pub max_recursions: u32,
    pub end_reason: EndReason,
    pub stats: RunStats,
    pub trace: Vec<TraceEvent>,
    pub duration_ms: u64,
}

impl RunOutcome {
    /// Display name for the run: `Recursive RAG - <first 20 chars>...`
    pub fn run_name(&self) -> String {
        run_name(&self.question)
    }
}

pub fn run_name(question: &str) -> String {
    let prefix: String = question.chars().take(20).collect();
    format!("Recursive RAG - {}...", prefix)
}

/// Recursive retrieve-generate-decide loop over injected collaborators
pub struct RecursiveRag {
    store: Arc<dyn DocumentStore>,
    model: Arc<dyn GenerationModel>,
    settings: RagSettings,
}

impl RecursiveRag {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn GenerationModel>,
        settings: RagSettings,
    ) -> Self {
        Self {
            store,
            model,
            settings,
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Run with the configured default recursion bound
    pub async fn run_default(&self, question: &str) -> Result<RunOutcome, EngineError> {
        self.run(question, self.settings.max_recursions).await
    }

    /// Run to completion
    pub async fn run(&self, question: &str, max_recursions: u32) -> Result<RunOutcome, EngineError> {
        self.run_with_cancel(question, max_recursions, &CancellationToken::new())
            .await
    }

    /// Run until completion or until `cancel` fires.
    ///
    /// # Errors
    /// - `EngineError::Cancelled` if the token fires; no further calls are made
    /// - generation errors once retries are exhausted
    /// - non-recoverable store errors
    pub async fn run_with_cancel(
        &self,
        question: &str,
        max_recursions: u32,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let run_name = run_name(question);
        info!(
            run = %run_name,
            max_recursions,
            store = self.store.name(),
            model = self.model.name(),
            "Starting recursive RAG run"
        );

        let started = Instant::now();
        match self.drive(question, max_recursions, cancel, started).await {
            Ok(outcome) => {
                info!(
                    run = %run_name,
                    rounds = outcome.stats.rounds,
                    documents = outcome.documents.len(),
                    end_reason = %outcome.end_reason,
                    duration_ms = outcome.duration_ms,
                    "Run completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(run = %run_name, error = %e, "Run failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        question: &str,
        max_recursions: u32,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<RunOutcome, EngineError> {
        let mut state = RunState::new(question, max_recursions);
        let mut stats = RunStats::default();
        let mut trace = Vec::new();
        let mut end_reason = None;
        let mut phase = Phase::Start;

        while !phase.is_terminal() {
            let decision = match phase {
                Phase::Start => None,
                Phase::Retrieving => {
                    ensure_active(cancel)?;
                    let report = steps::retrieve(
                        &mut state,
                        self.store.as_ref(),
                        &self.settings,
                        cancel,
                        &mut stats,
                    )
                    .await?;
                    let detail = if report.failed {
                        format!("query={} failed", report.query)
                    } else {
                        format!("query={} added={}", report.query, report.added)
                    };
                    trace.push(TraceEvent::record(phase, &state, detail));
                    None
                }
                Phase::Generating => {
                    ensure_active(cancel)?;
                    steps::generate(
                        &mut state,
                        self.model.as_ref(),
                        &self.settings,
                        cancel,
                        &mut stats,
                    )
                    .await?;
                    stats.rounds += 1;
                    let detail = format!("targets={:?}", state.new_targets());
                    trace.push(TraceEvent::record(phase, &state, detail));
                    None
                }
                Phase::Deciding => {
                    let decision = decide(&state);
                    debug!(
                        depth = state.recursion_depth(),
                        max = state.max_recursions(),
                        decision = %decision,
                        "Continuation check"
                    );
                    if let Decision::End(reason) = decision {
                        end_reason = Some(reason);
                    }
                    trace.push(TraceEvent::record(phase, &state, decision.to_string()));
                    Some(decision)
                }
                Phase::Finalizing => {
                    ensure_active(cancel)?;
                    steps::synthesize(
                        &mut state,
                        self.model.as_ref(),
                        &self.settings,
                        cancel,
                        &mut stats,
                    )
                    .await?;
                    let detail = format!("answer_chars={}", state.answer().chars().count());
                    trace.push(TraceEvent::record(phase, &state, detail));
                    None
                }
                Phase::Done => None,
            };

            let next = phase.next(decision).ok_or_else(|| {
                EngineError::InvalidState(format!("no transition out of phase '{}'", phase))
            })?;
            debug_assert!(phase.can_transition_to(next));
            phase = next;
        }

        let end_reason = end_reason.ok_or_else(|| {
            EngineError::InvalidState("run finished without a decision".to_string())
        })?;
        let recursion_depth = state.recursion_depth();
        let question = state.question().to_string();
        let (answer, documents, processed_targets) = state.into_parts();

        Ok(RunOutcome {
            question,
            answer,
            documents,
            processed_targets,
            recursion_depth,
            max_recursions,
            end_reason,
            stats,
            trace,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}
