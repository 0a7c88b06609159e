//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Answer a question with a recursive RAG run
//! - history: Show the last N runs
//! - replay: Show all steps of a run
//! - doctor: Validate configuration and check dependencies
//! - config: Show the effective configuration, its path, or manage API keys

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::db::{Database, RunRepository, RunStatus, RunSummary};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::gemini::GeminiProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::LLMProvider;
use crate::rag::{run_name, RagSettings, RecursiveRag, RunOutcome};
use crate::secrets::{env_candidates, provider_secret_key, SecretCache, SecretManager};
use crate::store::InMemoryStore;
use sdk::{EngineError, GenerationModel};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Per-invocation overrides for `rerag run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_recursions: Option<u32>,
    pub corpus: Option<PathBuf>,
    pub top_k: Option<usize>,
}

/// Build the provider router from configuration.
///
/// Ollama is always registered. Cloud providers are registered when their
/// API key resolves. A cloud default provider without a key is a
/// configuration error.
pub fn build_router(config: &Config, secrets: Arc<SecretCache>) -> Result<LLMRouter, EngineError> {
    let llm = &config.llm;
    let default_provider = llm.default_provider.as_str();

    if let Some(key) = provider_secret_key(default_provider) {
        let resolved = secrets
            .get_secret(key)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !resolved {
            return Err(EngineError::Config(format!(
                "No API key for default provider '{}'. Set {} or store '{}' in the keychain",
                default_provider,
                env_candidates(key).join(" or "),
                key
            )));
        }
    }

    let mut providers: Vec<Box<dyn LLMProvider>> = vec![Box::new(
        OllamaProvider::new(llm.ollama.base_url.clone(), llm.ollama.model.clone())
            .with_temperature(llm.temperature),
    )];

    if secrets.has_secret("gemini_api_key") {
        providers.push(Box::new(
            GeminiProvider::new(llm.gemini.clone(), Arc::clone(&secrets))
                .with_temperature(llm.temperature),
        ));
    }

    if secrets.has_secret("openai_api_key") {
        providers.push(Box::new(
            OpenAIProvider::new(llm.openai.clone(), Arc::clone(&secrets))
                .with_temperature(llm.temperature),
        ));
    }

    if secrets.has_secret("anthropic_api_key") {
        providers.push(Box::new(
            AnthropicProvider::new(llm.anthropic.clone(), Arc::clone(&secrets))
                .with_temperature(llm.temperature),
        ));
    }

    tracing::debug!(
        providers = providers.len(),
        default = default_provider,
        "LLM router configured"
    );

    Ok(LLMRouter::new(providers, Arc::new(llm.clone())))
}

/// Load the corpus given on the command line, the configured one, or the
/// built-in sample.
pub fn load_store(config: &Config, corpus: Option<&Path>) -> Result<InMemoryStore, EngineError> {
    match corpus.or(config.retrieval.corpus_path.as_deref()) {
        Some(path) => InMemoryStore::load_from_path(path),
        None => {
            tracing::info!("No corpus configured, using the built-in sample");
            InMemoryStore::sample()
        }
    }
}

/// Engine settings for one run, with command-line overrides applied.
///
/// The router tries every provider in turn, so the generation bound covers
/// one timeout per provider.
pub fn run_settings(config: &Config, options: &RunOptions, provider_count: usize) -> RagSettings {
    let mut settings = RagSettings::from_config(config);
    if let Some(max) = options.max_recursions {
        settings.max_recursions = max;
    }
    if let Some(k) = options.top_k {
        settings.top_k = k;
    }
    let providers = u32::try_from(provider_count.max(1)).unwrap_or(u32::MAX);
    settings.generation_timeout = config.llm.timeout().saturating_mul(providers);
    settings
}

/// Answer a question
///
/// Runs the recursive RAG loop against the configured providers and corpus.
/// Ctrl-C cancels the run. The run and its trace are written to the history
/// database either way, after the answer has been printed.
pub async fn handle_run(
    question: String,
    options: RunOptions,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    if let Some(0) = options.top_k {
        return Err(EngineError::Config("--top-k must be greater than 0".to_string()).into());
    }

    let secret_cache = Arc::new(SecretCache::new(Arc::new(SecretManager::default())));
    let router = Arc::new(build_router(config, secret_cache)?);
    let store = Arc::new(load_store(config, options.corpus.as_deref())?);

    let settings = run_settings(config, &options, router.provider_count());
    let max_recursions = settings.max_recursions;
    let model: Arc<dyn GenerationModel> = Arc::<LLMRouter>::clone(&router);
    let rag = RecursiveRag::new(store, model, settings);

    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;
    let runs = database.runs();

    let run_id = uuid::Uuid::new_v4().to_string();
    runs.create_run(&run_id, &question, max_recursions).await?;

    if format == OutputFormat::Text {
        println!("{}", run_name(&question));
        println!();
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let started = Instant::now();
    let result = rag.run_with_cancel(&question, max_recursions, &cancel).await;
    interrupt.abort();

    match result {
        Ok(outcome) => {
            let provider = router.last_provider();

            match format {
                OutputFormat::Text => {
                    println!("{}", outcome.answer);
                    println!();
                    println!("✓ Run completed ({})", outcome.end_reason);
                    println!("  Run ID:     {}", run_id);
                    println!("  Provider:   {}", provider.as_deref().unwrap_or("unknown"));
                    println!("  Rounds:     {}", outcome.stats.rounds);
                    println!("  Documents:  {}", outcome.documents.len());
                    if !outcome.processed_targets.is_empty() {
                        println!("  Followed:   {}", outcome.processed_targets.join(", "));
                    }
                    println!("  Duration:   {}ms", outcome.duration_ms);
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "completed",
                        "run_id": run_id,
                        "run_name": outcome.run_name(),
                        "provider": provider,
                        "outcome": outcome
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }

            let persisted = persist_outcome(&runs, &run_id, &outcome, provider.as_deref()).await;
            if let Err(e) = &persisted {
                tracing::warn!("Run {} answered but was not recorded: {:#}", run_id, e);
            }
            database.close().await?;
            persisted
        }
        Err(e) => {
            let status = if matches!(e, EngineError::Cancelled) {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            };
            let elapsed = started.elapsed().as_millis() as u64;

            match format {
                OutputFormat::Text => {
                    println!("✗ Run {}: {}", status.as_str(), e);
                    println!("  Hint: {}", sdk::ReragErrorExt::user_hint(&e));
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": status,
                        "run_id": run_id,
                        "error": e.to_string()
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            if let Err(record) = runs.fail_run(&run_id, status, &e.to_string(), elapsed).await {
                tracing::warn!("Failed to record run {}: {:#}", run_id, record);
            }
            database.close().await?;
            Err(e.into())
        }
    }
}

/// Record a finished run's trace and summary.
///
/// # Errors
/// Returns the first storage error. The run row is then marked failed so it
/// does not stay `running`.
pub async fn persist_outcome(
    runs: &RunRepository,
    run_id: &str,
    outcome: &RunOutcome,
    provider: Option<&str>,
) -> Result<()> {
    let recorded = record_outcome(runs, run_id, outcome, provider).await;

    if let Err(e) = &recorded {
        let message = format!("Failed to persist run: {:#}", e);
        if let Err(mark) = runs
            .fail_run(run_id, RunStatus::Failed, &message, outcome.duration_ms)
            .await
        {
            tracing::warn!("Failed to mark run {} as failed: {:#}", run_id, mark);
        }
    }

    recorded
}

async fn record_outcome(
    runs: &RunRepository,
    run_id: &str,
    outcome: &RunOutcome,
    provider: Option<&str>,
) -> Result<()> {
    for (order, event) in outcome.trace.iter().enumerate() {
        runs.add_step(
            run_id,
            order as i64,
            event.phase.as_str(),
            &serde_json::to_string(event)?,
        )
        .await
        .context("Failed to record run step")?;
    }

    runs.complete_run(
        run_id,
        &RunSummary {
            answer: &outcome.answer,
            recursion_depth: outcome.recursion_depth,
            document_count: outcome.documents.len(),
            provider_used: provider,
            duration_ms: outcome.duration_ms,
        },
    )
    .await
    .context("Failed to complete run")
}

/// Show run history
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let runs = database
        .runs()
        .get_recent_runs(limit as i64)
        .await
        .context("Failed to fetch run history")?;

    match format {
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No runs in history");
                return Ok(());
            }

            println!("Run History (last {} runs):", limit);
            println!();

            for run in runs {
                println!("Run ID: {}", run.id);
                println!("  Question: {}", run.question);
                println!("  Status: {}", run.status.as_str());

                if let Some(depth) = run.recursion_depth {
                    println!("  Depth: {}/{}", depth, run.max_recursions);
                }

                if let Some(provider) = run.provider_used {
                    println!("  Provider: {}", provider);
                }

                if let Some(duration) = run.duration_ms {
                    println!("  Duration: {}ms", duration);
                }

                println!("  Created: {}", format_timestamp(run.created_at));
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "runs": runs,
                "count": runs.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Replay a run and show all steps
pub async fn handle_replay(run_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;
    let repo = database.runs();

    let run = repo
        .get_run(&run_id)
        .await
        .context("Failed to fetch run")?
        .ok_or_else(|| anyhow::anyhow!("Run not found: {}", run_id))?;

    let steps = repo
        .get_run_steps(&run_id)
        .await
        .context("Failed to fetch run steps")?;

    match format {
        OutputFormat::Text => {
            println!("Run Replay: {}", run_id);
            println!();
            println!("Question: {}", run.question);
            println!("Status: {}", run.status.as_str());

            if let Some(provider) = &run.provider_used {
                println!("Provider: {}", provider);
            }

            if let Some(duration) = run.duration_ms {
                println!("Duration: {}ms", duration);
            }

            if let Some(error) = &run.error {
                println!("Error: {}", error);
            }

            println!();
            println!("Steps ({} total):", steps.len());
            println!();

            for step in &steps {
                println!("Step {}: {}", step.step_order, step.phase);
                let detail = serde_json::from_str::<serde_json::Value>(&step.content)
                    .ok()
                    .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
                    .unwrap_or_else(|| step.content.clone());
                println!("  {}", detail);
                println!();
            }

            if let Some(answer) = &run.answer {
                println!("Answer:");
                println!("{}", answer);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "run": run,
                "steps": steps,
                "step_count": steps.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run system diagnostics
///
/// Validates the data directory, history database, corpus and provider
/// credentials, and reports any issues.
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is validated when loaded
    checks.push(("Configuration".into(), "Valid".into()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory".into(), "Exists".into()));
    } else {
        checks.push(("Data directory".into(), "Missing".into()));
        issues.push(format!(
            "Data directory does not exist: {}",
            config.core.data_dir.display()
        ));
    }

    let db_path = config.db_path();
    if db_path.exists() {
        match Database::new(&db_path).await {
            Ok(db) => {
                checks.push(("Database".into(), "OK".into()));
                db.close().await.ok();
            }
            Err(e) => {
                checks.push(("Database".into(), "Failed".into()));
                issues.push(format!("Cannot open database: {}", e));
            }
        }
    } else {
        checks.push(("Database".into(), "Not initialized".into()));
    }

    match load_store(config, None) {
        Ok(store) => {
            let source = match &config.retrieval.corpus_path {
                Some(path) => path.display().to_string(),
                None => "built-in sample".to_string(),
            };
            checks.push(("Corpus".into(), format!("{} documents ({})", store.len(), source)));
        }
        Err(e) => {
            checks.push(("Corpus".into(), "Unreadable".into()));
            issues.push(e.to_string());
        }
    }

    let ollama = OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
    );
    if ollama.check_health().await {
        checks.push(("Ollama".into(), "Available".into()));
    } else {
        checks.push(("Ollama".into(), "Not available".into()));
        if config.llm.default_provider == "ollama" {
            issues.push("Ollama is the default provider but is not running.".to_string());
        }
    }

    let manager = SecretManager::default();
    for provider in ["gemini", "openai", "anthropic"] {
        let Some(key) = provider_secret_key(provider) else {
            continue;
        };
        let label = format!("{} API key", provider);
        if manager.has_secret(key) {
            checks.push((label, "Configured".into()));
        } else {
            checks.push((label, "Not configured".into()));
            if config.llm.default_provider == provider {
                issues.push(format!(
                    "Default provider '{}' has no API key. Set {}.",
                    provider,
                    env_candidates(key).join(" or ")
                ));
            }
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Rerag System Diagnostics");
            println!("========================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the effective configuration or where it lives
pub fn handle_config(
    action: ConfigAction,
    config: &Config,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        ConfigAction::Show => match format {
            OutputFormat::Text => {
                let rendered =
                    toml::to_string_pretty(config).context("Failed to render configuration")?;
                println!("{}", rendered);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
        },
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => Config::default_config_path()?,
            };
            match format {
                OutputFormat::Text => println!("{}", path.display()),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "path": path }))?)
                }
            }
        }
        ConfigAction::SetKey { provider } => {
            let key = secret_key_for(&provider)?;
            let mut value = String::new();
            std::io::stdin()
                .read_line(&mut value)
                .context("Failed to read API key from stdin")?;
            let value = value.trim();
            if value.is_empty() {
                return Err(EngineError::Config("API key must not be empty".to_string()).into());
            }
            SecretManager::default().set_secret(key, value)?;
            report_key_change(format, &provider, "stored")?;
        }
        ConfigAction::DeleteKey { provider } => {
            let key = secret_key_for(&provider)?;
            SecretManager::default().delete_secret(key)?;
            report_key_change(format, &provider, "deleted")?;
        }
    }
    Ok(())
}

fn secret_key_for(provider: &str) -> Result<&'static str, EngineError> {
    provider_secret_key(provider).ok_or_else(|| {
        EngineError::Config(format!(
            "Provider '{}' takes no API key. Use gemini, openai or anthropic",
            provider
        ))
    })
}

fn report_key_change(format: OutputFormat, provider: &str, change: &str) -> Result<()> {
    match format {
        OutputFormat::Text => println!("✓ API key for {} {}", provider, change),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "provider": provider, "key": change }))?
        ),
    }
    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
