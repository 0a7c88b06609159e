/// Run history persistence
///
/// Stores one row per RAG run plus one row per executed phase. All queries
/// are parameterized.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

/// Run status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "cancelled" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

/// Run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub question: String,
    pub status: RunStatus,
    pub max_recursions: i64,
    pub recursion_depth: Option<i64>,
    pub answer: Option<String>,
    pub document_count: Option<i64>,
    pub provider_used: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Summary written when a run completes
#[derive(Debug, Clone)]
pub struct RunSummary<'a> {
    pub answer: &'a str,
    pub recursion_depth: u32,
    pub document_count: usize,
    pub provider_used: Option<&'a str>,
    pub duration_ms: u64,
}

/// Run step record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStep {
    pub id: Option<i64>,
    pub run_id: String,
    pub step_order: i64,
    pub phase: String,
    pub content: String,
    pub created_at: i64,
}

/// Run repository for database operations
pub struct RunRepository {
    pool: SqlitePool,
}

const RUN_COLUMNS: &str = "id, question, status, max_recursions, recursion_depth, answer, \
     document_count, provider_used, error, duration_ms, created_at, completed_at";

fn now_secs() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

fn run_from_row(r: SqliteRow) -> RunRecord {
    RunRecord {
        id: r.get("id"),
        question: r.get("question"),
        status: RunStatus::parse(r.get::<String, _>("status").as_str()),
        max_recursions: r.get("max_recursions"),
        recursion_depth: r.get("recursion_depth"),
        answer: r.get("answer"),
        document_count: r.get("document_count"),
        provider_used: r.get("provider_used"),
        error: r.get("error"),
        duration_ms: r.get("duration_ms"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    }
}

impl RunRepository {
    /// Create a new run repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a run that is about to start
    pub async fn create_run(&self, id: &str, question: &str, max_recursions: u32) -> Result<RunRecord> {
        let now = now_secs()?;

        sqlx::query(
            "INSERT INTO runs (id, question, status, max_recursions, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(question)
        .bind(RunStatus::Running.as_str())
        .bind(max_recursions as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create run")?;

        Ok(RunRecord {
            id: id.to_string(),
            question: question.to_string(),
            status: RunStatus::Running,
            max_recursions: max_recursions as i64,
            recursion_depth: None,
            answer: None,
            document_count: None,
            provider_used: None,
            error: None,
            duration_ms: None,
            created_at: now,
            completed_at: None,
        })
    }

    /// Mark a run as completed with its results
    pub async fn complete_run(&self, run_id: &str, summary: &RunSummary<'_>) -> Result<()> {
        let now = now_secs()?;

        sqlx::query(
            "UPDATE runs SET status = ?, answer = ?, recursion_depth = ?, document_count = ?, \
             provider_used = ?, duration_ms = ?, completed_at = ? WHERE id = ?",
        )
        .bind(RunStatus::Completed.as_str())
        .bind(summary.answer)
        .bind(summary.recursion_depth as i64)
        .bind(summary.document_count as i64)
        .bind(summary.provider_used)
        .bind(summary.duration_ms as i64)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("Failed to complete run")?;

        Ok(())
    }

    /// Mark a run as failed (or cancelled) with the error message
    pub async fn fail_run(&self, run_id: &str, status: RunStatus, error: &str, duration_ms: u64) -> Result<()> {
        let now = now_secs()?;

        sqlx::query(
            "UPDATE runs SET status = ?, error = ?, duration_ms = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(duration_ms as i64)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark run as failed")?;

        Ok(())
    }

    /// Append a step to a run
    pub async fn add_step(
        &self,
        run_id: &str,
        step_order: i64,
        phase: &str,
        content: &str,
    ) -> Result<RunStep> {
        let now = now_secs()?;

        let result = sqlx::query(
            "INSERT INTO run_steps (run_id, step_order, phase, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(step_order)
        .bind(phase)
        .bind(content)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to add run step")?;

        Ok(RunStep {
            id: Some(result.last_insert_rowid()),
            run_id: run_id.to_string(),
            step_order,
            phase: phase.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?", RUN_COLUMNS))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch run")?;

        Ok(row.map(run_from_row))
    }

    /// Most recent runs first
    pub async fn get_recent_runs(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?",
            RUN_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent runs")?;

        Ok(rows.into_iter().map(run_from_row).collect())
    }

    /// All steps of a run in execution order
    pub async fn get_run_steps(&self, run_id: &str) -> Result<Vec<RunStep>> {
        let rows = sqlx::query(
            "SELECT id, run_id, step_order, phase, content, created_at FROM run_steps \
             WHERE run_id = ? ORDER BY step_order ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch run steps")?;

        Ok(rows
            .into_iter()
            .map(|r| RunStep {
                id: Some(r.get("id")),
                run_id: r.get("run_id"),
                step_order: r.get("step_order"),
                phase: r.get("phase"),
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
