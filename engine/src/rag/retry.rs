//! Bounded retry with exponential backoff for collaborator calls

use crate::config::RetryConfig;
use sdk::{EngineError, ReragErrorExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `operation` up to `1 + max_retries` times.
///
/// Only errors whose `is_recoverable()` is true are retried; anything else
/// is returned immediately. The backoff sleep is abandoned if `cancel` fires.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_recoverable() || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff = compute_backoff(config, attempt);
                tracing::warn!(
                    operation = label,
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// `initial_backoff_ms * backoff_multiplier^attempt`, capped at `max_backoff_ms`
pub fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64);
    Duration::from_millis(capped as u64)
}
