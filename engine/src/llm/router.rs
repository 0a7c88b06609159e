//! LLM Router
//!
//! Orders the configured providers (default provider first, then the rest in
//! registration order) and fails over between them. Each attempt runs under
//! the configured per-provider timeout.
//!
//! The router is the engine's production `GenerationModel`.

use super::{LLMError, LLMProvider, Message};
use crate::config::LLMConfig;
use crate::secrets;
use async_trait::async_trait;
use sdk::{EngineError, GenerationModel};
use std::sync::{Arc, Mutex};

/// LLM Router with ordered failover
pub struct LLMRouter {
    /// Available LLM providers
    providers: Vec<Box<dyn LLMProvider>>,

    /// LLM configuration
    config: Arc<LLMConfig>,

    /// Name of the provider that served the most recent successful call
    last_provider: Mutex<Option<String>>,
}

impl LLMRouter {
    /// Create a new LLM router
    ///
    /// # Arguments
    /// * `providers` - List of available LLM providers
    /// * `config` - LLM configuration
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        Self {
            providers,
            config,
            last_provider: Mutex::new(None),
        }
    }

    /// Number of registered providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Provider that answered the last successful call, if any
    pub fn last_provider(&self) -> Option<String> {
        self.last_provider
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Providers in attempt order: the configured default first
    pub fn rank_providers(&self) -> Vec<&dyn LLMProvider> {
        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        let default_provider = self.config.default_provider.as_str();
        // Stable sort keeps registration order among the rest
        providers.sort_by_key(|p| p.name() != default_provider);

        providers
    }

    /// Call LLM providers with automatic failover
    ///
    /// Returns the response text and the name of the provider that produced it.
    /// If every provider failed with a permanent error (bad credentials or an
    /// invalid request) the last such error is returned, otherwise
    /// `ProviderUnavailable`.
    pub async fn call(&self, messages: &[Message]) -> super::Result<(String, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let timeout = self.config.timeout();
        let mut last_permanent: Option<LLMError> = None;
        let mut saw_transient = false;

        for provider in self.rank_providers() {
            tracing::debug!(
                "Attempting provider: {} (timeout: {}s)",
                provider.name(),
                timeout.as_secs()
            );

            let result = tokio::time::timeout(timeout, provider.generate(messages)).await;

            match result {
                Ok(Ok(response)) => {
                    tracing::info!("Provider {} succeeded", provider.name());
                    *self.last_provider.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(provider.name().to_string());
                    return Ok((response, provider.name().to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Provider {} failed: {}",
                        provider.name(),
                        secrets::scrub(&e.to_string())
                    );
                    if e.is_permanent() {
                        last_permanent = Some(e);
                    } else {
                        saw_transient = true;
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        "Provider {} timed out after {}s",
                        provider.name(),
                        timeout.as_secs()
                    );
                    saw_transient = true;
                }
            }
        }

        tracing::error!("All LLM providers exhausted");
        match last_permanent {
            Some(e) if !saw_transient => Err(e),
            _ => Err(LLMError::ProviderUnavailable(
                "All LLM providers failed".to_string(),
            )),
        }
    }
}

impl From<LLMError> for EngineError {
    fn from(e: LLMError) -> Self {
        let msg = secrets::scrub(&e.to_string());
        match e {
            LLMError::AuthenticationFailed(_) | LLMError::InvalidRequest(_) => {
                EngineError::Config(msg)
            }
            _ => EngineError::LLMProvider(msg),
        }
    }
}

#[async_trait]
impl GenerationModel for LLMRouter {
    fn name(&self) -> &str {
        "llm-router"
    }

    async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        let (text, _provider) = self.call(&[Message::user(prompt)]).await?;
        Ok(text)
    }
}
