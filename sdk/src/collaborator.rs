//! Collaborator contracts consumed by the recursive RAG loop
//!
//! The engine never talks to a vector database or a language model directly.
//! It holds long-lived handles implementing these traits, injected at
//! construction time, so tests can substitute in-memory fakes.
//!
//! Both traits require `Send + Sync`: a single handle is shared by every
//! concurrent run and may be queried from several tasks at once.

use crate::errors::EngineError;
use crate::types::RetrievedDocument;
use async_trait::async_trait;

/// A pre-populated, searchable document index
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the name of the store implementation
    fn name(&self) -> &str;

    /// Return up to `k` documents most similar to `query`, best first
    ///
    /// # Errors
    /// Returns `EngineError::Retrieval` if the store cannot be queried
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, EngineError>;
}

/// A single-shot text completion service
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Returns the name of the model or router
    fn name(&self) -> &str;

    /// Complete `prompt` and return the response text
    ///
    /// # Errors
    /// Returns `EngineError::Generation` or `EngineError::LLMProvider` for
    /// transient failures, `EngineError::Config` for credential problems
    async fn complete(&self, prompt: &str) -> Result<String, EngineError>;
}
