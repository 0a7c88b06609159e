//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for interacting with multiple LLM providers
//! (Gemini, OpenAI, Anthropic, Ollama). The LLMProvider trait defines the contract
//! that all providers must implement, enabling the LLM router to fail over between
//! providers transparently. The router in turn implements the engine's
//! `GenerationModel` collaborator contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Errors that will fail the same way on every provider and every retry
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            LLMError::AuthenticationFailed(_) | LLMError::InvalidRequest(_)
        )
    }
}

/// Message sent to a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message sender
///
/// Every prompt goes out as a single user turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai", "gemini")
    fn name(&self) -> &str;

    /// Generate a completion for the conversation
    ///
    /// # Returns
    /// * `Ok(String)` - The response text
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Map a non-success HTTP status from a cloud API to an `LLMError`
pub(crate) fn map_status_error(provider: &str, status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        400 | 404 => LLMError::InvalidRequest(body),
        _ => LLMError::ProviderUnavailable(format!("{} API error ({}): {}", provider, status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");
        assert_eq!(user_msg.role.to_string(), "user");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("q")).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            map_status_error("gemini", StatusCode::UNAUTHORIZED, String::new()),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            map_status_error("gemini", StatusCode::TOO_MANY_REQUESTS, String::new()),
            LLMError::RateLimitExceeded
        ));
        assert!(matches!(
            map_status_error("gemini", StatusCode::NOT_FOUND, String::new()),
            LLMError::InvalidRequest(_)
        ));
        assert!(matches!(
            map_status_error("gemini", StatusCode::BAD_GATEWAY, String::new()),
            LLMError::ProviderUnavailable(_)
        ));
    }

    #[test]
    fn test_permanent_errors() {
        assert!(LLMError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(LLMError::InvalidRequest("no model".into()).is_permanent());
        assert!(!LLMError::Timeout.is_permanent());
        assert!(!LLMError::RateLimitExceeded.is_permanent());
    }
}
