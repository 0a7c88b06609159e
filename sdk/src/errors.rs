//! Error types and handling
//!
//! This module provides the error types used throughout the rerag engine.
//! All errors implement the `ReragErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Recoverability drives the retry layer: only recoverable errors are retried,
//! everything else surfaces to the caller on the first occurrence.
//!
//! # Security
//!
//! All error messages are scrubbed to ensure:
//! - No secrets (API keys, tokens) are included
//! - No provider response bodies containing credentials reach the user

use thiserror::Error;

/// Trait for rerag error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ReragErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried. Non-recoverable errors require
    /// the caller to fix configuration or abort the run.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration and credentials
/// - **Retrieval**: Document store unreachable or query failure
/// - **Generation**: Model call failures
/// - **Run control**: Cancellation, timeouts, state violations
/// - **Secrets**: OS keychain access failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ReragErrorExt};
///
/// let error = EngineError::Retrieval("connection refused".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("missing GEMINI_API_KEY".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Document store errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    // Generation model errors
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Run control errors
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid run state: {0}")]
    InvalidState(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReragErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml and API key environment variables",

            Self::Retrieval(_) => "Document store query failed. Check the corpus file",

            Self::Generation(_) => "The model could not produce an answer. Try again",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",

            Self::Timeout { .. } => "An external call took too long to respond. Try again",
            Self::Cancelled => "The run was cancelled before it finished",
            Self::InvalidState(_) => "Internal run state violation",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Serialization(_) => "Failed to encode or decode data",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Transient failures of external collaborators
            Self::Retrieval(_)
            | Self::Generation(_)
            | Self::LLMProvider(_)
            | Self::Timeout { .. } => true,

            // Everything else needs the caller to act
            Self::Config(_)
            | Self::Cancelled
            | Self::InvalidState(_)
            | Self::KeyringError(_)
            | Self::Serialization(_)
            | Self::Io(_) => false,
        }
    }
}
