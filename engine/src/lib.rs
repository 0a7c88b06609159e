//! Rerag Engine Library
//!
//! This library provides the core functionality of the rerag engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Recursive retrieve-generate-decide loop
pub mod rag;

/// In-memory document store
pub mod store;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
