//! Rerag SDK
//!
//! Shared library providing the collaborator traits, document types and
//! error types used by the engine and by document store implementations.

/// Collaborator traits (document store, generation model)
pub mod collaborator;

/// Error types and handling
pub mod errors;

/// Document types
pub mod types;

// Re-export commonly used types
pub use collaborator::{DocumentStore, GenerationModel};
pub use errors::{EngineError, ReragErrorExt};
pub use types::RetrievedDocument;
