//! Recursive retrieval-augmented generation
//!
//! A run retrieves documents for a question, drafts an answer, looks for
//! references to other documents in everything it has read, and follows
//! them until nothing new turns up or the depth bound is reached. One final
//! synthesis call then answers from everything collected.

pub mod decision;
pub mod executor;
pub mod phase;
pub mod prompts;
pub mod retry;
pub mod state;
pub mod steps;
pub mod targets;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

/// Recursion bound used when none is given
pub const DEFAULT_MAX_RECURSIONS: u32 = 2;

/// Documents included in each intermediate prompt
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

pub use decision::{decide, Decision, EndReason};
pub use executor::{run_name, RagSettings, RecursiveRag, RunOutcome, RunStats, TraceEvent};
pub use phase::Phase;
pub use state::RunState;
pub use targets::extract_new_targets;
