//! CLI interface for rerag
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Recursive retrieval-augmented generation
///
/// Answers a question by retrieving documents, following the references
/// they contain, and synthesizing one answer from everything collected.
#[derive(Parser, Debug)]
#[command(name = "rerag")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a question
    Run {
        /// The question to answer
        question: String,

        /// Maximum retrieve rounds (defaults to rag.max_recursions)
        #[arg(short, long, value_name = "N")]
        max_recursions: Option<u32>,

        /// JSON corpus to search instead of the configured one
        #[arg(long, value_name = "PATH")]
        corpus: Option<PathBuf>,

        /// Documents to retrieve per round (defaults to retrieval.top_k)
        #[arg(short = 'k', long, value_name = "K")]
        top_k: Option<usize>,
    },

    /// Show run history
    History {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a past run with all of its steps
    Replay {
        /// Run ID to replay
        run_id: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run system diagnostics
    Doctor,
}

/// Configuration management actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Store a provider API key in the OS keychain (read from stdin)
    SetKey {
        /// Provider name (gemini, openai, anthropic)
        provider: String,
    },

    /// Remove a provider API key from the OS keychain
    DeleteKey {
        /// Provider name (gemini, openai, anthropic)
        provider: String,
    },
}
