// Rerag
// Main entry point for the rerag binary

use clap::Parser;
use rerag_engine::cli::{Cli, Command};
use rerag_engine::config::Config;
use rerag_engine::handlers::{
    handle_config, handle_doctor, handle_history, handle_replay, handle_run, OutputFormat,
    RunOptions,
};
use rerag_engine::telemetry::init_telemetry_with_level;
use sdk::EngineError;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // API keys may live in a .env file next to the working directory
    dotenvy::dotenv().ok();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let log_level = match cli.log.as_deref() {
        Some(level) if LOG_LEVELS.contains(&level) => level,
        Some(level) => {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                level,
                LOG_LEVELS.join(", ")
            ))
            .into())
        }
        None => config.core.log_level.as_str(),
    };
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Rerag v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Run {
            question,
            max_recursions,
            corpus,
            top_k,
        } => {
            tracing::info!("Answering: {}", question);
            let options = RunOptions {
                max_recursions,
                corpus,
                top_k,
            };
            handle_run(question, options, &config, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} runs", limit);
            handle_history(limit, &config, format).await
        }

        Command::Replay { run_id } => {
            tracing::info!("Replaying run: {}", run_id);
            handle_replay(run_id, &config, format).await
        }

        Command::Config { action } => {
            tracing::info!("Config management: {:?}", action);
            handle_config(action, &config, cli.config.as_deref(), format)
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
