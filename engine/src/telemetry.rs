//! Telemetry
//!
//! Sets up `tracing-subscriber` for structured logging. The configured log
//! level applies to the engine crate; `RUST_LOG` overrides everything.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a configured level.
///
/// Dependencies (hyper, sqlx, ...) are held at `warn` unless the engine level
/// is `trace`.
pub fn default_filter(log_level: &str) -> String {
    if log_level == "trace" {
        format!("trace,rerag_engine={}", log_level)
    } else {
        format!("warn,rerag_engine={},rerag={}", log_level, log_level)
    }
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter.
///
/// In debug builds: pretty-printed output on stderr.
/// In release builds: JSON structured output with spans on stderr.
///
/// Logs go to stderr so `rerag --json run ...` keeps stdout machine-readable.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_engine() {
        assert_eq!(
            default_filter("debug"),
            "warn,rerag_engine=debug,rerag=debug"
        );
        assert!(default_filter("trace").starts_with("trace"));
        assert!(EnvFilter::try_new(default_filter("info")).is_ok());
    }
}
