//! Logging initialization.
//!
//! Logs go to stderr so stdout stays clean for recognition output and JSON.
//! `RUST_LOG` overrides the configured level.

use glimpse_core::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber at `level`, pretty or JSON.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(console::colors_enabled_stderr()),
            )
            .init();
    }
}

/// Initialize logging from `[logging]`, with `--verbose` and `--json-logs` winning.
pub fn init_from_config(config: &glimpse_core::Config, verbose: bool, json_logs: bool) {
    let level = effective_level(&config.logging, verbose);
    init(level, json_logs || config.logging.format == "json");
}

fn effective_level(logging: &LoggingConfig, verbose: bool) -> &str {
    match logging.level.as_str() {
        "trace" => "trace",
        _ if verbose => "debug",
        level => level,
    }
}
