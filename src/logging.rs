// src/logging.rs

//! Logging setup for `jobdrive` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit level passed by the embedding application (if provided)
//! 2. `JOBDRIVE_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for whatever the
//! embedding application wants to print.

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(level: Option<tracing::Level>) -> Result<()> {
    let level = match level {
        Some(lvl) => lvl,
        None => std::env::var("JOBDRIVE_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    // Send logs to stderr; keep stdout free for the embedding application.
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
