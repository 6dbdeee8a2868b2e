//! Tracing-based logger setup for a Pentecter session: stdout (json or
//! pretty) and an optional plain append-only log file. No rotation or
//! retention — a session does not outlive a single process.

use std::fs::OpenOptions;
use std::io;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::{LogConfig, LogFormat};

/// Holds nothing of its own; exists so callers have a value whose drop
/// marks the end of the session's logging scope, matching the shape of
/// logger setups that do need a guard.
pub struct LoggerHandle;

/// Initializes the global tracing subscriber from `config`. Must be called
/// at most once per process.
pub fn init(config: &LogConfig) -> Result<LoggerHandle> {
    let default_level = parse_log_level(&config.level)?;
    let env_filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("failed to create log directory")?;
            let path = dir.join("pentecter.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(move || file.try_clone().expect("log file handle"))
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(env_filter.clone()),
            )
        }
        None => None,
    };

    let stdout_layer = config.enable_stdout.then(|| match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter.clone())
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stdout)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter.clone())
            .boxed(),
    });

    tracing_subscriber::registry().with(file_layer).with(stdout_layer).try_init().context("logger already initialized")?;

    tracing::info!(level = %config.level, format = ?config.format, file_output = config.log_dir.is_some(), "logger initialized");
    Ok(LoggerHandle)
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("invalid log level: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels_case_insensitively() {
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(parse_log_level("verbose").is_err());
    }
}
