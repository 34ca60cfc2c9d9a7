use anyhow::{Context, Result};
use std::io::{self, IsTerminal};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::LoggingConfig;

const LOG_FILE_NAME: &str = "stablerun.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

/// Process-wide tracing subscriber.
///
/// Orchestrator logs go to stderr so stdout stays free for forwarded tool
/// output and the final report. Keep the value alive for the life of the
/// process: dropping it flushes and stops the file writer.
pub struct Logger {
    _guard: Option<WorkerGuard>,
}

impl Logger {
    /// Install the global subscriber described by `config`.
    ///
    /// `RUST_LOG` directives take precedence over `config.level`.
    ///
    /// # Errors
    /// Returns an error for an invalid level, format or rotation, or when a
    /// global subscriber is already installed.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let format = parse_format(&config.format)?;
        let rotation = parse_rotation(&config.rotation)?;

        let env_filter = EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy();

        let stderr_layer = match format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .with_target(false)
                .boxed(),
        };

        let (file_layer, guard) = match config.log_dir.as_deref() {
            Some(dir) => {
                let (writer, guard) = tracing_appender::non_blocking(file_appender(dir, rotation)?);
                // Files are always JSON
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        tracing::debug!(
            level = %config.level,
            format = %config.format,
            file_output = config.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

fn file_appender(dir: &Path, rotation: RotationPolicy) -> Result<rolling::RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok(match rotation {
        RotationPolicy::Daily => rolling::daily(dir, LOG_FILE_NAME),
        RotationPolicy::Hourly => rolling::hourly(dir, LOG_FILE_NAME),
        RotationPolicy::Never => rolling::never(dir, LOG_FILE_NAME),
    })
}

/// Parse log level string to Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}

fn parse_format(format: &str) -> Result<LogFormat> {
    match format.to_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        _ => anyhow::bail!("Invalid log format: {format}"),
    }
}

fn parse_rotation(rotation: &str) -> Result<RotationPolicy> {
    match rotation.to_lowercase().as_str() {
        "daily" => Ok(RotationPolicy::Daily),
        "hourly" => Ok(RotationPolicy::Hourly),
        "never" => Ok(RotationPolicy::Never),
        _ => anyhow::bail!("Invalid log rotation: {rotation}"),
    }
}
