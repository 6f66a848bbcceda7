//! Shared logging configuration and initialization for the pipeline binaries.
//!
//! Pipeline events are emitted under the `wxfeat` target. The configured
//! level applies to that target only; HTTP and TLS crates log at
//! `dependency_level` unless a full filter directive is given instead.

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::env_value;

const CRATE_TARGET: &str = "wxfeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// A bare level (`debug`) for pipeline events, or a full `EnvFilter` directive list.
    pub level: String,
    pub dependency_level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dependency_level: "warn".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directives for this config.
    pub fn filter_directives(&self) -> String {
        if self.level.contains('=') || self.level.contains(',') {
            return self.level.clone();
        }
        format!("{},{CRATE_TARGET}={}", self.dependency_level, self.level)
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("invalid log filter '{directives}': {source}")]
    InvalidFilter {
        directives: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Reads `WXF_LOG_LEVEL`, `WXF_LOG_DEPS`, `WXF_LOG_FORMAT` and `WXF_LOG_TARGET`.
/// Unparseable format or target values keep the defaults.
pub fn logging_config_from_env() -> LoggingConfig {
    let defaults = LoggingConfig::default();
    LoggingConfig {
        level: env_value("WXF_LOG_LEVEL").unwrap_or(defaults.level),
        dependency_level: env_value("WXF_LOG_DEPS").unwrap_or(defaults.dependency_level),
        format: env_value("WXF_LOG_FORMAT")
            .and_then(|raw| parse_log_format(&raw))
            .unwrap_or(defaults.format),
        include_target: env_value("WXF_LOG_TARGET")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingInitError> {
    let directives = config.filter_directives();
    EnvFilter::try_new(&directives)
        .map_err(|source| LoggingInitError::InvalidFilter { directives, source })
}

/// Installs the global subscriber. A malformed filter is an error rather
/// than a silent fallback.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_target(config.include_target);

    match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.with_ansi(false).json().finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

/// Emits the `app.start` event every binary logs before touching the network or disk.
pub fn log_app_start(binary: &'static str, config: &LoggingConfig) {
    info!(
        component = binary,
        event = "app.start",
        log_filter = %config.filter_directives(),
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_output_written(binary: &'static str, label: &str, path: &str, rows: usize) {
    info!(
        component = binary,
        event = "app.output.written",
        label,
        path,
        rows
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
