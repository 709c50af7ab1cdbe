//! Logging setup for the daemon
//!
//! Installs one global `tracing` subscriber made of:
//! - an `EnvFilter` (RUST_LOG wins over the configured level)
//! - an optional console layer
//! - an optional JSON file layer with rotation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable console logging
    #[serde(default = "default_console_logging")]
    pub console_logging: bool,
    /// Enable JSON logging to `log_file_path`
    #[serde(default)]
    pub json_logging: bool,
    /// Local log file path
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
    /// Log file rotation
    #[serde(default)]
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            console_logging: default_console_logging(),
            json_logging: false,
            log_file_path: Some(PathBuf::from("logs/monitor.log")),
            rotation: LogRotation::Daily,
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_console_logging() -> bool { true }

/// Keeps the non-blocking file writer flushing; drop it only at exit
#[must_use = "dropping the guard stops file logging"]
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Map a level name to a tracing level, falling back to INFO
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Directive used when RUST_LOG is not set
pub fn default_directive(level: &str) -> String {
    let level = parse_level(level);
    format!("io_monitor_daemon={level},io_monitor={level}")
}

/// Install the global subscriber.
///
/// `level_override` (from the command line) takes precedence over
/// `config.log_level`.
pub fn init_logging(config: &TelemetryConfig, level_override: Option<&str>) -> Result<TelemetryGuard> {
    let level = level_override.unwrap_or(&config.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let console_layer = config
        .console_logging
        .then(|| fmt::layer().with_target(true).with_thread_names(true));

    let (file_layer, file_guard) = match (&config.log_file_path, config.json_logging) {
        (Some(log_path), true) => {
            let (directory, file_name) = split_log_path(log_path);
            std::fs::create_dir_all(directory)?;

            let file_appender = match config.rotation {
                LogRotation::Daily => rolling::daily(directory, file_name),
                LogRotation::Hourly => rolling::hourly(directory, file_name),
                LogRotation::Never => rolling::never(directory, file_name),
            };

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(TelemetryGuard {
        _file_guard: file_guard,
    })
}

fn split_log_path(log_path: &Path) -> (&Path, &OsStr) {
    let directory = log_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_path
        .file_name()
        .unwrap_or_else(|| OsStr::new("monitor.log"));
    (directory, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("trace", tracing::Level::TRACE)]
    #[test_case("DEBUG", tracing::Level::DEBUG)]
    #[test_case("warn", tracing::Level::WARN)]
    #[test_case("loud", tracing::Level::INFO ; "unknown falls back to info")]
    fn test_parse_level(name: &str, expected: tracing::Level) {
        assert_eq!(parse_level(name), expected);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("debug"),
            "io_monitor_daemon=DEBUG,io_monitor=DEBUG"
        );
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("logs/monitor.log"));
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "monitor.log");

        let (dir, name) = split_log_path(Path::new("bare.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "bare.log");
    }

    #[test]
    fn test_rotation_names() {
        let config: TelemetryConfig = toml::from_str("rotation = \"never\"").unwrap();
        assert_eq!(config.rotation, LogRotation::Never);
        assert_eq!(config.log_level, "info");
        assert!(config.console_logging);
        assert!(config.log_file_path.is_none());
    }
}
