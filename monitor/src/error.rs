//! Error types for the monitor library

use std::path::PathBuf;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors surfaced by observers, filters and the polling scheduler.
///
/// Transient I/O failures during a poll never reach this type: they degrade
/// the affected path to "absent" for that pass.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The observed root could not be used
    #[error("Invalid root directory '{path}': {message}")]
    InvalidRoot { path: PathBuf, message: String },

    /// Filter pattern errors
    #[error("Filter pattern error: {0}")]
    FilterPattern(String),

    /// `start` was called on a scheduler that is already polling
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// `stop` was called on a scheduler that is idle
    #[error("Monitor is not running")]
    NotRunning,

    /// The background polling thread could not be spawned
    #[error("Failed to spawn polling thread: {0}")]
    ThreadSpawn(std::io::Error),
}

impl MonitorError {
    /// Create a new invalid root error
    pub fn invalid_root(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new filter pattern error
    pub fn pattern_error(pattern: &str, message: impl std::fmt::Display) -> Self {
        Self::FilterPattern(format!("Failed to compile glob '{}': {}", pattern, message))
    }
}
