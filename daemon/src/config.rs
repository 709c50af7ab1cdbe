use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use io_monitor::{
    CaseSensitivity, ComparisonMethod, DirectoryObserver, FileComparator, FileFilter,
    FilterOptions,
};

use crate::telemetry::TelemetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub watchers: Vec<WatcherConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub id: String,
    pub path: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_include_hidden")]
    pub include_hidden: bool,
    #[serde(default)]
    pub case_sensitivity: CaseSensitivity,
    #[serde(default)]
    pub sort: ComparisonMethod,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings::default(),
            telemetry: TelemetryConfig::default(),
            watchers: vec![Self::default_watcher()],
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            thread_name: default_thread_name(),
        }
    }
}

impl DaemonConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.daemon.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }

        let mut seen = HashSet::new();
        for watcher in &self.watchers {
            if watcher.id.is_empty() {
                anyhow::bail!("Watcher ID cannot be empty");
            }
            if !seen.insert(watcher.id.as_str()) {
                anyhow::bail!("Duplicate watcher ID: {}", watcher.id);
            }

            watcher
                .file_filter()
                .with_context(|| format!("Invalid patterns for watcher '{}'", watcher.id))?;
        }

        Ok(())
    }

    /// Watchers that should be polled
    pub fn enabled_watchers(&self) -> impl Iterator<Item = &WatcherConfig> {
        self.watchers.iter().filter(|watcher| watcher.enabled)
    }

    fn default_watcher() -> WatcherConfig {
        WatcherConfig {
            id: "default".to_string(),
            path: PathBuf::from("./data"),
            enabled: true,
            include_patterns: Vec::new(),
            exclude_patterns: vec!["**/*.tmp".to_string(), "**/*.swp".to_string()],
            include_hidden: false,
            case_sensitivity: CaseSensitivity::System,
            sort: ComparisonMethod::Name,
        }
    }
}

impl WatcherConfig {
    pub fn file_filter(&self) -> io_monitor::Result<FileFilter> {
        FileFilter::new(FilterOptions {
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            case_sensitive: self.case_sensitivity.is_case_sensitive(),
            include_hidden: self.include_hidden,
            ..Default::default()
        })
    }

    pub fn comparator(&self) -> FileComparator {
        FileComparator::new(self.sort).with_case_sensitivity(self.case_sensitivity)
    }

    /// Build the observer for this watcher; listeners are attached by the caller
    pub fn build_observer(&self) -> Result<DirectoryObserver> {
        let observer = DirectoryObserver::new(&self.path)?
            .with_filter(self.file_filter()?)
            .with_comparator(self.comparator());
        Ok(observer)
    }
}

// Default value functions
fn default_poll_interval() -> Duration { Duration::from_secs(1) }
fn default_thread_name() -> String { "io-monitor".to_string() }
fn default_enabled() -> bool { true }
fn default_include_hidden() -> bool { true }
