use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use io_monitor::{ChannelListener, EventKind, MonitorEvent, PollingScheduler};

use crate::config::DaemonConfig;

/// Polls every enabled watcher and logs what changed
pub struct MonitorDaemon {
    config: DaemonConfig,
    scheduler: Arc<PollingScheduler>,
    events: Option<mpsc::UnboundedReceiver<MonitorEvent>>,
}

impl MonitorDaemon {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        info!("Initializing monitor daemon");

        config.validate()?;

        let (listener, events) = ChannelListener::channel();
        let listener = Arc::new(listener);

        let scheduler = PollingScheduler::new(config.daemon.poll_interval)
            .with_thread_name(config.daemon.thread_name.clone());

        for watcher in config.enabled_watchers() {
            let observer = watcher
                .build_observer()
                .with_context(|| format!("Failed to create watcher '{}'", watcher.id))?;
            observer.add_listener(listener.clone());
            info!(
                "Watching '{}' at {} (sort: {:?}, case: {:?})",
                watcher.id,
                watcher.path.display(),
                watcher.sort,
                watcher.case_sensitivity
            );
            scheduler.add_observer(Arc::new(observer));
        }

        if scheduler.observers().is_empty() {
            warn!("No enabled watchers configured");
        }

        Ok(Self {
            config,
            scheduler: Arc::new(scheduler),
            events: Some(events),
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    /// Start polling and spawn the task that logs events.
    ///
    /// Initializing observers walks whole trees, so it runs on the blocking pool.
    pub async fn start(&mut self) -> Result<JoinHandle<()>> {
        let events = self
            .events
            .take()
            .context("Monitor daemon was already started")?;

        let scheduler = self.scheduler.clone();
        tokio::task::spawn_blocking(move || scheduler.start()).await??;

        Ok(tokio::spawn(log_events(events)))
    }

    /// Stop polling; waits for the current pass to finish
    pub async fn stop(&self) -> Result<()> {
        let scheduler = self.scheduler.clone();
        tokio::task::spawn_blocking(move || scheduler.stop()).await??;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<()> {
        info!("Starting monitor daemon");
        let event_task = self.start().await?;
        info!(
            "Monitor daemon started, polling every {:?}",
            self.config.daemon.poll_interval
        );

        tokio::signal::ctrl_c().await?;
        info!("Ctrl+C received, shutting down");

        self.stop().await?;

        // Dropping the scheduler drops the observers and with them the
        // listener's sender, which ends the logging task.
        drop(self);
        if let Err(e) = event_task.await {
            warn!("Event logging task failed: {}", e);
        }

        info!("Monitor daemon stopped");
        Ok(())
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<MonitorEvent>) {
    while let Some(event) = events.recv().await {
        log_event(&event);
    }
    debug!("Event stream closed");
}

fn log_event(event: &MonitorEvent) {
    match event.kind {
        EventKind::Start | EventKind::Stop => {
            debug!(kind = ?event.kind, path = %event.path.display(), "Poll boundary")
        }
        kind => info!(kind = ?kind, path = %event.path.display(), "Change detected"),
    }
}

/// Summary line used by `config validate`
pub fn describe(config: &DaemonConfig) -> String {
    let enabled = config.enabled_watchers().count();
    format!(
        "{} watchers configured ({} enabled), polling every {:?}",
        config.watchers.len(),
        enabled,
        config.daemon.poll_interval
    )
}
