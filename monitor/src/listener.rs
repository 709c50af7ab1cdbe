//! Listener interface for observer notifications
//!
//! Every callback has an empty default body, so implementors only override
//! the events they care about.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::observer::Observer;

/// Receives the events found by one poll pass.
///
/// `on_start` and `on_stop` bracket each pass. Callbacks run on the polling
/// thread while the observer's snapshot is locked, so they must not call back
/// into the same observer's `initialize` or `check_and_notify`.
#[allow(unused_variables)]
pub trait AlterationListener: Send + Sync {
    fn on_start(&self, observer: &dyn Observer) {}

    fn on_directory_create(&self, directory: &Path) {}

    fn on_directory_change(&self, directory: &Path) {}

    fn on_directory_delete(&self, directory: &Path) {}

    fn on_file_create(&self, file: &Path) {}

    fn on_file_change(&self, file: &Path) {}

    fn on_file_delete(&self, file: &Path) {}

    fn on_stop(&self, observer: &dyn Observer) {}
}

/// Kind of a [`MonitorEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    DirectoryCreate,
    DirectoryChange,
    DirectoryDelete,
    FileCreate,
    FileChange,
    FileDelete,
    Stop,
}

impl EventKind {
    /// Whether this kind describes a filesystem divergence rather than a pass boundary
    pub fn is_alteration(self) -> bool {
        !matches!(self, Self::Start | Self::Stop)
    }
}

/// One listener callback captured as a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub kind: EventKind,
    /// Affected path; the observed root directory for `Start` and `Stop`
    pub path: PathBuf,
}

impl MonitorEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Listener forwarding every callback into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving half of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn new(sender: mpsc::UnboundedSender<MonitorEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, kind: EventKind, path: &Path) {
        if let Err(e) = self.sender.send(MonitorEvent::new(kind, path)) {
            debug!("Dropping {:?} event for {}: {}", kind, path.display(), e);
        }
    }
}

impl AlterationListener for ChannelListener {
    fn on_start(&self, observer: &dyn Observer) {
        self.send(EventKind::Start, observer.directory());
    }

    fn on_directory_create(&self, directory: &Path) {
        self.send(EventKind::DirectoryCreate, directory);
    }

    fn on_directory_change(&self, directory: &Path) {
        self.send(EventKind::DirectoryChange, directory);
    }

    fn on_directory_delete(&self, directory: &Path) {
        self.send(EventKind::DirectoryDelete, directory);
    }

    fn on_file_create(&self, file: &Path) {
        self.send(EventKind::FileCreate, file);
    }

    fn on_file_change(&self, file: &Path) {
        self.send(EventKind::FileChange, file);
    }

    fn on_file_delete(&self, file: &Path) {
        self.send(EventKind::FileDelete, file);
    }

    fn on_stop(&self, observer: &dyn Observer) {
        self.send(EventKind::Stop, observer.directory());
    }
}

/// Deliver one callback to each listener in order, isolating panics so a
/// misbehaving listener neither blocks its siblings nor aborts the pass.
pub(crate) fn fan_out(
    listeners: &[Arc<dyn AlterationListener>],
    kind: EventKind,
    call: impl Fn(&dyn AlterationListener),
) {
    for listener in listeners {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))) {
            warn!(
                "Listener panicked while handling {:?}: {}",
                kind,
                panic_message(panic.as_ref())
            );
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
