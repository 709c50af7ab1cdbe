//! IO Monitor Library
//!
//! Polling-based filesystem change detection:
//! - Snapshot trees of files and directories with pluggable entry types
//! - Per-directory observers that diff the snapshot against the disk
//! - Glob, name and closure based path filtering
//! - Configurable listing order and case sensitivity
//! - A background scheduler that polls observers on a fixed interval
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use io_monitor::{ChannelListener, DirectoryObserver, PollingScheduler};
//!
//! # fn main() -> io_monitor::Result<()> {
//! let observer = DirectoryObserver::new("./data")?;
//! let (listener, mut events) = ChannelListener::channel();
//! observer.add_listener(Arc::new(listener));
//!
//! let scheduler = PollingScheduler::new(Duration::from_secs(1));
//! scheduler.add_observer(Arc::new(observer));
//! scheduler.start()?;
//! # let _ = events.try_recv();
//! scheduler.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod comparator;
pub mod entry;
pub mod error;
pub mod filter;
pub mod listener;
pub mod observer;
pub mod registry;
pub mod scheduler;

// Re-export main types
pub use comparator::{
    CaseSensitivity, ChainedComparator, ComparisonMethod, FileComparator, PathComparator,
};
pub use entry::{Attributes, Entry, FileEntry, HashedEntry};
pub use error::{MonitorError, Result};
pub use filter::{FileFilter, FileTypeFilter, FilterOptions, NameFilter, PathFilter, PathFilterExt};
pub use listener::{AlterationListener, ChannelListener, EventKind, MonitorEvent};
pub use observer::{DirectoryObserver, Observer};
pub use registry::CowRegistry;
pub use scheduler::PollingScheduler;
