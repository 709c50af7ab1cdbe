//! Directory observer: polls one directory tree and reports what changed
//!
//! The observer keeps a snapshot tree of [`Entry`] values. Each call to
//! [`DirectoryObserver::check_and_notify`] lists the directory again, walks
//! the stored and fresh listings side by side in comparator order and fires
//! create / change / delete callbacks for every divergence, recursing into
//! subdirectories. The stored children of each level are then replaced with
//! the freshly reconciled list.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::comparator::{CaseSensitivity, FileComparator, PathComparator};
use crate::entry::{Entry, FileEntry};
use crate::error::{MonitorError, Result};
use crate::filter::PathFilter;
use crate::listener::{fan_out, AlterationListener, EventKind};
use crate::registry::CowRegistry;

/// Something a [`PollingScheduler`](crate::scheduler::PollingScheduler) can drive
pub trait Observer: Send + Sync {
    /// Root directory being observed
    fn directory(&self) -> &Path;

    /// Build the initial snapshot without firing events
    fn initialize(&self) -> Result<()>;

    /// Run one poll pass and notify listeners
    fn check_and_notify(&self);

    /// Release resources held by the observer
    fn destroy(&self) -> Result<()>;
}

/// Polling observer over a single directory tree.
///
/// Generic over the snapshot [`Entry`] type so hosts can capture extra
/// attributes; [`FileEntry`] is the default.
pub struct DirectoryObserver<E: Entry = FileEntry> {
    directory: PathBuf,
    root: Mutex<E>,
    filter: Option<Arc<dyn PathFilter>>,
    comparator: Arc<dyn PathComparator>,
    listeners: CowRegistry<Arc<dyn AlterationListener>>,
}

impl DirectoryObserver<FileEntry> {
    /// Observe `directory` with the default entry type, no filter and name
    /// ordering under the platform's case sensitivity
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        Self::from_entry(FileEntry::new(directory))
    }
}

impl<E: Entry> DirectoryObserver<E> {
    /// Observe the path of a caller-supplied root entry
    pub fn from_entry(root: E) -> Result<Self> {
        let directory = root.path().to_path_buf();
        if directory.as_os_str().is_empty() {
            return Err(MonitorError::invalid_root(
                directory,
                "Root directory path is empty",
            ));
        }

        Ok(Self {
            directory,
            root: Mutex::new(root),
            filter: None,
            comparator: Arc::new(FileComparator::name()),
            listeners: CowRegistry::new(),
        })
    }

    /// Only list children the filter accepts
    pub fn with_filter(mut self, filter: impl PathFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sort and match children with `comparator`
    pub fn with_comparator(mut self, comparator: impl PathComparator + 'static) -> Self {
        self.comparator = Arc::new(comparator);
        self
    }

    /// Use name ordering with the given case sensitivity
    pub fn with_case_sensitivity(self, case_sensitivity: CaseSensitivity) -> Self {
        self.with_comparator(FileComparator::name().with_case_sensitivity(case_sensitivity))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn filter(&self) -> Option<&dyn PathFilter> {
        self.filter.as_deref()
    }

    pub fn comparator(&self) -> &dyn PathComparator {
        self.comparator.as_ref()
    }

    /// Register a listener; takes effect from the next callback delivery
    pub fn add_listener(&self, listener: Arc<dyn AlterationListener>) {
        self.listeners.push(listener);
    }

    /// Unregister a listener by identity
    pub fn remove_listener(&self, listener: &Arc<dyn AlterationListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Listeners currently registered
    pub fn listeners(&self) -> Arc<Vec<Arc<dyn AlterationListener>>> {
        self.listeners.snapshot()
    }

    /// Run `inspect` against the stored snapshot tree
    pub fn inspect<R>(&self, inspect: impl FnOnce(&E) -> R) -> R {
        inspect(&self.root.lock())
    }

    /// Build the initial snapshot. A missing root yields an empty tree.
    pub fn initialize(&self) -> Result<()> {
        let mut root = self.root.lock();
        let path = root.path().to_path_buf();
        root.refresh(&path);

        let children: Vec<E> = if root.is_directory() {
            self.list_files(&path)
                .iter()
                .filter_map(|child| self.create_entry(&root, child))
                .collect()
        } else {
            Vec::new()
        };
        root.set_children(children);

        debug!(
            "Initialized observer for {} ({} top-level entries)",
            self.directory.display(),
            root.children().len()
        );
        Ok(())
    }

    /// Poll the directory once and notify listeners of every difference
    /// from the stored snapshot.
    pub fn check_and_notify(&self) {
        let listeners = self.listeners.snapshot();

        fan_out(&listeners, EventKind::Start, |l| l.on_start(self));

        {
            let mut root = self.root.lock();
            let root_path = root.path().to_path_buf();

            if root_path.exists() {
                let current = self.list_files(&root_path);
                self.check_level(&mut root, current, &listeners);
            } else if root.exists() {
                trace!("Root {} disappeared", root_path.display());
                self.check_level(&mut root, Vec::new(), &listeners);
            }
        }

        fan_out(&listeners, EventKind::Stop, |l| l.on_stop(self));
    }

    pub fn destroy(&self) -> Result<()> {
        debug!("Destroyed observer for {}", self.directory.display());
        Ok(())
    }

    /// Reconcile `parent`'s stored children with the sorted `current` listing
    fn check_level(
        &self,
        parent: &mut E,
        current: Vec<PathBuf>,
        listeners: &[Arc<dyn AlterationListener>],
    ) {
        let mut merge = LevelMerge {
            reconciled: Vec::with_capacity(current.len()),
            previous: parent.take_children().into(),
            parent,
        };
        let mut current = current.into_iter().peekable();

        while let Some(entry) = merge.previous.front_mut() {
            while let Some(path) = current
                .next_if(|path| self.comparator.compare(entry.path(), path) == Ordering::Greater)
            {
                if let Some(created) = self.create_entry(merge.parent, &path) {
                    self.fire_create(&created, listeners);
                    merge.reconciled.push(created);
                }
            }

            let was_directory = entry.is_directory();
            match current
                .next_if(|path| self.comparator.compare(entry.path(), path) == Ordering::Equal)
            {
                Some(path) => {
                    let changed = entry.refresh(&path);
                    if !entry.exists() {
                        self.check_level(entry, Vec::new(), listeners);
                        self.fire_delete(entry, was_directory, listeners);
                        merge.previous.pop_front();
                        continue;
                    }
                    if changed {
                        self.fire_change(entry, listeners);
                    }

                    let listing = if entry.is_directory() {
                        self.list_files(&path)
                    } else {
                        Vec::new()
                    };
                    self.check_level(entry, listing, listeners);
                    merge.reconciled.extend(merge.previous.pop_front());
                }
                None => {
                    self.check_level(entry, Vec::new(), listeners);
                    self.fire_delete(entry, was_directory, listeners);
                    merge.previous.pop_front();
                }
            }
        }

        for path in current {
            if let Some(created) = self.create_entry(merge.parent, &path) {
                self.fire_create(&created, listeners);
                merge.reconciled.push(created);
            }
        }
    }

    /// Build a refreshed entry for `path` including its whole subtree.
    /// Paths whose attributes cannot be read yield `None`.
    fn create_entry(&self, parent: &E, path: &Path) -> Option<E> {
        let mut entry = parent.new_child(path);
        entry.refresh(path);
        if !entry.exists() {
            trace!("Skipping unreadable {}", path.display());
            return None;
        }

        if entry.is_directory() {
            let children = self
                .list_files(path)
                .iter()
                .filter_map(|child| self.create_entry(&entry, child))
                .collect();
            entry.set_children(children);
        }

        Some(entry)
    }

    /// Filtered, sorted children of `directory`; unreadable means empty
    fn list_files(&self, directory: &Path) -> Vec<PathBuf> {
        let read_dir = match fs::read_dir(directory) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                trace!("Cannot list {}: {}", directory.display(), e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|dir_entry| dir_entry.ok())
            .map(|dir_entry| dir_entry.path())
            .filter(|path| self.filter.as_ref().map_or(true, |f| f.accept(path)))
            .collect();

        paths.sort_by(|a, b| self.comparator.compare(a, b));
        paths
    }

    fn fire_create(&self, entry: &E, listeners: &[Arc<dyn AlterationListener>]) {
        let path = entry.path();
        if entry.is_directory() {
            trace!("Directory created: {}", path.display());
            fan_out(listeners, EventKind::DirectoryCreate, |l| {
                l.on_directory_create(path)
            });
        } else {
            trace!("File created: {}", path.display());
            fan_out(listeners, EventKind::FileCreate, |l| l.on_file_create(path));
        }

        for child in entry.children() {
            self.fire_create(child, listeners);
        }
    }

    fn fire_change(&self, entry: &E, listeners: &[Arc<dyn AlterationListener>]) {
        let path = entry.path();
        if entry.is_directory() {
            trace!("Directory changed: {}", path.display());
            fan_out(listeners, EventKind::DirectoryChange, |l| {
                l.on_directory_change(path)
            });
        } else {
            trace!("File changed: {}", path.display());
            fan_out(listeners, EventKind::FileChange, |l| l.on_file_change(path));
        }
    }

    /// `is_directory` is the type the entry had before this pass
    fn fire_delete(
        &self,
        entry: &E,
        is_directory: bool,
        listeners: &[Arc<dyn AlterationListener>],
    ) {
        let path = entry.path();
        if is_directory {
            trace!("Directory deleted: {}", path.display());
            fan_out(listeners, EventKind::DirectoryDelete, |l| {
                l.on_directory_delete(path)
            });
        } else {
            trace!("File deleted: {}", path.display());
            fan_out(listeners, EventKind::FileDelete, |l| l.on_file_delete(path));
        }
    }
}

/// One level of the snapshot while it is being reconciled. Dropping it
/// stores the reconciled entries followed by those not yet visited, so an
/// unwinding filter or comparator leaves the level as it was.
struct LevelMerge<'a, E: Entry> {
    parent: &'a mut E,
    previous: VecDeque<E>,
    reconciled: Vec<E>,
}

impl<E: Entry> Drop for LevelMerge<'_, E> {
    fn drop(&mut self) {
        let mut children = std::mem::take(&mut self.reconciled);
        children.extend(self.previous.drain(..));
        self.parent.set_children(children);
    }
}

impl<E: Entry> Observer for DirectoryObserver<E> {
    fn directory(&self) -> &Path {
        &self.directory
    }

    fn initialize(&self) -> Result<()> {
        DirectoryObserver::initialize(self)
    }

    fn check_and_notify(&self) {
        DirectoryObserver::check_and_notify(self)
    }

    fn destroy(&self) -> Result<()> {
        DirectoryObserver::destroy(self)
    }
}

impl<E: Entry> fmt::Debug for DirectoryObserver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryObserver")
            .field("directory", &self.directory)
            .field("filtered", &self.filter.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
