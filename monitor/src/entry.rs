//! Snapshot entries: the captured state of a single file or directory
//!
//! An observer keeps a tree of entries mirroring what it saw on the previous
//! poll. Each entry records the attributes used to detect changes and owns
//! its children; the link back to the parent is a lookup (the parent's path),
//! never ownership.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

/// Attributes captured for one path at refresh time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Last path component, cached when the entry was refreshed
    pub name: String,
    /// Full path the attributes were read from
    pub path: PathBuf,
    /// Path of the enclosing entry, `None` for the root
    pub parent: Option<PathBuf>,
    /// Depth below the observed root (root = 0)
    pub level: usize,
    /// Whether the path existed at the last refresh
    pub exists: bool,
    /// Whether the path was a directory at the last refresh
    pub is_directory: bool,
    /// Whether the path was a symbolic link at the last refresh. Links below
    /// the root are never followed, so a link is always a leaf entry.
    pub is_symlink: bool,
    /// Last modified time, only present if the path exists
    pub last_modified: Option<SystemTime>,
    /// Length in bytes for regular files, 0 for directories and absent paths
    pub length: u64,
}

impl Attributes {
    /// Unrefreshed attributes for `path`, parented under `parent`
    pub fn new(path: &Path, parent: Option<&Attributes>) -> Self {
        Self {
            name: entry_name(path),
            path: path.to_path_buf(),
            parent: parent.map(|p| p.path.clone()),
            level: parent.map(|p| p.level + 1).unwrap_or(0),
            exists: false,
            is_directory: false,
            is_symlink: false,
            last_modified: None,
            length: 0,
        }
    }

    /// Re-read the tracked attributes from `path`.
    ///
    /// Returns `true` if existence, type, modification time or length differ
    /// from the previous values. Any metadata error is treated as the path
    /// being absent.
    ///
    /// The root (an entry without a parent) resolves symbolic links; every
    /// other entry reads the link itself.
    pub fn refresh(&mut self, path: &Path) -> bool {
        let before = self.tracked();

        self.name = entry_name(path);
        self.path = path.to_path_buf();

        let metadata = if self.parent.is_none() {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        };

        match metadata {
            Ok(metadata) => {
                self.exists = true;
                self.is_directory = metadata.is_dir();
                self.is_symlink = metadata.file_type().is_symlink();
                self.last_modified = metadata.modified().ok();
                self.length = if self.is_directory { 0 } else { metadata.len() };
            }
            Err(e) => {
                trace!("Treating {} as absent: {}", path.display(), e);
                self.exists = false;
                self.is_directory = false;
                self.is_symlink = false;
                self.last_modified = None;
                self.length = 0;
            }
        }

        before != self.tracked()
    }

    fn tracked(&self) -> (bool, bool, bool, Option<SystemTime>, u64) {
        (
            self.exists,
            self.is_directory,
            self.is_symlink,
            self.last_modified,
            self.length,
        )
    }
}

/// Capability set every snapshot entry variant provides.
///
/// The diff algorithm only talks to entries through this trait, so hosts can
/// capture extra attributes (see [`HashedEntry`]) without touching the
/// observer.
pub trait Entry: Sized + Send + fmt::Debug {
    /// Captured attributes
    fn attributes(&self) -> &Attributes;

    /// Re-read state from `path`; returns whether anything tracked changed.
    /// Does not recurse into children.
    fn refresh(&mut self, path: &Path) -> bool;

    /// Create an unrefreshed entry of the same kind, parented under `self`
    fn new_child(&self, path: &Path) -> Self;

    /// Children in comparator order
    fn children(&self) -> &[Self];

    /// Mutable access to the children list
    fn children_mut(&mut self) -> &mut Vec<Self>;

    /// Replace the children as a whole
    fn set_children(&mut self, children: Vec<Self>) {
        *self.children_mut() = children;
    }

    /// Remove and return the children, leaving the list empty
    fn take_children(&mut self) -> Vec<Self> {
        std::mem::take(self.children_mut())
    }

    fn name(&self) -> &str {
        &self.attributes().name
    }

    fn path(&self) -> &Path {
        &self.attributes().path
    }

    fn parent(&self) -> Option<&Path> {
        self.attributes().parent.as_deref()
    }

    fn level(&self) -> usize {
        self.attributes().level
    }

    fn exists(&self) -> bool {
        self.attributes().exists
    }

    fn is_directory(&self) -> bool {
        self.attributes().is_directory
    }

    fn is_symlink(&self) -> bool {
        self.attributes().is_symlink
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.attributes().last_modified
    }

    fn length(&self) -> u64 {
        self.attributes().length
    }
}

/// Default entry: tracks existence, type, modification time and length
#[derive(Debug, Clone)]
pub struct FileEntry {
    attributes: Attributes,
    children: Vec<FileEntry>,
}

impl FileEntry {
    /// Create a root entry for `path`. Call [`Entry::refresh`] to populate it.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            attributes: Attributes::new(path.as_ref(), None),
            children: Vec::new(),
        }
    }
}

impl Entry for FileEntry {
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn refresh(&mut self, path: &Path) -> bool {
        self.attributes.refresh(path)
    }

    fn new_child(&self, path: &Path) -> Self {
        Self {
            attributes: Attributes::new(path, Some(&self.attributes)),
            children: Vec::new(),
        }
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.children
    }
}

/// Entry that also records a BLAKE3 digest of regular file contents.
///
/// Edits that keep both size and modification time intact are still
/// reported as changes.
#[derive(Debug, Clone)]
pub struct HashedEntry {
    attributes: Attributes,
    digest: Option<blake3::Hash>,
    children: Vec<HashedEntry>,
}

impl HashedEntry {
    /// Create a root entry for `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            attributes: Attributes::new(path.as_ref(), None),
            digest: None,
            children: Vec::new(),
        }
    }

    /// Digest of the file contents at the last refresh, if it was a readable file
    pub fn digest(&self) -> Option<&blake3::Hash> {
        self.digest.as_ref()
    }
}

impl Entry for HashedEntry {
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn refresh(&mut self, path: &Path) -> bool {
        let attributes_changed = self.attributes.refresh(path);

        let attributes = &self.attributes;
        let digest = if attributes.exists && !attributes.is_directory && !attributes.is_symlink {
            match hash_file(path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    trace!("Could not hash {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let digest_changed = digest != self.digest;
        self.digest = digest;

        attributes_changed || digest_changed
    }

    fn new_child(&self, path: &Path) -> Self {
        Self {
            attributes: Attributes::new(path, Some(&self.attributes)),
            digest: None,
            children: Vec::new(),
        }
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.children
    }
}

fn hash_file(path: &Path) -> std::io::Result<blake3::Hash> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
