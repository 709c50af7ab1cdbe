//! Path orderings used to sort directory listings and match entries
//!
//! The observer sorts every listing with a [`PathComparator`] and treats two
//! paths that compare `Equal` as the same logical file, so the ordering must
//! be stable across polls.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// How file names are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    /// Names differing only in case are distinct
    Sensitive,
    /// Names differing only in case are the same
    Insensitive,
    /// Follow the host platform (insensitive on Windows, sensitive elsewhere)
    #[default]
    System,
}

impl CaseSensitivity {
    /// Whether this setting distinguishes case on the current platform
    pub fn is_case_sensitive(self) -> bool {
        match self {
            Self::Sensitive => true,
            Self::Insensitive => false,
            Self::System => !cfg!(windows),
        }
    }

    /// Compare two strings under this setting
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        if self.is_case_sensitive() {
            a.cmp(b)
        } else {
            a.to_lowercase().cmp(&b.to_lowercase())
        }
    }

    /// Compare two OS strings under this setting
    pub fn compare_os(self, a: &OsStr, b: &OsStr) -> Ordering {
        if self.is_case_sensitive() {
            a.cmp(b)
        } else {
            self.compare(&a.to_string_lossy(), &b.to_string_lossy())
        }
    }

    pub fn equals(self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    pub fn starts_with(self, value: &str, prefix: &str) -> bool {
        if self.is_case_sensitive() {
            value.starts_with(prefix)
        } else {
            value.to_lowercase().starts_with(&prefix.to_lowercase())
        }
    }

    pub fn ends_with(self, value: &str, suffix: &str) -> bool {
        if self.is_case_sensitive() {
            value.ends_with(suffix)
        } else {
            value.to_lowercase().ends_with(&suffix.to_lowercase())
        }
    }
}

/// Total order over two paths
pub trait PathComparator: Send + Sync {
    fn compare(&self, a: &Path, b: &Path) -> Ordering;
}

impl<F> PathComparator for F
where
    F: Fn(&Path, &Path) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &Path, b: &Path) -> Ordering {
        self(a, b)
    }
}

/// Attribute a [`FileComparator`] orders by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMethod {
    /// Last path component
    #[default]
    Name,
    /// Full path
    Path,
    /// Extension (text after the last dot of the name)
    Extension,
    /// Modification time, missing times sort first
    LastModified,
    /// File length, directories count as 0
    Size,
    /// Directories before files, no further ordering
    DirectoryFirst,
}

/// Configurable path comparator
#[derive(Debug, Clone, Copy)]
pub struct FileComparator {
    method: ComparisonMethod,
    case_sensitivity: CaseSensitivity,
    reverse: bool,
}

impl Default for FileComparator {
    fn default() -> Self {
        Self::name()
    }
}

impl FileComparator {
    /// Create a comparator for `method` with system case sensitivity
    pub fn new(method: ComparisonMethod) -> Self {
        Self {
            method,
            case_sensitivity: CaseSensitivity::System,
            reverse: false,
        }
    }

    /// Order by file name
    pub fn name() -> Self {
        Self::new(ComparisonMethod::Name)
    }

    /// Set the case sensitivity used by name, path and extension ordering
    pub fn with_case_sensitivity(mut self, case_sensitivity: CaseSensitivity) -> Self {
        self.case_sensitivity = case_sensitivity;
        self
    }

    /// Invert the ordering
    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }

    /// Break ties of `self` with `next`
    pub fn then<C: PathComparator>(self, next: C) -> ChainedComparator<Self, C> {
        ChainedComparator { first: self, next }
    }

    pub fn method(&self) -> ComparisonMethod {
        self.method
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    fn compare_forward(&self, a: &Path, b: &Path) -> Ordering {
        match self.method {
            ComparisonMethod::Name => self.case_sensitivity.compare_os(
                a.file_name().unwrap_or(a.as_os_str()),
                b.file_name().unwrap_or(b.as_os_str()),
            ),
            ComparisonMethod::Path => self.case_sensitivity.compare_os(a.as_os_str(), b.as_os_str()),
            ComparisonMethod::Extension => {
                self.case_sensitivity.compare(&extension_of(a), &extension_of(b))
            }
            ComparisonMethod::LastModified => modified_time(a).cmp(&modified_time(b)),
            ComparisonMethod::Size => file_size(a).cmp(&file_size(b)),
            ComparisonMethod::DirectoryFirst => b.is_dir().cmp(&a.is_dir()),
        }
    }
}

impl PathComparator for FileComparator {
    fn compare(&self, a: &Path, b: &Path) -> Ordering {
        let ordering = self.compare_forward(a, b);
        if self.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Comparator that consults `next` when `first` reports a tie
#[derive(Debug, Clone, Copy)]
pub struct ChainedComparator<A, B> {
    first: A,
    next: B,
}

impl<A: PathComparator, B: PathComparator> ChainedComparator<A, B> {
    /// Append another tie breaker
    pub fn then<C: PathComparator>(self, next: C) -> ChainedComparator<Self, C> {
        ChainedComparator { first: self, next }
    }
}

impl<A: PathComparator, B: PathComparator> PathComparator for ChainedComparator<A, B> {
    fn compare(&self, a: &Path, b: &Path) -> Ordering {
        self.first.compare(a, b).then_with(|| self.next.compare(a, b))
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn modified_time(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn file_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_dir() => metadata.len(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use rstest::rstest;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[rstest]
    #[case(CaseSensitivity::Sensitive, "a.txt", "B.txt", Ordering::Greater)]
    #[case(CaseSensitivity::Insensitive, "a.txt", "B.txt", Ordering::Less)]
    #[case(CaseSensitivity::Insensitive, "README", "readme", Ordering::Equal)]
    #[case(CaseSensitivity::Sensitive, "README", "readme", Ordering::Less)]
    fn test_name_ordering(
        #[case] case: CaseSensitivity,
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: Ordering,
    ) {
        let comparator = FileComparator::name().with_case_sensitivity(case);
        assert_eq!(
            comparator.compare(&PathBuf::from("/x").join(a), &PathBuf::from("/y").join(b)),
            expected
        );
    }

    #[test]
    fn test_system_case_sensitivity_follows_platform() {
        assert_eq!(CaseSensitivity::System.is_case_sensitive(), !cfg!(windows));
        assert_eq!(CaseSensitivity::default(), CaseSensitivity::System);
    }

    #[test]
    fn test_case_helpers() {
        assert!(CaseSensitivity::Insensitive.ends_with("photo.JPG", ".jpg"));
        assert!(!CaseSensitivity::Sensitive.ends_with("photo.JPG", ".jpg"));
        assert!(CaseSensitivity::Insensitive.starts_with("Draft-1", "draft"));
        assert!(CaseSensitivity::Insensitive.equals("Makefile", "MAKEFILE"));
    }

    #[test]
    fn test_path_and_extension_ordering() {
        let path = FileComparator::new(ComparisonMethod::Path);
        assert_eq!(
            path.compare(Path::new("/a/z.txt"), Path::new("/b/a.txt")),
            Ordering::Less
        );

        let ext = FileComparator::new(ComparisonMethod::Extension)
            .with_case_sensitivity(CaseSensitivity::Sensitive);
        assert_eq!(
            ext.compare(Path::new("z.md"), Path::new("a.txt")),
            Ordering::Less
        );
        assert_eq!(
            ext.compare(Path::new("Makefile"), Path::new("a.txt")),
            Ordering::Less
        );
    }

    #[test]
    fn test_reversed_and_chained() {
        let reversed = FileComparator::name()
            .with_case_sensitivity(CaseSensitivity::Sensitive)
            .reversed();
        assert_eq!(
            reversed.compare(Path::new("a"), Path::new("b")),
            Ordering::Greater
        );

        let chained = FileComparator::new(ComparisonMethod::Extension)
            .with_case_sensitivity(CaseSensitivity::Sensitive)
            .then(FileComparator::name().with_case_sensitivity(CaseSensitivity::Sensitive));
        let mut paths = vec![
            PathBuf::from("b.txt"),
            PathBuf::from("c.md"),
            PathBuf::from("a.txt"),
        ];
        paths.sort_by(|a, b| chained.compare(a, b));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("c.md"),
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
            ]
        );
    }

    #[test]
    fn test_metadata_orderings() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let small = root.join("small.bin");
        let large = root.join("large.bin");
        let dir = root.join("dir");
        fs::write(&small, b"1").unwrap();
        fs::write(&large, b"1234567890").unwrap();
        fs::create_dir(&dir).unwrap();
        set_file_mtime(&small, FileTime::from_unix_time(2_000_000, 0)).unwrap();
        set_file_mtime(&large, FileTime::from_unix_time(1_000_000, 0)).unwrap();

        let size = FileComparator::new(ComparisonMethod::Size);
        assert_eq!(size.compare(&small, &large), Ordering::Less);
        assert_eq!(size.compare(&dir, &small), Ordering::Less);

        let modified = FileComparator::new(ComparisonMethod::LastModified);
        assert_eq!(modified.compare(&small, &large), Ordering::Greater);

        let dirs_first = FileComparator::new(ComparisonMethod::DirectoryFirst);
        assert_eq!(dirs_first.compare(&dir, &small), Ordering::Less);
        assert_eq!(dirs_first.compare(&small, &large), Ordering::Equal);
    }

    #[test]
    fn test_closure_comparator() {
        let by_len = |a: &Path, b: &Path| a.as_os_str().len().cmp(&b.as_os_str().len());
        assert_eq!(by_len.compare(Path::new("aa"), Path::new("b")), Ordering::Greater);
    }

    #[test]
    fn test_serde_names() {
        let method: ComparisonMethod = serde_json::from_str("\"last_modified\"").unwrap();
        assert_eq!(method, ComparisonMethod::LastModified);

        let case: CaseSensitivity = serde_json::from_str("\"insensitive\"").unwrap();
        assert_eq!(case, CaseSensitivity::Insensitive);
    }
}
