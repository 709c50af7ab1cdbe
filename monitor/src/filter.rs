//! Path predicates deciding which children an observer lists
//!
//! Anything implementing [`PathFilter`] can be handed to an observer,
//! including plain closures. Filters compose with [`PathFilterExt`].

use std::fs;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::comparator::CaseSensitivity;
use crate::error::{MonitorError, Result};

/// Predicate over a candidate path
pub trait PathFilter: Send + Sync {
    fn accept(&self, path: &Path) -> bool;
}

impl<F> PathFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn accept(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Combinators available on every filter
pub trait PathFilterExt: PathFilter + Sized {
    /// Accept only paths both filters accept
    fn and<F: PathFilter>(self, other: F) -> AndFilter<Self, F> {
        AndFilter(self, other)
    }

    /// Accept paths either filter accepts
    fn or<F: PathFilter>(self, other: F) -> OrFilter<Self, F> {
        OrFilter(self, other)
    }

    /// Invert this filter
    fn not(self) -> NotFilter<Self> {
        NotFilter(self)
    }
}

impl<T: PathFilter> PathFilterExt for T {}

#[derive(Debug, Clone)]
pub struct AndFilter<A, B>(A, B);

impl<A: PathFilter, B: PathFilter> PathFilter for AndFilter<A, B> {
    fn accept(&self, path: &Path) -> bool {
        self.0.accept(path) && self.1.accept(path)
    }
}

#[derive(Debug, Clone)]
pub struct OrFilter<A, B>(A, B);

impl<A: PathFilter, B: PathFilter> PathFilter for OrFilter<A, B> {
    fn accept(&self, path: &Path) -> bool {
        self.0.accept(path) || self.1.accept(path)
    }
}

#[derive(Debug, Clone)]
pub struct NotFilter<A>(A);

impl<A: PathFilter> PathFilter for NotFilter<A> {
    fn accept(&self, path: &Path) -> bool {
        !self.0.accept(path)
    }
}

/// Accepts directories or regular files only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTypeFilter {
    Files,
    Directories,
}

impl PathFilter for FileTypeFilter {
    fn accept(&self, path: &Path) -> bool {
        match self {
            Self::Files => path.is_file(),
            Self::Directories => path.is_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameMatch {
    Exact,
    Prefix,
    Suffix,
}

/// Matches the file name against a list of names, prefixes or suffixes
#[derive(Debug, Clone)]
pub struct NameFilter {
    kind: NameMatch,
    values: Vec<String>,
    case_sensitivity: CaseSensitivity,
}

impl NameFilter {
    fn build<S: Into<String>>(kind: NameMatch, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            kind,
            values: values.into_iter().map(Into::into).collect(),
            case_sensitivity: CaseSensitivity::Sensitive,
        }
    }

    /// Accept names equal to one of `names`
    pub fn names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::build(NameMatch::Exact, names)
    }

    /// Accept names starting with one of `prefixes`
    pub fn prefixes<S: Into<String>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        Self::build(NameMatch::Prefix, prefixes)
    }

    /// Accept names ending with one of `suffixes`
    pub fn suffixes<S: Into<String>>(suffixes: impl IntoIterator<Item = S>) -> Self {
        Self::build(NameMatch::Suffix, suffixes)
    }

    pub fn with_case_sensitivity(mut self, case_sensitivity: CaseSensitivity) -> Self {
        self.case_sensitivity = case_sensitivity;
        self
    }
}

impl PathFilter for NameFilter {
    fn accept(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        let case = self.case_sensitivity;

        self.values.iter().any(|value| match self.kind {
            NameMatch::Exact => case.equals(&name, value),
            NameMatch::Prefix => case.starts_with(&name, value),
            NameMatch::Suffix => case.ends_with(&name, value),
        })
    }
}

/// Options for a glob-based [`FileFilter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Patterns files must match (if empty, include all). Directories are not
    /// checked against these so the observer can still descend into them.
    pub include_patterns: Vec<String>,
    /// Patterns to exclude, applied to files and directories
    pub exclude_patterns: Vec<String>,
    /// Case sensitive matching
    pub case_sensitive: bool,
    /// Include hidden files (name starting with .)
    pub include_hidden: bool,
    /// Maximum file size in bytes (None for no limit)
    pub max_file_size: Option<u64>,
    /// Minimum file size in bytes
    pub min_file_size: Option<u64>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            case_sensitive: false,
            include_hidden: true,
            max_file_size: None,
            min_file_size: None,
        }
    }
}

/// File filter using globset patterns, hidden-name and size rules
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    options: FilterOptions,
}

impl FileFilter {
    /// Create a new file filter with the given options
    pub fn new(options: FilterOptions) -> Result<Self> {
        let include_set = if options.include_patterns.is_empty() {
            None
        } else {
            Some(Self::build_globset(&options.include_patterns, options.case_sensitive)?)
        };

        let exclude_set = if options.exclude_patterns.is_empty() {
            None
        } else {
            Some(Self::build_globset(&options.exclude_patterns, options.case_sensitive)?)
        };

        Ok(Self {
            include_set,
            exclude_set,
            options,
        })
    }

    /// Check if a path should be listed, reading its metadata only when a
    /// size limit or include pattern needs it
    pub fn should_include(&self, path: &Path) -> bool {
        if !self.options.include_hidden && is_hidden(path) {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set {
            if exclude_set.is_match(path) {
                return false;
            }
        }

        let needs_metadata = self.include_set.is_some()
            || self.options.max_file_size.is_some()
            || self.options.min_file_size.is_some();
        if !needs_metadata {
            return true;
        }

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return false,
        };

        if metadata.is_dir() {
            return true;
        }

        if let Some(include_set) = &self.include_set {
            if !include_set.is_match(path) {
                return false;
            }
        }

        self.should_include_size(metadata.len())
    }

    /// Check if a file should be included based on size constraints
    pub fn should_include_size(&self, file_size: u64) -> bool {
        if let Some(max_size) = self.options.max_file_size {
            if file_size > max_size {
                return false;
            }
        }

        if let Some(min_size) = self.options.min_file_size {
            if file_size < min_size {
                return false;
            }
        }

        true
    }

    /// Get the filter options
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Create a filter that includes only specific file extensions
    pub fn by_extensions(extensions: &[&str], case_sensitive: bool) -> Result<Self> {
        let patterns = extensions
            .iter()
            .map(|ext| {
                if ext.starts_with('.') {
                    format!("**/*{}", ext)
                } else {
                    format!("**/*.{}", ext)
                }
            })
            .collect();

        let options = FilterOptions {
            include_patterns: patterns,
            case_sensitive,
            ..Default::default()
        };

        Self::new(options)
    }

    /// Create a filter that excludes commonly ignored files and directories
    pub fn exclude_common_ignore_patterns() -> Result<Self> {
        let exclude_patterns = [
            "**/.git",
            "**/.svn",
            "**/.hg",
            "**/node_modules",
            "**/target",
            "**/.DS_Store",
            "**/Thumbs.db",
            "**/*.tmp",
            "**/*.temp",
            "**/*.swp",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect();

        let options = FilterOptions {
            exclude_patterns,
            ..Default::default()
        };

        Self::new(options)
    }

    /// Create a filter with size constraints
    pub fn with_size_limits(min_size: Option<u64>, max_size: Option<u64>) -> Self {
        Self {
            include_set: None,
            exclude_set: None,
            options: FilterOptions {
                min_file_size: min_size,
                max_file_size: max_size,
                ..Default::default()
            },
        }
    }

    /// Merge the rules of two filters into one
    pub fn merge(&self, other: &FileFilter) -> Result<FileFilter> {
        let mut combined_include = self.options.include_patterns.clone();
        combined_include.extend(other.options.include_patterns.iter().cloned());

        let mut combined_exclude = self.options.exclude_patterns.clone();
        combined_exclude.extend(other.options.exclude_patterns.iter().cloned());

        let options = FilterOptions {
            include_patterns: combined_include,
            exclude_patterns: combined_exclude,
            case_sensitive: self.options.case_sensitive || other.options.case_sensitive,
            include_hidden: self.options.include_hidden && other.options.include_hidden,
            max_file_size: match (self.options.max_file_size, other.options.max_file_size) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
            min_file_size: match (self.options.min_file_size, other.options.min_file_size) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        };

        Self::new(options)
    }

    /// Build a globset from patterns
    fn build_globset(patterns: &[String], case_sensitive: bool) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let compiled_glob = if case_sensitive {
                Glob::new(pattern)
            } else {
                globset::GlobBuilder::new(pattern).case_insensitive(true).build()
            }
            .map_err(|e| MonitorError::pattern_error(pattern, e))?;

            builder.add(compiled_glob);
        }

        builder
            .build()
            .map_err(|e| MonitorError::FilterPattern(format!("Failed to build globset: {}", e)))
    }
}

impl PathFilter for FileFilter {
    fn accept(&self, path: &Path) -> bool {
        self.should_include(path)
    }
}

/// Whether the last component of `path` is a dot-file
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.') && name != "." && name != "..")
        .unwrap_or(false)
}
