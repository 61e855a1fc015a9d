//! Core data types used throughout the bff library
//!
//! ## Overview
//!
//! - **Paths**: [`RelativePath`], the UTF-8, root-relative path stored in indexes
//! - **Configuration**: [`BffConfig`], persisted in `.bff/config.json`
//! - **Results**: [`StatusReport`], [`CompareReport`], [`MatchReport`],
//!   [`IndexSummary`] and friends
//! - **Progress**: [`ProgressInfo`] passed to scan callbacks

use crate::error::{BffError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};
use std::sync::Arc;

/// A path relative to a tree root
///
/// Components are joined with the platform separator and the path never
/// starts with a separator or contains `..`. The empty path is the tree root
/// itself and only ever names a directory.
///
/// # Examples
///
/// ```rust
/// use bff::RelativePath;
/// use std::path::Path;
///
/// let p = RelativePath::from_path(Path::new("sub/world.txt")).unwrap();
/// assert_eq!(p.file_name(), "world.txt");
/// assert_eq!(p.parent(), RelativePath::from_path(Path::new("sub")).unwrap());
/// assert!(p.parent().parent().is_root());
/// ```
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// The tree root
    pub fn root() -> Self {
        RelativePath(String::new())
    }

    /// Normalize a relative filesystem path
    ///
    /// # Errors
    ///
    /// - [`BffError::PathConversion`] if a component is not valid UTF-8
    /// - [`BffError::InvalidIndex`] if the path is absolute or climbs out with `..`
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut parts: Vec<&str> = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(os) => {
                    let part = os
                        .to_str()
                        .ok_or_else(|| BffError::PathConversion(os.to_os_string()))?;
                    parts.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BffError::InvalidIndex(format!(
                        "path {:?} is not relative to the tree root",
                        path
                    )));
                }
            }
        }
        Ok(RelativePath(parts.join(MAIN_SEPARATOR_STR)))
    }

    /// Whether this is the tree root
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// String form using the platform separator
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Containing directory; the root for top-level entries
    pub fn parent(&self) -> RelativePath {
        match self.0.rsplit_once(MAIN_SEPARATOR) {
            Some((dir, _)) => RelativePath(dir.to_string()),
            None => RelativePath::root(),
        }
    }

    /// Last component
    pub fn file_name(&self) -> &str {
        match self.0.rsplit_once(MAIN_SEPARATOR) {
            Some((_, name)) => name,
            None => &self.0,
        }
    }

    /// Append a single file or directory name
    pub fn join(&self, name: &str) -> RelativePath {
        if self.is_root() {
            RelativePath(name.to_string())
        } else {
            RelativePath(format!("{}{}{}", self.0, MAIN_SEPARATOR, name))
        }
    }

    /// Re-root this path under `prefix`
    pub fn under(&self, prefix: &RelativePath) -> RelativePath {
        if prefix.is_root() {
            self.clone()
        } else if self.is_root() {
            prefix.clone()
        } else {
            prefix.join(&self.0)
        }
    }

    /// Whether this path is `dir` itself or lies somewhere below it
    ///
    /// Every path lies below the root.
    pub fn starts_with_dir(&self, dir: &RelativePath) -> bool {
        if dir.is_root() {
            return true;
        }
        match self.0.strip_prefix(dir.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(MAIN_SEPARATOR),
            None => false,
        }
    }

    /// Filesystem form, to be joined onto a tree root
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// Absolute location of this path inside `root`
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(&self.0)
        }
    }
}

impl TryFrom<String> for RelativePath {
    type Error = BffError;

    fn try_from(value: String) -> Result<Self> {
        RelativePath::from_path(Path::new(&value))
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl fmt::Debug for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Per-tree configuration stored in `.bff/config.json`
///
/// Missing fields take their defaults, and a tree without a config file
/// behaves as if it had the default one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BffConfig {
    /// Version of the on-disk format
    pub format_version: u32,
    /// bff version that wrote the config
    pub bff_version: String,
    /// When the tree was initialized
    pub created_at: Option<DateTime<Utc>>,
    /// Worker threads for hashing and copying (0 = one per CPU)
    pub parallel_workers: usize,
    /// Whether to follow symbolic links while walking
    pub follow_symlinks: bool,
    /// Gitignore-style patterns excluded from every walk
    pub ignore_patterns: Vec<String>,
    /// Re-hash source files before match copies them
    pub verify_copies: bool,
}

impl Default for BffConfig {
    fn default() -> Self {
        Self {
            format_version: crate::store::FORMAT_VERSION,
            bff_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: None,
            parallel_workers: 0,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
            verify_copies: true,
        }
    }
}

impl BffConfig {
    /// Thread count after resolving 0 to the CPU count
    pub fn effective_workers(&self) -> usize {
        if self.parallel_workers == 0 {
            num_cpus::get()
        } else {
            self.parallel_workers
        }
    }
}

/// Result of initializing a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The metadata directory was created
    Created,
    /// The tree was already initialized; nothing changed
    AlreadyInitialized,
}

/// Summary of one index build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    /// Tree location relative to the indexed root (root for the tree itself)
    pub tree: RelativePath,
    /// Number of distinct digests
    pub unique_contents: usize,
    /// Number of indexed files
    pub files: usize,
    /// Build time in milliseconds
    pub duration_ms: u64,
}

/// A file that could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Path relative to the tree that was being walked
    pub path: PathBuf,
    /// Error description
    pub message: String,
}

/// Drift between the live tree and its last index
///
/// The three sets are disjoint. Every live path is either unchanged
/// (reported nowhere), `new` or `modified`; every stored-only path is
/// `deleted`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Live paths the index does not know
    pub new: BTreeSet<RelativePath>,
    /// Paths whose content changed
    pub modified: BTreeSet<RelativePath>,
    /// Indexed paths that are gone
    pub deleted: BTreeSet<RelativePath>,
    /// Live files that could not be read and were left out
    pub unreadable: Vec<FileFailure>,
}

impl StatusReport {
    /// Check if anything drifted
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// Total number of reported paths
    pub fn total_changes(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }
}

/// Path-level and content-level comparison of two indexes
///
/// # Examples
///
/// ```rust
/// # use bff::CompareReport;
/// let report = CompareReport {
///     only_in_a_paths: 1,
///     only_in_b_paths: 1,
///     same_path_same_content: 1,
///     same_path_different_content: 0,
///     unique_contents_only_in_a: 1,
///     unique_contents_only_in_b: 1,
///     common_contents: 1,
/// };
/// assert_eq!(report.paths_in_a(), 2);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareReport {
    /// Paths in A with no counterpart path in B
    pub only_in_a_paths: usize,
    /// Paths in B with no counterpart path in A
    pub only_in_b_paths: usize,
    /// Paths in both with equal digests
    pub same_path_same_content: usize,
    /// Paths in both with differing digests
    pub same_path_different_content: usize,
    /// Digests of A absent from B
    pub unique_contents_only_in_a: usize,
    /// Digests of B absent from A
    pub unique_contents_only_in_b: usize,
    /// Digests present in both, counted once each
    pub common_contents: usize,
}

impl CompareReport {
    /// Number of paths in A
    pub fn paths_in_a(&self) -> usize {
        self.only_in_a_paths + self.same_path_same_content + self.same_path_different_content
    }

    /// Number of paths in B
    pub fn paths_in_b(&self) -> usize {
        self.only_in_b_paths + self.same_path_same_content + self.same_path_different_content
    }
}

/// A file copied (or, on a dry run, that would be copied) by match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    /// Path in the source tree
    pub source: RelativePath,
    /// Path in the destination tree
    pub target: RelativePath,
    /// Bytes written (0 on a dry run or conflict)
    pub bytes: u64,
}

/// A copy that failed to read or write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCopy {
    /// Path in the source tree
    pub source: RelativePath,
    /// Intended destination path
    pub target: RelativePath,
    /// Error description
    pub message: String,
}

/// Outcome of a match pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Files written into the destination
    pub copied: Vec<CopyRecord>,
    /// Targets that already existed and were left untouched
    pub conflicts: Vec<CopyRecord>,
    /// Source files with no sibling content in the destination
    pub unmatched: Vec<RelativePath>,
    /// Copies that failed
    pub failed: Vec<FailedCopy>,
    /// Whether the destination was left untouched on purpose
    pub dry_run: bool,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl MatchReport {
    /// Total bytes written into the destination
    pub fn bytes_copied(&self) -> u64 {
        self.copied.iter().map(|c| c.bytes).sum()
    }
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}
