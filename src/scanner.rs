//! Tree scanning and hashing for bff
//!
//! This module turns a directory tree into a [`ContentIndex`]. Scanning runs in
//! two phases:
//!
//! 1. **Walk**: the `ignore` crate's parallel walker collects every regular
//!    file under the root. Metadata directories are never entered, and
//!    configured ignore patterns are applied as overrides.
//! 2. **Hash**: the collected files are hashed on a rayon pool. Each worker
//!    folds its results into a private partial index and the partials are
//!    reduced with [`ContentIndex::merge`], so no index is shared between
//!    threads.
//!
//! ## Scopes
//!
//! | Scope | Nested trees | Root `.bff/index.json` |
//! |---|---|---|
//! | [`ScanScope::Snapshot`] | skipped (they keep their own index) | excluded |
//! | [`ScanScope::Live`] | descended into | included when present |
//!
//! Snapshots are what `index` persists. The live scope is what `status`
//! compares a stored snapshot against.
//!
//! ## Failures
//!
//! A scan never stops at the first unreadable file. Failures are collected
//! into [`ScanOutcome::failures`]; [`ScanOutcome::into_index`] turns the first
//! of them into an error for callers that must not persist a partial index.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bff::scanner::{ScanScope, TreeScanner};
//! use std::path::PathBuf;
//!
//! # fn example() -> bff::Result<()> {
//! let scanner = TreeScanner::new(PathBuf::from("./photos"))
//!     .with_ignore_patterns(vec!["*.tmp".to_string()])
//!     .with_parallel_workers(4);
//!
//! let index = scanner
//!     .scan::<fn(bff::ProgressInfo)>(ScanScope::Snapshot, None)?
//!     .into_index()?;
//! println!("{} unique contents", index.len());
//! # Ok(())
//! # }
//! ```

use crate::digest::Digest;
use crate::error::{BffError, Result};
use crate::index::ContentIndex;
use crate::store::INDEX_FILE;
use crate::types::{BffConfig, FileFailure, ProgressInfo, RelativePath};
use crate::utils::{self, is_metadata_dir_name, is_tree_root, METADATA_DIR};
use ignore::{overrides::OverrideBuilder, WalkBuilder, WalkState};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Which part of a tree a scan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanScope {
    /// The files owned by this tree's own index
    Snapshot,
    /// Everything a user sees on disk, including nested trees and the root
    /// index file
    Live,
}

/// A file that could not be walked or hashed
#[derive(Debug)]
pub struct ScanFailure {
    /// Path relative to the scanned root
    pub path: PathBuf,
    /// What went wrong
    pub error: BffError,
}

impl From<ScanFailure> for FileFailure {
    fn from(failure: ScanFailure) -> Self {
        FileFailure {
            path: failure.path,
            message: failure.error.to_string(),
        }
    }
}

/// Result of a scan: the hashed files plus everything that failed
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Index of every file that was hashed successfully
    pub index: ContentIndex,
    /// Files that could not be read, sorted by path
    pub failures: Vec<ScanFailure>,
}

impl ScanOutcome {
    fn merge(mut self, other: ScanOutcome) -> ScanOutcome {
        self.index.merge(other.index);
        self.failures.extend(other.failures);
        self
    }

    /// Take the index, failing if any file could not be read
    ///
    /// The error returned is the one for the lexicographically first failing
    /// path, so repeated runs over the same broken tree report the same file.
    pub fn into_index(self) -> Result<ContentIndex> {
        let mut failures = self.failures.into_iter();
        match failures.next() {
            None => Ok(self.index),
            Some(first) => {
                for other in failures {
                    warn!("Also failed to read {:?}: {}", other.path, other.error);
                }
                Err(first.error)
            }
        }
    }
}

/// Parallel scanner producing content indexes for one tree
///
/// ## Configuration Options
///
/// - `root_path`: directory to scan
/// - `ignore_patterns`: gitignore-style globs excluded from the walk
/// - `follow_symlinks`: whether symbolic links are followed
/// - `parallel_workers`: threads for walking and hashing
#[derive(Debug, Clone)]
pub struct TreeScanner {
    /// Root directory to scan
    root_path: PathBuf,
    /// Patterns excluded from every walk
    ignore_patterns: Vec<String>,
    /// Whether to follow symbolic links during traversal
    follow_symlinks: bool,
    /// Number of parallel workers for walking and hashing
    parallel_workers: usize,
}

impl TreeScanner {
    /// Create a scanner with default settings
    ///
    /// No ignore patterns, symbolic links are not followed, and one worker
    /// runs per CPU core.
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            parallel_workers: num_cpus::get(),
        }
    }

    /// Create a scanner configured from a tree's [`BffConfig`]
    pub fn from_config(root_path: PathBuf, config: &BffConfig) -> Self {
        Self::new(root_path)
            .with_ignore_patterns(config.ignore_patterns.clone())
            .with_follow_symlinks(config.follow_symlinks)
            .with_parallel_workers(config.effective_workers())
    }

    /// Set ignore patterns
    ///
    /// Patterns use gitignore syntax and are matched relative to the root.
    /// A leading `!` re-includes paths instead.
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Set whether to follow symbolic links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set number of parallel workers
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Root directory of this scanner
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Walk and hash the tree
    ///
    /// Per-file errors are collected in the outcome. Only configuration
    /// problems (bad patterns, thread pool creation) fail the call itself.
    ///
    /// # Errors
    ///
    /// - [`BffError::InvalidPattern`] if an ignore pattern does not parse
    /// - [`BffError::ThreadPool`] if the hashing pool cannot be built
    pub fn scan<F>(&self, scope: ScanScope, progress_callback: Option<F>) -> Result<ScanOutcome>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let start = Instant::now();
        let (files, walk_failures) = self.collect_files(scope)?;
        let walk_duration = start.elapsed();

        let total = files.len();
        let processed = AtomicUsize::new(0);
        let root = &self.root_path;

        let pool = utils::build_thread_pool(self.parallel_workers)?;
        let mut outcome = pool.install(|| {
            files
                .par_iter()
                .fold(ScanOutcome::default, |mut acc, path| {
                    match hash_file(path, root) {
                        Ok((relative, digest)) => {
                            trace!("Hashed {} -> {}", relative, digest.short(12));
                            acc.index.insert_unique(digest, relative);
                        }
                        Err(error) => {
                            warn!("Failed to hash {:?}: {}", path, error);
                            acc.failures.push(ScanFailure {
                                path: display_path(path, root),
                                error,
                            });
                        }
                    }

                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref callback) = progress_callback {
                        callback(ProgressInfo {
                            operation: "Hashing files".to_string(),
                            current_item: Some(display_path(path, root).to_string_lossy().into_owned()),
                            processed: done,
                            total: Some(total),
                        });
                    }
                    acc
                })
                .reduce(ScanOutcome::default, ScanOutcome::merge)
        });

        outcome.failures.extend(walk_failures);
        outcome.failures.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "Scanned {} files ({} unique contents, {} failures) in {:?} (walk {:?})",
            total,
            outcome.index.len(),
            outcome.failures.len(),
            start.elapsed(),
            walk_duration
        );

        Ok(outcome)
    }

    /// Build a snapshot index, failing on the first unreadable file
    pub fn build_index<F>(&self, progress_callback: Option<F>) -> Result<ContentIndex>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        self.scan(ScanScope::Snapshot, progress_callback)?.into_index()
    }

    /// Find every nested tree below the root
    ///
    /// Returned paths are relative to the root, in walk order. Metadata
    /// directories are not searched. Unreadable directories are skipped with a
    /// warning; a snapshot scan of the same tree reports them as failures.
    pub fn nested_trees(&self) -> Vec<RelativePath> {
        let walker = WalkDir::new(&self.root_path)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.depth() > 0 && is_metadata_dir_name(e.file_name())));

        let mut trees = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry while looking for nested trees: {}", e);
                    continue;
                }
            };
            if entry.depth() == 0 || !entry.file_type().is_dir() || !is_tree_root(entry.path()) {
                continue;
            }
            match utils::relative_path(entry.path(), &self.root_path) {
                Ok(relative) => trees.push(relative),
                Err(e) => warn!("Skipping nested tree {:?}: {}", entry.path(), e),
            }
        }
        trees
    }

    /// Walk phase: collect absolute paths of regular files
    fn collect_files(&self, scope: ScanScope) -> Result<(Vec<PathBuf>, Vec<ScanFailure>)> {
        let mut walker_builder = WalkBuilder::new(&self.root_path);

        // Every regular file counts, hidden or gitignored alike
        walker_builder
            .standard_filters(false)
            .follow_links(self.follow_symlinks)
            .threads(self.parallel_workers);

        if !self.ignore_patterns.is_empty() {
            let mut override_builder = OverrideBuilder::new(&self.root_path);
            for pattern in &self.ignore_patterns {
                // In override builder, ! prefix means exclude
                let final_pattern = match pattern.strip_prefix('!') {
                    Some(included) => included.to_string(),
                    None => format!("!{}", pattern),
                };
                override_builder
                    .add(&final_pattern)
                    .map_err(|e| BffError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            }
            let overrides = override_builder
                .build()
                .map_err(|e| BffError::InvalidPattern(e.to_string()))?;
            walker_builder.overrides(overrides);
        }

        let descend_nested = scope == ScanScope::Live;
        walker_builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            if is_metadata_dir_name(entry.file_name()) {
                return false;
            }
            descend_nested || !is_tree_root(entry.path())
        });

        let files = Arc::new(Mutex::new(Vec::<PathBuf>::new()));
        let failures = Arc::new(Mutex::new(Vec::<ScanFailure>::new()));
        let root_path = self.root_path.clone();

        walker_builder.build_parallel().run(|| {
            let files = Arc::clone(&files);
            let failures = Arc::clone(&failures);
            let root_path = root_path.clone();

            Box::new(move |entry_result| {
                match entry_result {
                    Ok(entry) => {
                        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                        if is_file {
                            files.lock().push(entry.into_path());
                        }
                    }
                    Err(e) => {
                        warn!("Walk error: {}", e);
                        let path = error_path(&e)
                            .map(|p| display_path(p, &root_path))
                            .unwrap_or_default();
                        failures.lock().push(ScanFailure {
                            path,
                            error: BffError::Walk(e),
                        });
                    }
                }
                WalkState::Continue
            })
        });

        let mut files = std::mem::take(&mut *files.lock());
        let failures = std::mem::take(&mut *failures.lock());

        if scope == ScanScope::Live {
            let index_file = self.root_path.join(METADATA_DIR).join(INDEX_FILE);
            if index_file.is_file() {
                files.push(index_file);
            }
        }

        files.sort();
        Ok((files, failures))
    }
}

/// Hash one file and compute its index path
fn hash_file(path: &Path, root: &Path) -> Result<(RelativePath, Digest)> {
    let relative = utils::relative_path(path, root)?;
    let digest = Digest::of_file(path)?;
    Ok((relative, digest))
}

/// Best-effort root-relative form of a path for reports
fn display_path(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}
