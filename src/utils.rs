//! Utility functions for bff
//!
//! Path manipulation, atomic writes, thread pool construction and display
//! helpers shared by the scanner, the store and the CLI.

use crate::error::{BffError, Result};
use crate::types::RelativePath;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Name of the per-tree metadata directory
pub const METADATA_DIR: &str = ".bff";

/// Check if a path component is the metadata directory name
pub fn is_metadata_dir_name(name: &std::ffi::OsStr) -> bool {
    name == METADATA_DIR
}

/// Check if `dir` is the root of an initialized tree
pub fn is_tree_root(dir: &Path) -> bool {
    dir.join(METADATA_DIR).is_dir()
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so that symbolic links inside the tree keep
/// their own path, and only canonicalizes both sides when that fails (for
/// instance when `base` was given as `.`).
///
/// # Errors
///
/// - [`BffError::Internal`] if the path is not under the base path
/// - [`BffError::Io`] if canonicalization fails
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            BffError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// [`make_relative`] followed by conversion to a [`RelativePath`]
pub fn relative_path(path: &Path, base: &Path) -> Result<RelativePath> {
    RelativePath::from_path(&make_relative(path, base)?)
}

/// Write a file so that readers see either the old or the new content
///
/// The bytes go to a temporary file in the target's directory, which is
/// then renamed over the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| BffError::internal(format!("{:?} has no parent directory", path)))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| BffError::file_io(dir, e))?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| BffError::file_io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| BffError::file_io(path, e.error))?;

    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Build a rayon pool with `workers` threads (at least one)
pub fn build_thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("bff-worker-{}", i))
        .build()
        .map_err(|e| BffError::ThreadPool(e.to_string()))
}

/// Format bytes in human-readable form
///
/// ```rust
/// use bff::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Remove a file if it exists, reporting whether it did
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BffError::file_io(path, e)),
    }
}
