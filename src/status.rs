//! Drift detection between a stored snapshot and the live tree

use crate::error::Result;
use crate::index::ContentIndex;
use crate::scanner::{ScanScope, TreeScanner};
use crate::store::IndexStore;
use crate::types::{FileFailure, ProgressInfo, RelativePath, StatusReport};
use tracing::{debug, instrument};

/// Partition paths of two indexes into new, modified and deleted
///
/// A path is `new` when only `live` has it, `deleted` when only `stored` has
/// it, and `modified` when both have it under different digests. Unchanged
/// paths are reported nowhere.
pub fn diff(stored: &ContentIndex, live: &ContentIndex) -> StatusReport {
    let stored = stored.path_view();
    let live = live.path_view();
    let mut report = StatusReport::default();

    for (path, digest) in live.iter() {
        match stored.get(path) {
            None => {
                report.new.insert(path.clone());
            }
            Some(previous) if previous != digest => {
                report.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    report.deleted = stored
        .paths()
        .filter(|path| !live.contains(path))
        .cloned()
        .collect();

    report
}

/// Compare a tree against its stored index
///
/// The stored side includes the indexes of nested trees. Files that cannot
/// be read are listed in [`StatusReport::unreadable`] and kept out of the
/// three partitions. Stored paths inside an unreadable directory are not
/// reported deleted either.
#[instrument(skip_all, fields(root = ?store.root()))]
pub fn status(store: &IndexStore, scanner: &TreeScanner) -> Result<StatusReport> {
    let stored = store.load_with_nested(&scanner.nested_trees())?;
    let outcome = scanner.scan::<fn(ProgressInfo)>(ScanScope::Live, None)?;

    let mut report = diff(&stored, &outcome.index);
    // An unreadable directory hides everything stored below it
    for failure in outcome.failures {
        if let Ok(failed) = RelativePath::from_path(&failure.path) {
            report.deleted.retain(|path| !path.starts_with_dir(&failed));
        }
        report.unreadable.push(FileFailure::from(failure));
    }

    debug!(
        "Status: {} new, {} modified, {} deleted, {} unreadable",
        report.new.len(),
        report.modified.len(),
        report.deleted.len(),
        report.unreadable.len()
    );
    Ok(report)
}
