//! Comparison of two independently indexed trees
//!
//! Two questions are answered at once. **By path**: which relative paths
//! exist on one side only, and whether shared paths hold the same bytes.
//! **By content**: which digests occur on one side only and how many occur on
//! both, regardless of where they live.

use crate::collections::{HashSet, HashSetExt};
use crate::digest::Digest;
use crate::index::ContentIndex;
use crate::types::CompareReport;
use tracing::debug;

/// Compare index `a` against index `b`
///
/// Counts satisfy `only_in_a_paths + same_path_same_content +
/// same_path_different_content == a.file_count()` (and symmetrically for
/// `b`), and `unique_contents_only_in_a + common_contents == a.len()`.
pub fn compare(a: &ContentIndex, b: &ContentIndex) -> CompareReport {
    let paths_a = a.path_view();
    let paths_b = b.path_view();
    let mut report = CompareReport::default();

    for (path, digest) in paths_a.iter() {
        match paths_b.get(path) {
            None => report.only_in_a_paths += 1,
            Some(other) if other == digest => report.same_path_same_content += 1,
            Some(_) => report.same_path_different_content += 1,
        }
    }
    report.only_in_b_paths = paths_b.paths().filter(|p| !paths_a.contains(p)).count();

    let mut digests_b: HashSet<&Digest> = HashSet::with_capacity(b.len());
    digests_b.extend(b.digests());

    for digest in a.digests() {
        if digests_b.contains(digest) {
            report.common_contents += 1;
        } else {
            report.unique_contents_only_in_a += 1;
        }
    }
    report.unique_contents_only_in_b = b.len() - report.common_contents;

    debug!(
        "Compared {} vs {} paths: {} shared, {} common contents",
        paths_a.len(),
        paths_b.len(),
        report.same_path_same_content + report.same_path_different_content,
        report.common_contents
    );
    report
}
