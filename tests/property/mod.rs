//! Property-based testing for bff
//!
//! Uses proptest to verify index, status, compare and match invariants
//! across randomly generated trees.

use ::bff::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate random relative file paths
///
/// Directory names never contain a dot and file names always do, so a path
/// can never be both a file and a directory within one tree.
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dir_strategy = prop::collection::vec("[a-c]{1,2}", 0..=3);
    let filename_strategy = "[a-e]{1,4}\\.(txt|bin)";

    (dir_strategy, filename_strategy).prop_map(|(dirs, filename)| {
        let mut path = PathBuf::new();
        for dir in dirs {
            path.push(dir);
        }
        path.join(filename)
    })
}

/// Generate content from a small alphabet so that duplicates are common
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[xyz]{0,2}".prop_map(|s| s.into_bytes()),
        prop::collection::vec(any::<u8>(), 0..64),
    ]
}

/// Generate a tree as path -> content
fn tree_strategy(max_files: usize) -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::btree_map(path_strategy(), content_strategy(), 0..max_files)
}

fn to_index(tree: &BTreeMap<PathBuf, Vec<u8>>) -> ContentIndex {
    ContentIndex::from_entries(tree.iter().map(|(path, content)| {
        (RelativePath::from_path(path).unwrap(), Digest::of_bytes(content))
    }))
    .unwrap()
}

fn write_tree(root: &Path, tree: &BTreeMap<PathBuf, Vec<u8>>) {
    for (path, content) in tree {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Encoding and decoding an index is lossless
    #[test]
    fn index_encode_decode_identity(tree in tree_strategy(40)) {
        let index = to_index(&tree);
        let decoded = ContentIndex::decode(&index.encode().unwrap()).unwrap();
        prop_assert_eq!(&decoded, &index);
        prop_assert_eq!(decoded.file_count(), tree.len());
    }

    /// Inverting an index and inverting back is lossless
    #[test]
    fn path_view_inverts(tree in tree_strategy(40)) {
        let index = to_index(&tree);
        let view = index.path_view();
        prop_assert_eq!(view.len(), tree.len());
        prop_assert_eq!(view.to_content_index(), index);
    }

    /// Status partitions are disjoint and cover every changed path
    #[test]
    fn status_partition(stored in tree_strategy(30), live in tree_strategy(30)) {
        let report = status::diff(&to_index(&stored), &to_index(&live));

        let rel = |p: &PathBuf| RelativePath::from_path(p).unwrap();
        let stored_paths: BTreeSet<_> = stored.keys().map(rel).collect();
        let live_paths: BTreeSet<_> = live.keys().map(rel).collect();

        prop_assert!(report.new.is_disjoint(&report.modified));
        prop_assert!(report.new.is_disjoint(&report.deleted));
        prop_assert!(report.modified.is_disjoint(&report.deleted));

        let expected_new: BTreeSet<_> = live_paths.difference(&stored_paths).cloned().collect();
        let expected_deleted: BTreeSet<_> = stored_paths.difference(&live_paths).cloned().collect();
        prop_assert_eq!(&report.new, &expected_new);
        prop_assert_eq!(&report.deleted, &expected_deleted);

        for path in live.keys() {
            let changed = stored.get(path).map(|old| old != &live[path]).unwrap_or(false);
            prop_assert_eq!(report.modified.contains(&rel(path)), changed);
        }
    }

    /// Compare counts are consistent with both trees
    #[test]
    fn compare_counts_consistent(a in tree_strategy(30), b in tree_strategy(30)) {
        let index_a = to_index(&a);
        let index_b = to_index(&b);
        let report = compare::compare(&index_a, &index_b);

        prop_assert_eq!(report.paths_in_a(), a.len());
        prop_assert_eq!(report.paths_in_b(), b.len());
        prop_assert_eq!(report.unique_contents_only_in_a + report.common_contents, index_a.len());
        prop_assert_eq!(report.unique_contents_only_in_b + report.common_contents, index_b.len());

        let swapped = compare::compare(&index_b, &index_a);
        prop_assert_eq!(swapped.only_in_a_paths, report.only_in_b_paths);
        prop_assert_eq!(swapped.common_contents, report.common_contents);
    }

    /// Every planned copy carries missing content under its source name
    #[test]
    fn match_plan_only_copies_missing_content(source in tree_strategy(30), dest in tree_strategy(30)) {
        let source_index = to_index(&source);
        let dest_index = to_index(&dest);
        let plan = matcher::plan(&source_index, &dest_index);

        let mut planned: BTreeSet<RelativePath> = BTreeSet::new();
        for copy in &plan.copies {
            prop_assert!(!dest_index.contains_digest(&copy.digest));
            prop_assert_eq!(copy.source.file_name(), copy.target.file_name());
            prop_assert!(copy.votes > 0);
            planned.insert(copy.source.clone());
        }

        // Copies and unmatched files together are exactly the missing files
        let missing_files: BTreeSet<RelativePath> = source_index
            .iter()
            .filter(|(digest, _)| !dest_index.contains_digest(digest))
            .flat_map(|(_, paths)| paths.iter().cloned())
            .collect();
        let unmatched: BTreeSet<RelativePath> = plan.unmatched.iter().cloned().collect();
        prop_assert!(planned.is_disjoint(&unmatched));
        prop_assert_eq!(planned.union(&unmatched).cloned().collect::<BTreeSet<_>>(), missing_files);

        // Planning is deterministic
        prop_assert_eq!(matcher::plan(&source_index, &dest_index), plan);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Indexing a real tree records exactly what was written
    #[test]
    fn index_matches_written_tree(tree in tree_strategy(25)) {
        let temp_dir = TempDir::new().unwrap();
        write_tree(temp_dir.path(), &tree);
        Bff::init(temp_dir.path().to_path_buf()).unwrap();
        let bff = Bff::open(temp_dir.path().to_path_buf()).unwrap();

        bff.index().unwrap();
        prop_assert_eq!(bff.load_index().unwrap(), to_index(&tree));
    }

    /// Match never changes a file that already exists in the destination
    #[test]
    fn match_preserves_existing_files(source in tree_strategy(20), dest in tree_strategy(20)) {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        write_tree(source_dir.path(), &source);
        write_tree(dest_dir.path(), &dest);

        for dir in [source_dir.path(), dest_dir.path()] {
            Bff::init(dir.to_path_buf()).unwrap();
            Bff::open(dir.to_path_buf()).unwrap().index().unwrap();
        }

        let bff = Bff::open(dest_dir.path().to_path_buf()).unwrap();
        let report = bff.match_from(source_dir.path(), false).unwrap();

        for (path, content) in &dest {
            prop_assert_eq!(&fs::read(dest_dir.path().join(path)).unwrap(), content);
        }
        for copy in &report.copied {
            let written = fs::read(copy.target.resolve(dest_dir.path())).unwrap();
            let original = fs::read(copy.source.resolve(source_dir.path())).unwrap();
            prop_assert_eq!(written, original);
        }
        prop_assert!(report.failed.is_empty());
    }
}
