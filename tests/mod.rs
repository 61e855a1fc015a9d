//! Main test module for bff
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end scenarios across trees
//! - Property-based tests for index and report invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::bff::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Bff {
        Bff::init(dir.path().to_path_buf()).unwrap();
        Bff::open(dir.path().to_path_buf()).unwrap()
    }

    fn rel(s: &str) -> RelativePath {
        RelativePath::from_path(Path::new(s)).unwrap()
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let bff = open(&temp_dir);

        let summaries = bff.index().unwrap();
        assert_eq!(summaries[0].unique_contents, 0);
        assert_eq!(summaries[0].files, 0);

        // An empty index still round-trips through disk
        assert!(bff.load_index().unwrap().is_empty());
    }

    #[test]
    fn test_empty_files_share_a_digest() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), "").unwrap();
        fs::write(temp_dir.path().join("b"), "").unwrap();
        let bff = open(&temp_dir);

        bff.index().unwrap();
        let clones = bff.clones().unwrap();
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].0, Digest::of_bytes(b""));
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file[with]brackets.txt",
            "ünïcödé.txt",
        ];

        let mut written = Vec::new();
        for name in &special_names {
            if fs::write(temp_dir.path().join(name), format!("Content of {}", name)).is_ok() {
                written.push(*name);
            }
        }

        let bff = open(&temp_dir);
        bff.index().unwrap();

        let view = bff.load_index().unwrap().path_view();
        for name in written {
            assert!(view.contains(&rel(name)), "missing {}", name);
        }
    }

    #[test]
    fn test_hidden_files_are_indexed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".hidden"), "h").unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".git/HEAD"), "ref").unwrap();
        let bff = open(&temp_dir);

        bff.index().unwrap();
        let view = bff.load_index().unwrap().path_view();
        assert!(view.contains(&rel(".hidden")));
        assert!(view.contains(&rel(".git/HEAD")));
    }

    #[test]
    fn test_corrupt_index_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let bff = open(&temp_dir);
        fs::write(temp_dir.path().join(".bff/index.json"), "[1, 2, 3]").unwrap();

        let err = bff.status().unwrap_err();
        assert!(err.is_corruption());
        assert!(err.user_message().contains("bff index"));
    }

    #[test]
    fn test_compare_against_uninitialized_tree() {
        let temp_dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let bff = open(&temp_dir);
        bff.index().unwrap();

        let err = bff.compare(other.path()).unwrap_err();
        assert!(matches!(err, BffError::NotInitialized(_)));
    }

    #[test]
    fn test_match_against_unindexed_source() {
        let temp_dir = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        let bff = open(&temp_dir);
        bff.index().unwrap();
        Bff::init(source.path().to_path_buf()).unwrap();

        let err = bff.match_from(source.path(), false).unwrap_err();
        assert!(matches!(err, BffError::NoIndex(_)));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_index() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "A").unwrap();
        let bff = open(&temp_dir);
        bff.index().unwrap();
        let before = bff.load_index().unwrap();

        let broken = BffBuilder::new()
            .ignore_patterns(vec!["[".to_string()])
            .build(temp_dir.path().to_path_buf())
            .unwrap();
        assert!(matches!(broken.index(), Err(BffError::InvalidPattern(_))));
        assert_eq!(bff.load_index().unwrap(), before);
    }
}
