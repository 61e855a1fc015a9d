//! Integration tests for bff
//!
//! End-to-end scenarios over real directory trees: indexing, drift
//! detection, cross-tree comparison and sibling-affinity matching.

use ::bff::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// A temporary initialized tree
pub struct TreeHarness {
    pub temp_dir: TempDir,
    pub bff: Bff,
}

impl TreeHarness {
    /// Create and initialize an empty tree
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        Bff::init(temp_dir.path().to_path_buf()).unwrap();
        let bff = BffBuilder::new()
            .parallel_workers(4)
            .build(temp_dir.path().to_path_buf())
            .unwrap();
        Self { temp_dir, bff }
    }

    /// Create a tree holding `files`
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let harness = Self::new();
        for (path, content) in files {
            harness.write(path, content);
        }
        harness
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) {
        let full = self.root().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.root().join(path)).unwrap()
    }
}

/// Generates random trees from a fixed seed
pub struct TreeGenerator {
    rng: StdRng,
}

impl TreeGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Write `count` files under `root`, reusing contents from a small pool
    /// so that duplicates are common
    pub fn populate(&mut self, root: &Path, count: usize) -> Vec<PathBuf> {
        let dirs = ["", "docs", "docs/old", "src", "src/util", "media"];
        let pool: Vec<String> = (0..count / 3 + 1).map(|i| format!("content-{}", i)).collect();

        let mut written = Vec::with_capacity(count);
        for i in 0..count {
            let dir = dirs[self.rng.random_range(0..dirs.len())];
            let relative = Path::new(dir).join(format!("file{}.dat", i));
            let content = &pool[self.rng.random_range(0..pool.len())];

            let full = root.join(&relative);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, content).unwrap();
            written.push(relative);
        }
        written
    }
}

fn rel(s: &str) -> RelativePath {
    RelativePath::from_path(Path::new(s)).unwrap()
}

fn index_file() -> RelativePath {
    rel(".bff/index.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_index_scenario() {
        let tree = TreeHarness::with_files(&[("hello.txt", "HELLO"), ("sub/world.txt", "WORLD")]);
        tree.bff.index().unwrap();

        let bytes = fs::read(tree.root().join(".bff/index.json")).unwrap();
        let index = ContentIndex::decode(&bytes).unwrap();

        let hello = index.paths(&Digest::of_bytes(b"HELLO")).unwrap();
        assert_eq!(hello.iter().collect::<Vec<_>>(), vec![&rel("hello.txt")]);
        let world = index.paths(&Digest::of_bytes(b"WORLD")).unwrap();
        assert_eq!(world.iter().collect::<Vec<_>>(), vec![&rel("sub/world.txt")]);
    }

    #[test]
    fn test_status_scenario() {
        let tree = TreeHarness::with_files(&[("a.txt", "A")]);
        tree.bff.index().unwrap();

        tree.write("new.txt", "NEW");
        let report = tree.bff.status().unwrap();
        assert!(report.new.contains(&rel("new.txt")));

        fs::remove_file(tree.root().join("new.txt")).unwrap();
        let report = tree.bff.status().unwrap();
        assert_eq!(report.new.iter().cloned().collect::<Vec<_>>(), vec![index_file()]);

        fs::remove_file(tree.root().join("a.txt")).unwrap();
        let report = tree.bff.status().unwrap();
        assert_eq!(report.deleted.iter().cloned().collect::<Vec<_>>(), vec![rel("a.txt")]);

        tree.write("a.txt", "A2");
        let report = tree.bff.status().unwrap();
        assert_eq!(report.modified.iter().cloned().collect::<Vec<_>>(), vec![rel("a.txt")]);
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn test_compare_scenario() {
        let a = TreeHarness::with_files(&[("a.txt", "same"), ("onlyA.txt", "A")]);
        let b = TreeHarness::with_files(&[("a.txt", "same"), ("onlyB.txt", "B")]);
        a.bff.index().unwrap();
        b.bff.index().unwrap();

        let report = a.bff.compare(b.root()).unwrap();
        assert_eq!(report.only_in_a_paths, 1);
        assert_eq!(report.only_in_b_paths, 1);
        assert_eq!(report.same_path_same_content, 1);
        assert_eq!(report.unique_contents_only_in_a, 1);
        assert_eq!(report.unique_contents_only_in_b, 1);
        assert_eq!(report.common_contents, 1);
    }

    #[test]
    #[traced_test]
    fn test_match_scenario() {
        let source = TreeHarness::with_files(&[("dirA/common.txt", "COMMON"), ("dirA/newfile.txt", "NEW")]);
        let dest = TreeHarness::with_files(&[("dirB/common_copy.txt", "COMMON")]);
        source.bff.index().unwrap();
        dest.bff.index().unwrap();

        let report = dest.bff.match_from(source.root(), false).unwrap();
        assert_eq!(report.copied.len(), 1);
        assert_eq!(report.copied[0].target, rel("dirB/newfile.txt"));
        assert_eq!(dest.read("dirB/newfile.txt"), "NEW");
        assert!(!dest.root().join("dirA").exists());

        assert!(logs_contain("Match finished: 1 copied"));
    }

    #[test]
    fn test_match_never_overwrites() {
        let source = TreeHarness::with_files(&[("d/common", "C"), ("d/notes.txt", "SOURCE NOTES")]);
        let dest = TreeHarness::with_files(&[("e/common", "C")]);
        source.bff.index().unwrap();
        dest.bff.index().unwrap();

        // Appears after indexing, so the destination index does not know it
        dest.write("e/notes.txt", "LOCAL NOTES");

        let report = dest.bff.match_from(source.root(), false).unwrap();
        assert!(report.copied.is_empty());
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].target, rel("e/notes.txt"));
        assert_eq!(dest.read("e/notes.txt"), "LOCAL NOTES");
    }

    #[test]
    fn test_match_dry_run_then_real() {
        let source = TreeHarness::with_files(&[("x/k", "K"), ("x/n1", "N1"), ("x/n2", "N2"), ("y/lonely", "L")]);
        let dest = TreeHarness::with_files(&[("z/k", "K")]);
        source.bff.index().unwrap();
        dest.bff.index().unwrap();

        let dry = dest.bff.match_from(source.root(), true).unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.copied.len(), 2);
        assert_eq!(dry.unmatched, vec![rel("y/lonely")]);
        assert!(!dest.root().join("z/n1").exists());

        let real = dest.bff.match_from(source.root(), false).unwrap();
        let targets: Vec<_> = real.copied.iter().map(|c| c.target.clone()).collect();
        assert_eq!(targets, vec![rel("z/n1"), rel("z/n2")]);
        assert_eq!(real.bytes_copied(), 4);
        assert_eq!(dest.read("z/n2"), "N2");

        // A second pass finds the same targets taken
        let again = dest.bff.match_from(source.root(), false).unwrap();
        assert!(again.copied.is_empty());
        assert_eq!(again.conflicts.len(), 2);
    }

    #[test]
    fn test_nested_repositories() {
        let outer = TreeHarness::with_files(&[("top.txt", "TOP"), ("photos/a.jpg", "JPEG"), ("photos/b.jpg", "TOP")]);
        Bff::init(outer.root().join("photos")).unwrap();

        let summaries = outer.bff.index().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].unique_contents, 1);
        assert_eq!(summaries[1].tree, rel("photos"));
        assert_eq!(summaries[1].unique_contents, 2);

        // The nested tree's own index uses its own root
        let nested = Bff::open(outer.root().join("photos")).unwrap();
        assert!(nested.load_index().unwrap().path_view().contains(&rel("a.jpg")));

        // The parent sees both, so the duplicate spans the two trees
        let clones = outer.bff.clones().unwrap();
        assert_eq!(clones.len(), 1);
        assert!(clones[0].1.contains(&rel("photos/b.jpg")));

        outer.write("photos/c.jpg", "NEW");
        let report = outer.bff.status().unwrap();
        assert!(report.new.contains(&rel("photos/c.jpg")));
    }

    #[test]
    fn test_random_trees_round_trip() {
        let mut generator = TreeGenerator::new(42);
        let tree = TreeHarness::new();
        let written = generator.populate(tree.root(), 60);

        let summaries = tree.bff.index().unwrap();
        assert_eq!(summaries[0].files, written.len());
        info!("Indexed {} files, {} unique", summaries[0].files, summaries[0].unique_contents);

        let report = tree.bff.status().unwrap();
        assert_eq!(report.new.len(), 1);
        assert!(report.modified.is_empty() && report.deleted.is_empty());

        // Comparing a tree with itself shares every path
        let compare = tree.bff.compare(tree.root()).unwrap();
        assert_eq!(compare.same_path_same_content, written.len());
        assert_eq!(compare.common_contents, summaries[0].unique_contents);
    }

    #[test]
    fn test_random_reorganization_is_recovered() {
        let mut rng = StdRng::seed_from_u64(7);
        let source = TreeHarness::new();
        let dest = TreeHarness::new();

        // Each source album maps to a renamed destination album holding all
        // but one of its photos
        let mut expected = Vec::new();
        for album in 0..5 {
            let photos = rng.random_range(2..6);
            for photo in 0..photos {
                let content = format!("album{}-photo{}", album, photo);
                source.write(&format!("albums/a{}/p{}.jpg", album, photo), &content);
                if photo == 0 {
                    expected.push((format!("sorted/year{}/p0.jpg", album), content));
                } else {
                    dest.write(&format!("sorted/year{}/renamed{}.jpg", album, photo), &content);
                }
            }
        }
        source.bff.index().unwrap();
        dest.bff.index().unwrap();

        let report = dest.bff.match_from(source.root(), false).unwrap();
        assert_eq!(report.copied.len(), expected.len());
        assert!(report.unmatched.is_empty());
        for (path, content) in expected {
            assert_eq!(dest.read(&path), content);
        }
    }
}
