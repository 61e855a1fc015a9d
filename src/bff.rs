//! Main bff entry point
//!
//! [`Bff`] ties the scanner, the store and the three reconciliation engines
//! to one tree root. Every path it takes or returns is explicit; nothing
//! depends on the process working directory.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use bff::Bff;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! Bff::init(PathBuf::from("./photos"))?;
//! let bff = Bff::open(PathBuf::from("./photos"))?;
//! bff.index()?;
//!
//! let report = bff.status()?;
//! println!("{} changes", report.total_changes());
//!
//! let copied = bff.match_from(Path::new("./old_photos"), false)?;
//! println!("Copied {} files", copied.copied.len());
//! # Ok(())
//! # }
//! ```

use crate::compare;
use crate::digest::Digest;
use crate::error::Result;
use crate::index::ContentIndex;
use crate::matcher::{self, CopyOptions, MatchPlan};
use crate::scanner::TreeScanner;
use crate::status;
use crate::store::IndexStore;
use crate::types::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// A bff tree rooted at one directory
///
/// # Examples
///
/// ```rust,no_run
/// use bff::{Bff, BffBuilder};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Using the tree's stored configuration
/// let bff = Bff::open(PathBuf::from("./project"))?;
///
/// // Overriding parts of it for this handle only
/// let bff = BffBuilder::new()
///     .ignore_patterns(vec!["*.tmp".to_string()])
///     .parallel_workers(2)
///     .build(PathBuf::from("./project"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bff {
    /// Root directory of the tree
    root_path: PathBuf,
    /// Metadata directory access
    store: IndexStore,
    /// Effective configuration
    config: BffConfig,
    /// Scanner configured from `config`
    scanner: TreeScanner,
}

impl Bff {
    /// Initialize a tree
    ///
    /// Creates `.bff` and a default `config.json`. Initializing twice is not
    /// an error and leaves the existing state untouched.
    #[instrument]
    pub fn init(root_path: PathBuf) -> Result<InitOutcome> {
        IndexStore::new(root_path).initialize()
    }

    /// Open an initialized tree with its stored configuration
    ///
    /// # Errors
    ///
    /// - [`crate::BffError::NotInitialized`] if the tree has no `.bff` directory
    /// - [`crate::BffError::Serialization`] if `config.json` is corrupt
    #[instrument]
    pub fn open(root_path: PathBuf) -> Result<Self> {
        let store = IndexStore::new(root_path.clone());
        store.ensure_initialized()?;
        let config = store.load_config()?;
        Ok(Self::with_config(root_path, store, config))
    }

    fn with_config(root_path: PathBuf, store: IndexStore, config: BffConfig) -> Self {
        let scanner = TreeScanner::from_config(root_path.clone(), &config);
        Self {
            root_path,
            store,
            config,
            scanner,
        }
    }

    /// Root directory of the tree
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Effective configuration
    pub fn config(&self) -> &BffConfig {
        &self.config
    }

    /// Build and save the index of this tree and of every nested tree
    ///
    /// The first summary is the root tree's; nested trees follow in path
    /// order. Every tree is scanned before anything is saved, so an
    /// unreadable file anywhere fails the whole build and leaves all
    /// previously saved indexes in place.
    pub fn index(&self) -> Result<Vec<IndexSummary>> {
        self.index_with_progress::<fn(ProgressInfo)>(None)
    }

    /// [`Bff::index`] reporting hashing progress
    #[instrument(skip(self, progress_callback), fields(root = ?self.root_path))]
    pub fn index_with_progress<F>(&self, progress_callback: Option<F>) -> Result<Vec<IndexSummary>>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let mut built = Vec::new();
        built.push(scan_tree(
            self.store.clone(),
            &self.scanner,
            RelativePath::root(),
            progress_callback.as_ref(),
        )?);

        for location in self.scanner.nested_trees() {
            let store = IndexStore::new(location.resolve(&self.root_path));
            let config = store.load_config()?;
            let scanner = TreeScanner::from_config(store.root().to_path_buf(), &config);
            built.push(scan_tree(store, &scanner, location, progress_callback.as_ref())?);
        }

        let mut summaries = Vec::with_capacity(built.len());
        for tree in built {
            tree.store.save(&tree.index)?;
            debug!(
                "Indexed {} files ({} unique) in tree {}",
                tree.summary.files, tree.summary.unique_contents, tree.summary.tree
            );
            summaries.push(tree.summary);
        }

        info!(
            "Indexed {} tree(s) under {:?}",
            summaries.len(),
            self.root_path
        );
        Ok(summaries)
    }

    /// Stored index of this tree with nested trees overlaid
    pub fn load_index(&self) -> Result<ContentIndex> {
        self.store.load_with_nested(&self.scanner.nested_trees())
    }

    /// Compare the live tree against its stored index
    #[instrument(skip(self), fields(root = ?self.root_path))]
    pub fn status(&self) -> Result<StatusReport> {
        status::status(&self.store, &self.scanner)
    }

    /// Compare this tree (A) against another indexed tree (B)
    #[instrument(skip(self), fields(root = ?self.root_path))]
    pub fn compare(&self, other_root: &Path) -> Result<CompareReport> {
        let this = self.load_index()?;
        let other = load_tree_index(other_root)?;
        Ok(compare::compare(&this, &other))
    }

    /// Decide where content missing from this tree would be copied from `source_root`
    pub fn plan_match(&self, source_root: &Path) -> Result<MatchPlan> {
        let destination = self.load_index()?;
        let source = load_tree_index(source_root)?;
        let plan = matcher::plan(&source, &destination);
        debug!(
            "Match plan: {} missing contents, {} copies, {} unmatched",
            plan.missing_contents,
            plan.copies.len(),
            plan.unmatched.len()
        );
        Ok(plan)
    }

    /// Copy content missing from this tree out of `source_root`
    ///
    /// Targets are inferred from sibling content (see [`crate::matcher`]).
    /// Existing files are never overwritten. With `dry_run` the report lists
    /// what would be copied and nothing is written.
    #[instrument(skip(self), fields(root = ?self.root_path))]
    pub fn match_from(&self, source_root: &Path, dry_run: bool) -> Result<MatchReport> {
        let plan = self.plan_match(source_root)?;
        let options = CopyOptions {
            dry_run,
            verify_copies: self.config.verify_copies,
            parallel_workers: self.config.effective_workers(),
        };
        matcher::execute(&plan, source_root, &self.root_path, &options)
    }

    /// Contents stored under more than one path, in digest order
    pub fn clones(&self) -> Result<Vec<(Digest, BTreeSet<RelativePath>)>> {
        let index = self.load_index()?;
        Ok(index
            .duplicates()
            .map(|(digest, paths)| (digest.clone(), paths.clone()))
            .collect())
    }

    /// Remove the saved index, reporting whether there was one
    #[instrument(skip(self), fields(root = ?self.root_path))]
    pub fn clean(&self) -> Result<bool> {
        self.store.clean()
    }
}

/// A scanned tree waiting to be saved
struct BuiltTree {
    store: IndexStore,
    index: ContentIndex,
    summary: IndexSummary,
}

fn scan_tree<F>(
    store: IndexStore,
    scanner: &TreeScanner,
    location: RelativePath,
    progress_callback: Option<&F>,
) -> Result<BuiltTree>
where
    F: Fn(ProgressInfo) + Send + Sync,
{
    let start = Instant::now();
    let index = scanner.build_index(progress_callback)?;

    let summary = IndexSummary {
        tree: location,
        unique_contents: index.len(),
        files: index.file_count(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    Ok(BuiltTree {
        store,
        index,
        summary,
    })
}

/// Load another tree's index, nested trees included, using its own config
fn load_tree_index(root: &Path) -> Result<ContentIndex> {
    let store = IndexStore::new(root);
    store.ensure_initialized()?;
    let config = store.load_config()?;
    let scanner = TreeScanner::from_config(root.to_path_buf(), &config);
    store.load_with_nested(&scanner.nested_trees())
}

/// Builder for [`Bff`] handles with configuration overrides
///
/// Overrides apply to the built handle only; the tree's `config.json` is
/// not rewritten.
#[derive(Debug, Default)]
pub struct BffBuilder {
    ignore_patterns: Option<Vec<String>>,
    parallel_workers: Option<usize>,
    follow_symlinks: Option<bool>,
    verify_copies: Option<bool>,
}

impl BffBuilder {
    /// Create a builder that changes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ignore patterns
    ///
    /// ```rust
    /// use bff::BffBuilder;
    ///
    /// let builder = BffBuilder::new()
    ///     .ignore_patterns(vec!["*.log".to_string(), "target/".to_string()]);
    /// ```
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = Some(patterns);
        self
    }

    /// Set number of parallel workers (0 = one per CPU)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.parallel_workers = Some(count);
        self
    }

    /// Set whether to follow symbolic links
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = Some(follow);
        self
    }

    /// Set whether match re-hashes sources before copying
    pub fn verify_copies(mut self, verify: bool) -> Self {
        self.verify_copies = Some(verify);
        self
    }

    /// Open the tree at `root_path` with the overrides applied
    pub fn build(self, root_path: PathBuf) -> Result<Bff> {
        let store = IndexStore::new(root_path.clone());
        store.ensure_initialized()?;
        let mut config = store.load_config()?;

        if let Some(patterns) = self.ignore_patterns {
            config.ignore_patterns = patterns;
        }
        if let Some(workers) = self.parallel_workers {
            config.parallel_workers = workers;
        }
        if let Some(follow) = self.follow_symlinks {
            config.follow_symlinks = follow;
        }
        if let Some(verify) = self.verify_copies {
            config.verify_copies = verify;
        }

        Ok(Bff::with_config(root_path, store, config))
    }
}
