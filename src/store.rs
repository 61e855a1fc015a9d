//! Persisted per-tree state
//!
//! Every tree keeps its state in a metadata directory at its root:
//!
//! ```text
//! <root>/
//! └── .bff/
//!     ├── index.json    # ContentIndex, rewritten wholesale by each index build
//!     └── config.json   # BffConfig, written once by init
//! ```
//!
//! Writes go through [`utils::atomic_write`], so a crash during `index`
//! leaves either the previous index or the new one, never a torn file.

use crate::error::{BffError, Result};
use crate::index::ContentIndex;
use crate::types::{BffConfig, InitOutcome, RelativePath};
use crate::utils::{self, METADATA_DIR};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Index file name inside the metadata directory
pub const INDEX_FILE: &str = "index.json";

/// Configuration file name inside the metadata directory
pub const CONFIG_FILE: &str = "config.json";

/// Newest `config.json` format this build understands
pub const FORMAT_VERSION: u32 = 1;

/// Access to one tree's metadata directory
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    /// Create a store for the tree rooted at `root`
    ///
    /// Nothing is touched on disk until a method is called.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/.bff`
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// `<root>/.bff/index.json`
    pub fn index_path(&self) -> PathBuf {
        self.metadata_dir().join(INDEX_FILE)
    }

    /// `<root>/.bff/config.json`
    pub fn config_path(&self) -> PathBuf {
        self.metadata_dir().join(CONFIG_FILE)
    }

    /// Check if the metadata directory exists
    pub fn is_initialized(&self) -> bool {
        self.metadata_dir().is_dir()
    }

    /// Check if an index has been saved
    pub fn has_index(&self) -> bool {
        self.index_path().is_file()
    }

    /// Fail with [`BffError::NotInitialized`] unless the tree is initialized
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BffError::NotInitialized(self.root.clone()))
        }
    }

    /// Create the metadata directory and a default configuration
    ///
    /// Calling this on an initialized tree changes nothing and reports
    /// [`InitOutcome::AlreadyInitialized`]. A missing `config.json` is
    /// recreated either way.
    pub fn initialize(&self) -> Result<InitOutcome> {
        let existed = self.is_initialized();
        let dir = self.metadata_dir();
        fs::create_dir_all(&dir).map_err(|e| BffError::file_io(&dir, e))?;

        if !self.config_path().exists() {
            let config = BffConfig {
                created_at: Some(Utc::now()),
                ..BffConfig::default()
            };
            self.save_config(&config)?;
        }

        if existed {
            debug!("Tree at {:?} already initialized", self.root);
            Ok(InitOutcome::AlreadyInitialized)
        } else {
            info!("Initialized tree at {:?}", self.root);
            Ok(InitOutcome::Created)
        }
    }

    /// Persist an index, replacing the previous one
    ///
    /// Creates the metadata directory if it is missing.
    pub fn save(&self, index: &ContentIndex) -> Result<()> {
        let dir = self.metadata_dir();
        fs::create_dir_all(&dir).map_err(|e| BffError::file_io(&dir, e))?;

        let bytes = index.encode()?;
        utils::atomic_write(&self.index_path(), &bytes)?;

        debug!(
            "Saved index with {} unique contents ({} bytes) to {:?}",
            index.len(),
            bytes.len(),
            self.index_path()
        );
        Ok(())
    }

    /// Load the saved index
    ///
    /// # Errors
    ///
    /// - [`BffError::NotInitialized`] if there is no metadata directory
    /// - [`BffError::NoIndex`] if the tree was never indexed
    /// - [`BffError::Serialization`] if `index.json` is corrupt
    pub fn load(&self) -> Result<ContentIndex> {
        self.ensure_initialized()?;

        let path = self.index_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BffError::NoIndex(self.root.clone()));
            }
            Err(e) => return Err(BffError::file_io(&path, e)),
        };

        let index = ContentIndex::decode(&bytes)?;
        debug!("Loaded index with {} unique contents from {:?}", index.len(), path);
        Ok(index)
    }

    /// Load the root index with every nested tree's index overlaid
    ///
    /// `nested` lists nested tree locations relative to the root. Their
    /// indexes are rebased under those locations. Nested trees without an
    /// index are skipped with a warning, and where a stale root index still
    /// lists a path inside a nested tree the nested index wins.
    pub fn load_with_nested(&self, nested: &[RelativePath]) -> Result<ContentIndex> {
        let root_index = self.load()?;
        if nested.is_empty() {
            return Ok(root_index);
        }

        let mut view = root_index.path_view();
        for location in nested {
            let store = IndexStore::new(location.resolve(&self.root));
            let nested_index = match store.load() {
                Ok(index) => index,
                Err(BffError::NoIndex(_)) => {
                    warn!("Nested repository {} has no index; skipping", location);
                    continue;
                }
                Err(e) => return Err(e),
            };

            for (digest, paths) in nested_index.iter() {
                for path in paths {
                    let rebased = path.under(location);
                    if let Some(previous) = view.replace(rebased.clone(), digest.clone()) {
                        if &previous != digest {
                            debug!("Nested index of {} overrides stale entry {}", location, rebased);
                        }
                    }
                }
            }
        }

        Ok(view.to_content_index())
    }

    /// Load the tree configuration, defaulting when `config.json` is missing
    ///
    /// # Errors
    ///
    /// - [`BffError::Serialization`] if `config.json` is not valid JSON
    /// - [`BffError::InvalidConfiguration`] if it was written by a newer format
    pub fn load_config(&self) -> Result<BffConfig> {
        let path = self.config_path();
        let config: BffConfig = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BffConfig::default()),
            Err(e) => return Err(BffError::file_io(&path, e)),
        };

        if config.format_version > FORMAT_VERSION {
            return Err(BffError::InvalidConfiguration(format!(
                "{:?} uses format version {}, this build supports up to {}",
                path, config.format_version, FORMAT_VERSION
            )));
        }
        Ok(config)
    }

    /// Persist the tree configuration
    pub fn save_config(&self, config: &BffConfig) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(config)?;
        bytes.push(b'\n');
        utils::atomic_write(&self.config_path(), &bytes)
    }

    /// Remove the index file, reporting whether there was one
    pub fn clean(&self) -> Result<bool> {
        self.ensure_initialized()?;
        let removed = utils::remove_file_if_exists(&self.index_path())?;
        if removed {
            info!("Removed index at {:?}", self.index_path());
        }
        Ok(removed)
    }
}
