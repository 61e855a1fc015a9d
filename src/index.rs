//! Content index: the persisted snapshot of a tree
//!
//! A [`ContentIndex`] maps each [`Digest`] to the set of relative paths holding
//! that content. Several paths under one digest are duplicate files. The
//! inverted [`PathDigestView`] answers per-path questions (status, sibling
//! lookups in match).
//!
//! Two invariants hold for every index this module hands out, including
//! indexes decoded from disk:
//!
//! 1. a path appears under exactly one digest;
//! 2. no digest maps to an empty path set.
//!
//! Ordered maps are used throughout so that iteration, serialization and
//! everything derived from them are deterministic.
//!
//! ## Example
//!
//! ```rust
//! use bff::{ContentIndex, Digest, RelativePath};
//! use std::path::Path;
//!
//! # fn main() -> bff::Result<()> {
//! let a = RelativePath::from_path(Path::new("a.txt"))?;
//! let b = RelativePath::from_path(Path::new("copy/a.txt"))?;
//! let digest = Digest::of_bytes(b"same");
//!
//! let index = ContentIndex::from_entries(vec![(a, digest.clone()), (b, digest.clone())])?;
//! assert_eq!(index.len(), 1);
//! assert_eq!(index.file_count(), 2);
//!
//! let decoded = ContentIndex::decode(&index.encode()?)?;
//! assert_eq!(decoded, index);
//! # Ok(())
//! # }
//! ```

use crate::digest::Digest;
use crate::error::{BffError, Result};
use crate::types::RelativePath;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

/// Digest → set of paths holding that content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawContentIndex")]
pub struct ContentIndex {
    files: BTreeMap<Digest, BTreeSet<RelativePath>>,
}

/// Wire shape of `index.json` before invariant checks
#[derive(Deserialize)]
struct RawContentIndex {
    files: BTreeMap<Digest, Vec<RelativePath>>,
}

impl TryFrom<RawContentIndex> for ContentIndex {
    type Error = BffError;

    fn try_from(raw: RawContentIndex) -> Result<Self> {
        let mut seen: BTreeMap<&RelativePath, &Digest> = BTreeMap::new();
        for (digest, paths) in &raw.files {
            if paths.is_empty() {
                return Err(BffError::InvalidIndex(format!(
                    "digest {} has no paths",
                    digest
                )));
            }
            for path in paths {
                if path.is_root() {
                    return Err(BffError::InvalidIndex(format!(
                        "digest {} lists the tree root as a file",
                        digest
                    )));
                }
                if let Some(other) = seen.insert(path, digest) {
                    if other != digest {
                        return Err(BffError::InvalidIndex(format!(
                            "path {} appears under digests {} and {}",
                            path, other, digest
                        )));
                    }
                }
            }
        }

        let files = raw
            .files
            .into_iter()
            .map(|(digest, paths)| (digest, paths.into_iter().collect()))
            .collect();
        Ok(ContentIndex { files })
    }
}

impl ContentIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(path, digest)` pairs
    ///
    /// # Errors
    ///
    /// - [`BffError::InvalidIndex`] if a path is listed with two different digests
    ///   or names the tree root
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (RelativePath, Digest)>,
    {
        let mut view = PathDigestView::default();
        for (path, digest) in entries {
            view.insert(path, digest)?;
        }
        Ok(view.to_content_index())
    }

    /// Insert a path the caller knows is not yet in the index
    ///
    /// The scanner yields every path once, so it can skip the uniqueness check
    /// that [`ContentIndex::from_entries`] performs.
    pub(crate) fn insert_unique(&mut self, digest: Digest, path: RelativePath) {
        self.files.entry(digest).or_default().insert(path);
    }

    /// Union another index with disjoint paths into this one
    pub(crate) fn merge(&mut self, other: ContentIndex) {
        for (digest, paths) in other.files {
            match self.files.entry(digest) {
                Entry::Occupied(mut existing) => existing.get_mut().extend(paths),
                Entry::Vacant(slot) => {
                    slot.insert(paths);
                }
            }
        }
    }

    /// Copy of this index with every path re-rooted under `prefix`
    pub fn rebased(&self, prefix: &RelativePath) -> ContentIndex {
        let files = self
            .files
            .iter()
            .map(|(digest, paths)| {
                (
                    digest.clone(),
                    paths.iter().map(|p| p.under(prefix)).collect(),
                )
            })
            .collect();
        ContentIndex { files }
    }

    /// Number of distinct digests
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the index holds no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of indexed paths
    pub fn file_count(&self) -> usize {
        self.files.values().map(BTreeSet::len).sum()
    }

    /// Check if some path holds this content
    pub fn contains_digest(&self, digest: &Digest) -> bool {
        self.files.contains_key(digest)
    }

    /// Paths holding this content
    pub fn paths(&self, digest: &Digest) -> Option<&BTreeSet<RelativePath>> {
        self.files.get(digest)
    }

    /// Digests in ascending order
    pub fn digests(&self) -> impl Iterator<Item = &Digest> + '_ {
        self.files.keys()
    }

    /// `(digest, paths)` pairs in ascending digest order
    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &BTreeSet<RelativePath>)> + '_ {
        self.files.iter()
    }

    /// Groups of paths sharing identical content
    pub fn duplicates(&self) -> impl Iterator<Item = (&Digest, &BTreeSet<RelativePath>)> + '_ {
        self.files.iter().filter(|(_, paths)| paths.len() > 1)
    }

    /// Invert into a per-path view
    pub fn path_view(&self) -> PathDigestView {
        let entries = self
            .files
            .iter()
            .flat_map(|(digest, paths)| paths.iter().map(move |p| (p.clone(), digest.clone())))
            .collect();
        PathDigestView { entries }
    }

    /// Serialize to the `index.json` format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse and validate the `index.json` format
    ///
    /// # Errors
    ///
    /// - [`BffError::Serialization`] for malformed JSON, a missing `files` key,
    ///   bad digests, or invariant violations
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Relative path → digest, the inverse of a [`ContentIndex`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathDigestView {
    entries: BTreeMap<RelativePath, Digest>,
}

impl PathDigestView {
    /// Record a path's digest
    ///
    /// Re-inserting the same pair is a no-op; a different digest for a known
    /// path is an error.
    pub fn insert(&mut self, path: RelativePath, digest: Digest) -> Result<()> {
        if path.is_root() {
            return Err(BffError::InvalidIndex(
                "the tree root cannot be indexed as a file".to_string(),
            ));
        }
        match self.entries.entry(path) {
            Entry::Vacant(slot) => {
                slot.insert(digest);
                Ok(())
            }
            Entry::Occupied(existing) if *existing.get() == digest => Ok(()),
            Entry::Occupied(existing) => Err(BffError::InvalidIndex(format!(
                "path {} appears under digests {} and {}",
                existing.key(),
                existing.get(),
                digest
            ))),
        }
    }

    /// Record a path's digest, returning the digest it replaced
    pub(crate) fn replace(&mut self, path: RelativePath, digest: Digest) -> Option<Digest> {
        self.entries.insert(path, digest)
    }

    /// Digest of a path
    pub fn get(&self, path: &RelativePath) -> Option<&Digest> {
        self.entries.get(path)
    }

    /// Check if the path is present
    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the view is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(path, digest)` pairs in ascending path order
    pub fn iter(&self) -> impl Iterator<Item = (&RelativePath, &Digest)> + '_ {
        self.entries.iter()
    }

    /// Paths in ascending order
    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> + '_ {
        self.entries.keys()
    }

    /// Invert back into a content index
    pub fn to_content_index(&self) -> ContentIndex {
        let mut index = ContentIndex::new();
        for (path, digest) in &self.entries {
            index.insert_unique(digest.clone(), path.clone());
        }
        index
    }
}

impl From<&ContentIndex> for PathDigestView {
    fn from(index: &ContentIndex) -> Self {
        index.path_view()
    }
}
