//! Relocation of missing content by directory affinity
//!
//! Given a source snapshot S and a destination snapshot D, every file whose
//! content exists in S but nowhere in D is copied into D. The file is not
//! placed at its source path. Instead its destination directory is inferred
//! from its siblings: files in the same source directory whose content D
//! already has "vote" for the directories holding that content in D.
//!
//! ```text
//! source/                      destination/
//! └── dirA/                    └── dirB/
//!     ├── common.txt  ───────────►   ├── common_copy.txt   (same digest)
//!     └── newfile.txt  ─ copy ──►    └── newfile.txt       (inferred)
//! ```
//!
//! Matching runs in two steps. [`plan`] is pure and decides every target.
//! [`execute`] performs the copies.
//!
//! ## Decision rules
//!
//! - Each sibling file votes once for the parent directory of every
//!   destination path holding its digest.
//! - The directory with the most votes wins. Ties go to the lexicographically
//!   smallest directory path. The choice is made once per source directory.
//! - A source directory with no voting sibling yields no target: its
//!   candidates are reported as unmatched.
//! - Existing destination files are never overwritten. Targets are opened
//!   with create-new semantics and an existing file is reported as a
//!   conflict.

use crate::collections::{HashMap, HashMapExt, HashSet, HashSetExt};
use crate::digest::Digest;
use crate::error::Result;
use crate::index::ContentIndex;
use crate::types::{CopyRecord, FailedCopy, MatchReport, RelativePath};
use crate::utils;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// One file the matcher intends to copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    /// Content being copied
    pub digest: Digest,
    /// Path in the source tree
    pub source: RelativePath,
    /// Path in the destination tree
    pub target: RelativePath,
    /// Votes the chosen directory received
    pub votes: usize,
}

/// Every decision of a match pass, before anything is written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPlan {
    /// Copies in ascending source path order
    pub copies: Vec<PlannedCopy>,
    /// Candidates without any directory-affinity signal, ascending
    pub unmatched: Vec<RelativePath>,
    /// Number of digests in the source absent from the destination
    pub missing_contents: usize,
}

/// How [`execute`] performs copies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Report what would be copied without touching the destination
    pub dry_run: bool,
    /// Re-hash each source before copying it
    pub verify_copies: bool,
    /// Worker threads; copies into one directory always share a worker
    pub parallel_workers: usize,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verify_copies: true,
            parallel_workers: num_cpus::get(),
        }
    }
}

/// Decide where each piece of missing content goes
pub fn plan(source: &ContentIndex, destination: &ContentIndex) -> MatchPlan {
    let missing: HashSet<&Digest> = {
        let mut set = HashSet::with_capacity(source.len());
        set.extend(source.digests().filter(|d| !destination.contains_digest(d)));
        set
    };

    let view = source.path_view();
    let mut by_dir: BTreeMap<RelativePath, Vec<(&RelativePath, &Digest)>> = BTreeMap::new();
    for (path, digest) in view.iter() {
        by_dir.entry(path.parent()).or_default().push((path, digest));
    }

    let mut result = MatchPlan {
        missing_contents: missing.len(),
        ..MatchPlan::default()
    };

    for (dir, files) in &by_dir {
        let candidates: Vec<_> = files
            .iter()
            .filter(|(_, digest)| missing.contains(digest))
            .collect();
        if candidates.is_empty() {
            continue;
        }

        match choose_directory(files, destination) {
            Some((target_dir, votes)) => {
                debug!("Source directory {} maps to {} ({} votes)", dir, target_dir, votes);
                for (path, digest) in candidates {
                    result.copies.push(PlannedCopy {
                        digest: (*digest).clone(),
                        source: (*path).clone(),
                        target: target_dir.join(path.file_name()),
                        votes,
                    });
                }
            }
            None => {
                debug!("Source directory {} has no sibling content in the destination", dir);
                result
                    .unmatched
                    .extend(candidates.into_iter().map(|(path, _)| (*path).clone()));
            }
        }
    }

    result.copies.sort_by(|a, b| a.source.cmp(&b.source));
    result.unmatched.sort();
    result
}

/// Tally sibling votes and pick the winning destination directory
fn choose_directory(
    siblings: &[(&RelativePath, &Digest)],
    destination: &ContentIndex,
) -> Option<(RelativePath, usize)> {
    let mut votes: HashMap<RelativePath, usize> = HashMap::new();
    for (_, digest) in siblings {
        if let Some(dest_paths) = destination.paths(digest) {
            for dest_path in dest_paths {
                *votes.entry(dest_path.parent()).or_insert(0) += 1;
            }
        }
    }

    votes
        .into_iter()
        .max_by(|(dir_a, votes_a), (dir_b, votes_b)| {
            votes_a.cmp(votes_b).then_with(|| dir_b.cmp(dir_a))
        })
}

enum CopyResult {
    Copied(u64),
    Conflict,
    Failed(String),
}

#[derive(Default)]
struct GroupOutcome {
    copied: Vec<CopyRecord>,
    conflicts: Vec<CopyRecord>,
    failed: Vec<FailedCopy>,
}

/// Perform the copies of a plan
///
/// Copies are grouped by destination directory. Groups run in parallel and
/// the copies of one group run in order, so a directory is created by one
/// worker only. Per-file failures are collected into the report.
pub fn execute(
    plan: &MatchPlan,
    source_root: &Path,
    dest_root: &Path,
    options: &CopyOptions,
) -> Result<MatchReport> {
    let start = Instant::now();

    let mut groups: BTreeMap<RelativePath, Vec<&PlannedCopy>> = BTreeMap::new();
    for copy in &plan.copies {
        groups.entry(copy.target.parent()).or_default().push(copy);
    }
    let groups: Vec<_> = groups.into_iter().collect();

    let pool = utils::build_thread_pool(options.parallel_workers)?;
    let outcomes: Vec<GroupOutcome> = pool.install(|| {
        groups
            .par_iter()
            .map(|(dir, copies)| copy_group(dir, copies, source_root, dest_root, options))
            .collect()
    });

    let mut report = MatchReport {
        unmatched: plan.unmatched.clone(),
        dry_run: options.dry_run,
        ..MatchReport::default()
    };
    for outcome in outcomes {
        report.copied.extend(outcome.copied);
        report.conflicts.extend(outcome.conflicts);
        report.failed.extend(outcome.failed);
    }
    report.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Match {}: {} copied ({}), {} conflicts, {} unmatched, {} failed",
        if options.dry_run { "planned" } else { "finished" },
        report.copied.len(),
        utils::format_bytes(report.bytes_copied()),
        report.conflicts.len(),
        report.unmatched.len(),
        report.failed.len()
    );
    Ok(report)
}

fn copy_group(
    dir: &RelativePath,
    copies: &[&PlannedCopy],
    source_root: &Path,
    dest_root: &Path,
    options: &CopyOptions,
) -> GroupOutcome {
    let mut outcome = GroupOutcome::default();

    if !options.dry_run {
        let dir_abs = dir.resolve(dest_root);
        if let Err(e) = fs::create_dir_all(&dir_abs) {
            warn!("Cannot create {:?}: {}", dir_abs, e);
            for copy in copies {
                outcome.failed.push(FailedCopy {
                    source: copy.source.clone(),
                    target: copy.target.clone(),
                    message: format!("cannot create directory {}: {}", dir, e),
                });
            }
            return outcome;
        }
    }

    // Targets a dry run has already handed out within this directory
    let mut claimed: HashSet<&RelativePath> = HashSet::with_capacity(copies.len());

    for copy in copies {
        let result = if options.dry_run {
            if !claimed.insert(&copy.target) || copy.target.resolve(dest_root).exists() {
                CopyResult::Conflict
            } else {
                CopyResult::Copied(0)
            }
        } else {
            copy_one(copy, source_root, dest_root, options.verify_copies)
        };

        match result {
            CopyResult::Copied(bytes) => {
                trace!("Copied {} -> {}", copy.source, copy.target);
                outcome.copied.push(CopyRecord {
                    source: copy.source.clone(),
                    target: copy.target.clone(),
                    bytes,
                });
            }
            CopyResult::Conflict => {
                debug!("Target {} already exists; skipping", copy.target);
                outcome.conflicts.push(CopyRecord {
                    source: copy.source.clone(),
                    target: copy.target.clone(),
                    bytes: 0,
                });
            }
            CopyResult::Failed(message) => {
                warn!("Copy {} -> {} failed: {}", copy.source, copy.target, message);
                outcome.failed.push(FailedCopy {
                    source: copy.source.clone(),
                    target: copy.target.clone(),
                    message,
                });
            }
        }
    }
    outcome
}

fn copy_one(copy: &PlannedCopy, source_root: &Path, dest_root: &Path, verify: bool) -> CopyResult {
    let source_abs = copy.source.resolve(source_root);
    let target_abs = copy.target.resolve(dest_root);

    if verify {
        match Digest::of_file(&source_abs) {
            Ok(actual) if actual == copy.digest => {}
            Ok(actual) => {
                return CopyResult::Failed(format!(
                    "source changed since it was indexed (expected {}, found {})",
                    copy.digest.short(12),
                    actual.short(12)
                ));
            }
            Err(e) => return CopyResult::Failed(e.to_string()),
        }
    }

    let mut reader = match File::open(&source_abs) {
        Ok(file) => file,
        Err(e) => return CopyResult::Failed(format!("cannot read {:?}: {}", source_abs, e)),
    };

    // create_new makes the existence check and the creation one step
    let mut writer = match OpenOptions::new().write(true).create_new(true).open(&target_abs) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return CopyResult::Conflict,
        Err(e) => return CopyResult::Failed(format!("cannot create {:?}: {}", target_abs, e)),
    };

    match io::copy(&mut reader, &mut writer).and_then(|bytes| writer.sync_all().map(|_| bytes)) {
        Ok(bytes) => CopyResult::Copied(bytes),
        Err(e) => {
            drop(writer);
            if let Err(remove_err) = fs::remove_file(&target_abs) {
                warn!("Could not remove partial copy {:?}: {}", target_abs, remove_err);
            }
            CopyResult::Failed(format!("copy to {:?} failed: {}", target_abs, e))
        }
    }
}
