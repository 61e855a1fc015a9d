//! # bff - content-addressable tree indexing and reconciliation
//!
//! bff snapshots a directory tree as a map from file content (SHA-256) to the
//! relative paths holding that content, and uses those snapshots to answer
//! three questions:
//!
//! - **status**: what changed on disk since the tree was last indexed?
//! - **compare**: how do two independently indexed trees overlap, by path and
//!   by content?
//! - **match**: which files of another tree are missing here, and where do
//!   they belong given where their siblings already live?
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bff::Bff;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! Bff::init(PathBuf::from("./library"))?;
//! let bff = Bff::open(PathBuf::from("./library"))?;
//!
//! // Snapshot the tree into .bff/index.json
//! for summary in bff.index()? {
//!     println!("{}: {} unique contents", summary.tree, summary.unique_contents);
//! }
//!
//! // Drift since the snapshot
//! let status = bff.status()?;
//! for path in &status.modified {
//!     println!("modified: {}", path);
//! }
//!
//! // Overlap with another indexed tree
//! let report = bff.compare(Path::new("./backup"))?;
//! println!("{} contents in common", report.common_contents);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persisted State
//!
//! Each tree root holds a `.bff` directory with `index.json` (the snapshot)
//! and `config.json` (walk and copy settings). Subdirectories that carry
//! their own `.bff` are nested trees: they are indexed into their own
//! snapshot and overlaid onto the parent's when loading.
//!
//! ## Module Organization
//!
//! - [`digest`]: content digests
//! - [`index`]: the snapshot model and its per-path view
//! - [`scanner`]: parallel walking and hashing
//! - [`store`]: the `.bff` metadata directory
//! - [`status`], [`compare`], [`matcher`]: the reconciliation engines
//! - [`types`]: paths, configuration and reports
//! - [`error`]: error types

pub mod bff;
pub mod compare;
pub mod digest;
pub mod error;
pub mod index;
pub mod matcher;
pub mod scanner;
pub mod status;
pub mod store;
pub mod types;
pub mod utils;

mod collections;

pub use crate::bff::{Bff, BffBuilder};
pub use digest::Digest;
pub use error::{BffError, Result};
pub use index::{ContentIndex, PathDigestView};
pub use matcher::{CopyOptions, MatchPlan, PlannedCopy};
pub use scanner::{ScanScope, TreeScanner};
pub use store::IndexStore;
pub use types::*;
