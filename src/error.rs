//! Error types for bff
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias over
//! [`BffError`]. Errors fall into two groups:
//!
//! - **Fatal state errors** ([`BffError::NotInitialized`], [`BffError::NoIndex`],
//!   [`BffError::Serialization`]) stop the invoking command.
//! - **Per-file I/O errors** ([`BffError::FileIo`]) are fatal while building an
//!   index, but are collected into reports by `status` and `match`.

use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the bff library
pub type Result<T> = std::result::Result<T, BffError>;

/// Main error type for all bff operations
#[derive(Debug, Error)]
pub enum BffError {
    /// The tree has no `.bff` metadata directory
    #[error("Not a bff repository: {0:?}")]
    NotInitialized(PathBuf),

    /// The tree is initialized but has never been indexed
    #[error("No index found in {0:?}")]
    NoIndex(PathBuf),

    /// I/O errors without a specific file attached
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a specific file
    #[error("IO error on {path:?}: {source}")]
    FileIo {
        /// File that could not be read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Corrupt or schema-mismatched persisted state
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Index content violates the index invariants
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Error from the parallel directory walker
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// Path is not valid UTF-8 and cannot be stored in an index
    #[error("Path conversion error: {0:?}")]
    PathConversion(OsString),

    /// Bad ignore pattern in the tree configuration
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Thread pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BffError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BffError::Internal(msg.into())
    }

    /// Attach a file path to an I/O error
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BffError::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Check if this error means the tree lacks persisted state
    pub fn is_missing_state(&self) -> bool {
        matches!(self, BffError::NotInitialized(_) | BffError::NoIndex(_))
    }

    /// Check if this error indicates a damaged index or configuration
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            BffError::Serialization(_) | BffError::InvalidIndex(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            BffError::NotInitialized(path) => {
                format!("{:?} is not a bff repository. Run 'bff init' there first.", path)
            }
            BffError::NoIndex(path) => {
                format!("{:?} has not been indexed yet. Run 'bff index' there first.", path)
            }
            BffError::Serialization(e) => {
                format!(
                    "The stored index could not be read ({}). Run 'bff clean' and 'bff index' to rebuild it.",
                    e
                )
            }
            BffError::InvalidConfiguration(msg) => {
                format!(
                    "The tree configuration cannot be used: {}. Upgrade bff or edit .bff/config.json.",
                    msg
                )
            }
            BffError::FileIo { path, source } => {
                format!("Could not access {:?}: {}", path, source)
            }
            _ => self.to_string(),
        }
    }
}
