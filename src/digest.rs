//! Content digests
//!
//! A [`Digest`] is the SHA-256 of a file's bytes rendered as 64 lowercase hex
//! characters. It is the only identity key used by status, compare and match,
//! so two files are "the same" exactly when their digests are equal.
//!
//! ```rust
//! use bff::Digest;
//!
//! let a = Digest::of_bytes(b"HELLO");
//! let b = Digest::of_bytes(b"HELLO");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str().len(), 64);
//! ```

use crate::error::{BffError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Length of a rendered digest in hex characters
pub const DIGEST_HEX_LEN: usize = 64;

/// Read buffer used when hashing files
const HASH_BUFFER_SIZE: usize = 8192;

/// SHA-256 content digest, stored as lowercase hex
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Hash an in-memory byte slice
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest(hex::encode(hasher.finalize()))
    }

    /// Hash any reader to its end
    pub fn of_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Digest(hex::encode(hasher.finalize())))
    }

    /// Hash a file's content without loading it whole
    ///
    /// # Errors
    ///
    /// - [`BffError::FileIo`] if the file cannot be opened or read
    pub fn of_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| BffError::file_io(path, e))?;
        Self::of_reader(file).map_err(|e| BffError::file_io(path, e))
    }

    /// Parse a persisted digest
    ///
    /// Only the canonical lowercase form is accepted.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(BffError::InvalidIndex(format!(
                "digest {:?} has length {}, expected {}",
                s,
                s.len(),
                DIGEST_HEX_LEN
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(BffError::InvalidIndex(format!(
                "digest {:?} is not lowercase hexadecimal",
                s
            )));
        }
        Ok(Digest(s.to_string()))
    }

    /// Hex rendering
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, for compact display
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl TryFrom<String> for Digest {
    type Error = BffError;

    fn try_from(value: String) -> Result<Self> {
        Digest::from_hex(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short(12))
    }
}
