//! Content hashing of input files and cache artifacts.
//!
//! Reports record the MD5 hex digest of the formula file (`file_md5`) and of
//! the artifact (`bdd_md5`). The digest is only used to detect stale caches,
//! not for any security purpose.

use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::Path;

/// Lowercase hex digest of some content.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(data: impl AsRef<[u8]>) -> Self {
        Self(format!("{:x}", md5::compute(data)))
    }

    pub fn of_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = fs::read(path)?;
        Ok(Self::of_bytes(data))
    }

    /// Wraps a digest previously recorded in a report or artifact header.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
