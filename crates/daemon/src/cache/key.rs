//! Cache keys and path namespacing.
//!
//! Every cached copy lives as one file in a flat cache directory, named
//! after its key:
//!
//! - `<namespaced-path>_r<version>` for a committed read-only copy
//! - `<namespaced-path>_w<fd>_w<base-version>` for a write-in-progress copy
//!
//! Namespacing percent-escapes `/`, `%` and `_`, so the encoded path never
//! contains the separator and two distinct paths never share a prefix.
//!
//! Escaping can blow a path up to several times its length, so a key whose
//! name would not fit in one directory entry is stored under the blake3
//! digest of its namespaced path instead, followed by the same suffix.
//! Encoded paths always start with `%2F`, so digest names never collide
//! with plain ones.

use std::fmt;

use common::Version;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::proxy::Fd;

/// Longest file name we hand to the filesystem; NAME_MAX is 255 bytes on
/// every platform we run on.
const MAX_FILE_NAME: usize = 200;

const ESCAPED: &AsciiSet = &CONTROLS.add(b'/').add(b'%').add(b'_');

/// A path in its flat, file-name-safe form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedPath(String);

impl NamespacedPath {
    /// Normalize `path` to a rooted form without a trailing slash, then
    /// escape it.
    pub fn new(path: &str) -> Self {
        Self(utf8_percent_encode(&normalize(path), ESCAPED).to_string())
    }

    /// The normalized path this was built from.
    pub fn original(&self) -> String {
        percent_decode_str(&self.0).decode_utf8_lossy().into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespacedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse repeated separators and drop a trailing one; always rooted.
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ReadOnly {
        path: NamespacedPath,
        version: Version,
    },
    WriteInProgress {
        path: NamespacedPath,
        fd: Fd,
        base: Version,
    },
}

impl CacheKey {
    pub fn read_only(path: NamespacedPath, version: Version) -> Self {
        CacheKey::ReadOnly { path, version }
    }

    pub fn write_in_progress(path: NamespacedPath, fd: Fd, base: Version) -> Self {
        CacheKey::WriteInProgress { path, fd, base }
    }

    pub fn path(&self) -> &NamespacedPath {
        match self {
            CacheKey::ReadOnly { path, .. } | CacheKey::WriteInProgress { path, .. } => path,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, CacheKey::ReadOnly { .. })
    }

    /// The committed version of a read-only copy.
    pub fn version(&self) -> Option<Version> {
        match self {
            CacheKey::ReadOnly { version, .. } => Some(*version),
            CacheKey::WriteInProgress { .. } => None,
        }
    }

    /// Name of the local copy inside the cache directory.
    pub fn file_name(&self) -> String {
        let name = self.to_string();
        if name.len() <= MAX_FILE_NAME {
            return name;
        }
        let digest = blake3::hash(self.path().as_str().as_bytes());
        format!("{}_{}", digest.to_hex(), self.suffix())
    }

    fn suffix(&self) -> String {
        match self {
            CacheKey::ReadOnly { version, .. } => format!("r{version}"),
            CacheKey::WriteInProgress { fd, base, .. } => format!("w{fd}_w{base}"),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.path(), self.suffix())
    }
}
