//! Transfer envelopes and the remote store contract.
//!
//! The proxy validates its cached copies against the store on every open
//! (check-on-use). An open carries the version the proxy already holds; the
//! store answers with metadata only when that version is still current, and
//! with a [`FileSnapshot`] (new version + leading chunk) when it is not.
//! Content beyond [`MAX_TRANSFER_SIZE`] is fetched with follow-up reads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::error::RemoteError;

/// Largest payload carried by a single transfer, inline or chunked.
pub const MAX_TRANSFER_SIZE: usize = 409_600;

/// Opaque, per-path, monotonically non-decreasing marker of a committed state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// "Nothing cached" - older than every version the store hands out.
    pub const NONE: Version = Version(0);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// What the caller intends to do with the file it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenIntent {
    /// Open for writing, creating the file if it is absent.
    Create,
    /// Create a new file; fail if it already exists.
    CreateExclusive,
    /// Open an existing file (or directory) read-only.
    Read,
    /// Open an existing file for writing.
    Write,
}

impl OpenIntent {
    pub fn creates(&self) -> bool {
        matches!(self, OpenIntent::Create | OpenIntent::CreateExclusive)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, OpenIntent::Read)
    }
}

/// A committed state of a file: version, full length and the leading chunk.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub version: Version,
    pub total_len: u64,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

/// Metadata envelope returned by [`RemoteStore::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReply {
    pub exists: bool,
    pub is_dir: bool,
    pub error: Option<RemoteError>,
    /// Present only if the caller's known version is absent or stale.
    pub snapshot: Option<FileSnapshot>,
}

impl OpenReply {
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_dir: false,
            error: None,
            snapshot: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            exists: true,
            is_dir: true,
            error: None,
            snapshot: None,
        }
    }

    pub fn unchanged() -> Self {
        Self {
            exists: true,
            is_dir: false,
            error: None,
            snapshot: None,
        }
    }

    pub fn changed(snapshot: FileSnapshot) -> Self {
        Self {
            exists: true,
            is_dir: false,
            error: None,
            snapshot: Some(snapshot),
        }
    }

    pub fn failed(exists: bool, error: RemoteError) -> Self {
        Self {
            exists,
            is_dir: false,
            error: Some(error),
            snapshot: None,
        }
    }
}

/// Continuation chunk returned by [`RemoteStore::read`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReply {
    pub next_offset: u64,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

impl ChunkReply {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// The calls a proxy makes against the authoritative store.
///
/// Implementations never panic across this boundary: every failure is a
/// [`RemoteError`], and store-side open failures travel inside the
/// [`OpenReply`] envelope.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inspect `path` for `intent`, returning content only if `known` is stale.
    async fn open(
        &self,
        path: &str,
        intent: OpenIntent,
        known: Version,
    ) -> Result<OpenReply, RemoteError>;

    /// Fetch up to [`MAX_TRANSFER_SIZE`] bytes of `path` starting at `offset`.
    async fn read(&self, path: &str, offset: u64) -> Result<ChunkReply, RemoteError>;

    /// Write a chunk of a staged upload; returns the offset after the chunk.
    async fn write(&self, upload_id: &str, offset: u64, data: &[u8]) -> Result<u64, RemoteError>;

    /// Replace `path` with `data` in one call; returns the new version.
    async fn close(&self, path: &str, data: Vec<u8>) -> Result<Version, RemoteError>;

    /// Swap a completed staged upload in for `path`; returns the new version.
    async fn finalize(&self, upload_id: &str, path: &str) -> Result<Version, RemoteError>;

    async fn unlink(&self, path: &str) -> Result<(), RemoteError>;
}
