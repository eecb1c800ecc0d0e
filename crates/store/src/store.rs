//! Store - the authoritative file store behind the proxies.
//!
//! Reads (`open`, `read`) take the path's read lock, so many sessions can
//! fetch the same file at once. Anything that changes a canonical file
//! (`close`, `finalize`, `unlink`, creation on open) takes the write lock.
//! Chunked uploads are written to a staging copy with no lock held and only
//! swapped in at finalize, so readers never observe a partial write.

use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use common::{
    ChunkReply, ErrorKind, FileSnapshot, OpenIntent, OpenReply, RemoteError, RemoteStore,
    Version, MAX_TRANSFER_SIZE,
};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::locks::{PathEntry, PathTable};
use crate::versions::{Stamp, VersionClock};

/// A request path after sandboxing: its lock key and on-disk location.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolved {
    key: String,
    path: PathBuf,
}

#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    staging: PathBuf,
    paths: PathTable,
    clock: VersionClock,
}

impl Store {
    /// Open a store over `config.root`, creating the directories if needed.
    ///
    /// Upload sessions do not survive a restart, so anything left in the
    /// staging directory is deleted.
    pub async fn new(config: StoreConfig) -> Result<Self> {
        prepare_dir(&config.root).await?;
        prepare_dir(&config.staging).await?;
        let swept = sweep_staging(&config.staging).await;

        info!(swept, root = %config.root.display(), staging = %config.staging.display(), "store ready");

        Ok(Self {
            root: config.root,
            staging: config.staging,
            paths: PathTable::new(),
            clock: VersionClock::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    /// Resolve `path` lexically against the root.
    ///
    /// `..` may walk back up inside the tree but never above the root.
    fn resolve(&self, path: &str) -> std::result::Result<Resolved, RemoteError> {
        let mut parts: Vec<String> = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(RemoteError::new(
                            ErrorKind::PermissionDenied,
                            format!("{path} escapes the store root"),
                        ));
                    }
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        let key = parts.join("/");
        let path = if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&key)
        };
        Ok(Resolved { key, path })
    }

    /// Location of the staged copy for `upload_id`, which must be a single
    /// plain file name.
    fn staged(&self, upload_id: &str) -> std::result::Result<PathBuf, RemoteError> {
        let mut components = Path::new(upload_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.staging.join(name)),
            _ => Err(RemoteError::new(
                ErrorKind::InvalidArgument,
                format!("invalid upload id {upload_id:?}"),
            )),
        }
    }

    /// Version of the file as it is on disk now. Reuses the recorded stamp
    /// unless the file changed underneath it.
    fn observe(&self, entry: &PathEntry, meta: &Metadata) -> Version {
        let modified = meta.modified().ok();
        let len = meta.len();
        entry
            .stamp_or_refresh(
                |stamp| stamp.matches(modified, len),
                || Stamp {
                    version: self.clock.issue(),
                    modified,
                    len,
                },
            )
            .version
    }

    /// Record a fresh version for content just written under the write lock.
    fn commit(&self, entry: &PathEntry, meta: &Metadata) -> Version {
        let stamp = Stamp {
            version: self.clock.issue(),
            modified: meta.modified().ok(),
            len: meta.len(),
        };
        entry.set_stamp(stamp);
        stamp.version
    }

    /// Create an empty file for a create-intent open.
    ///
    /// Returns `None` if another session created the file first.
    async fn create_empty(
        &self,
        resolved: &Resolved,
    ) -> std::result::Result<Option<FileSnapshot>, RemoteError> {
        let access = self.paths.write(&resolved.key).await;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved.path)
            .await
        {
            Ok(file) => {
                drop(file);
                let meta = fs::metadata(&resolved.path).await?;
                let version = self.commit(&access, &meta);
                info!(path = %resolved.key, %version, "created empty file");
                Ok(Some(FileSnapshot {
                    version,
                    total_len: 0,
                    data: Vec::new(),
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Answer an open for a path that exists. Caller holds the read lock.
    async fn inspect(
        &self,
        entry: &PathEntry,
        resolved: &Resolved,
        meta: &Metadata,
        intent: OpenIntent,
        known: Version,
    ) -> OpenReply {
        if intent == OpenIntent::CreateExclusive {
            return OpenReply::failed(
                true,
                RemoteError::new(ErrorKind::AlreadyExists, resolved.key.clone()),
            );
        }
        if meta.is_dir() {
            return OpenReply::directory();
        }
        if intent.writes() && meta.permissions().readonly() {
            return OpenReply::failed(
                true,
                RemoteError::new(ErrorKind::AccessDenied, resolved.key.clone()),
            );
        }

        let version = self.observe(entry, meta);
        if version == known {
            debug!(path = %resolved.key, %version, "cached copy is current");
            return OpenReply::unchanged();
        }

        match read_chunk(&resolved.path, 0).await {
            Ok(data) => {
                debug!(
                    path = %resolved.key,
                    %version,
                    %known,
                    total_len = meta.len(),
                    inline = data.len(),
                    "sending new version"
                );
                OpenReply::changed(FileSnapshot {
                    version,
                    total_len: meta.len(),
                    data,
                })
            }
            Err(err) => OpenReply::failed(true, err.into()),
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for Store {
    async fn open(
        &self,
        path: &str,
        intent: OpenIntent,
        known: Version,
    ) -> std::result::Result<OpenReply, RemoteError> {
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(err) => return Ok(OpenReply::failed(false, err)),
        };

        loop {
            {
                let access = self.paths.read(&resolved.key).await;
                match fs::metadata(&resolved.path).await {
                    Ok(meta) => {
                        return Ok(self
                            .inspect(&access, &resolved, &meta, intent, known)
                            .await)
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        if !intent.creates() {
                            debug!(path = %resolved.key, ?intent, "no such file");
                            return Ok(OpenReply::missing());
                        }
                    }
                    Err(err) => return Ok(OpenReply::failed(false, err.into())),
                }
            }

            match self.create_empty(&resolved).await {
                Ok(Some(snapshot)) => {
                    return Ok(OpenReply {
                        exists: false,
                        is_dir: false,
                        error: None,
                        snapshot: Some(snapshot),
                    })
                }
                // Lost the creation race; inspect what the winner made.
                Ok(None) => continue,
                Err(err) => return Ok(OpenReply::failed(false, err)),
            }
        }
    }

    async fn read(&self, path: &str, offset: u64) -> std::result::Result<ChunkReply, RemoteError> {
        let resolved = self.resolve(path)?;
        let _access = self.paths.read(&resolved.key).await;

        let meta = fs::metadata(&resolved.path).await?;
        if meta.is_dir() {
            return Err(RemoteError::is_directory(&resolved.key));
        }

        let data = read_chunk(&resolved.path, offset).await?;
        debug!(path = %resolved.key, offset, size = data.len(), "served chunk");
        Ok(ChunkReply {
            next_offset: offset + data.len() as u64,
            data,
        })
    }

    async fn write(
        &self,
        upload_id: &str,
        offset: u64,
        data: &[u8],
    ) -> std::result::Result<u64, RemoteError> {
        let staged = self.staged(upload_id)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(offset == 0)
            .open(&staged)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!(upload_id, offset, size = data.len(), "staged chunk");
        Ok(offset + data.len() as u64)
    }

    async fn close(&self, path: &str, data: Vec<u8>) -> std::result::Result<Version, RemoteError> {
        let resolved = self.resolve(path)?;
        let access = self.paths.write(&resolved.key).await;

        if fs::metadata(&resolved.path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(RemoteError::is_directory(&resolved.key));
        }

        fs::write(&resolved.path, &data).await?;
        let meta = fs::metadata(&resolved.path).await?;
        let version = self.commit(&access, &meta);

        info!(path = %resolved.key, len = data.len(), %version, "committed write-back");
        Ok(version)
    }

    async fn finalize(
        &self,
        upload_id: &str,
        path: &str,
    ) -> std::result::Result<Version, RemoteError> {
        let staged = self.staged(upload_id)?;
        let resolved = self.resolve(path)?;
        let access = self.paths.write(&resolved.key).await;

        if !fs::try_exists(&staged).await? {
            return Err(RemoteError::not_found(upload_id));
        }

        let copied = fs::copy(&staged, &resolved.path).await?;
        if let Err(err) = fs::remove_file(&staged).await {
            warn!(upload_id, error = %err, "failed to remove staged upload");
        }

        let meta = fs::metadata(&resolved.path).await?;
        let version = self.commit(&access, &meta);

        info!(path = %resolved.key, len = copied, %version, "committed chunked write-back");
        Ok(version)
    }

    async fn unlink(&self, path: &str) -> std::result::Result<(), RemoteError> {
        let resolved = self.resolve(path)?;
        let _access = self.paths.write(&resolved.key).await;

        let meta = fs::metadata(&resolved.path).await?;
        if meta.is_dir() {
            return Err(RemoteError::is_directory(&resolved.key));
        }

        fs::remove_file(&resolved.path).await?;
        self.paths.remove(&resolved.key);

        info!(path = %resolved.key, "unlinked");
        Ok(())
    }
}

async fn prepare_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| StoreError::Directory {
            path: path.to_path_buf(),
            source,
        })?;
    let meta = fs::metadata(path)
        .await
        .map_err(|source| StoreError::Directory {
            path: path.to_path_buf(),
            source,
        })?;
    if !meta.is_dir() {
        return Err(StoreError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Remove every entry in `staging`, returning how many went away.
async fn sweep_staging(staging: &Path) -> usize {
    let mut entries = match fs::read_dir(staging).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(staging = %staging.display(), error = %err, "failed to list staging directory");
            return 0;
        }
    };
    let mut swept = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!(staging = %staging.display(), error = %err, "failed to list staging directory");
                break;
            }
        };
        let path = entry.path();
        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path).await,
            _ => fs::remove_file(&path).await,
        };
        match removed {
            Ok(()) => swept += 1,
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove stale staged upload"),
        }
    }
    swept
}

/// Read at most one transfer's worth of `path` starting at `offset`.
async fn read_chunk(path: &Path, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut data = Vec::new();
    file.take(MAX_TRANSFER_SIZE as u64)
        .read_to_end(&mut data)
        .await?;
    Ok(data)
}
