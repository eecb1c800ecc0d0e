//! Filesystem-call surface backed by a remote store.
//!
//! # Architecture
//!
//! - `descriptors`: integer descriptors bound to local copies
//! - `inflight`: per-key guards so a version is materialized once
//! - `error`: failures and their errno mapping
//!
//! Every `open` checks the cached version against the store, reusing the
//! local copy when it is still current. Reads, writes and seeks only touch
//! the local copy. A write session becomes visible to others when `close`
//! ships the copy back and the store commits a new version.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    ErrorKind, FileSnapshot, OpenIntent, OpenReply, RemoteError, RemoteStore, Version,
    MAX_TRANSFER_SIZE,
};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::{CacheKey, CacheRegistry, CacheStats, NamespacedPath};

mod descriptors;
mod error;
mod inflight;

pub use descriptors::{Descriptor, DescriptorTable, Fd, Handle, Reservation, FIRST_FD};
pub use error::ProxyError;
use inflight::KeyLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Whence {
    Set,
    Current,
    End,
}

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub cache_dir: PathBuf,
    pub cache_capacity: u64,
    pub max_open_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStats {
    pub cache: CacheStats,
    pub open_descriptors: usize,
}

pub struct Proxy {
    store: Arc<dyn RemoteStore>,
    cache: CacheRegistry,
    descriptors: DescriptorTable,
    materializing: KeyLocks,
}

impl Proxy {
    /// Build a proxy over `store`. The cache directory is created if needed
    /// and emptied, since cached copies never outlive the process.
    pub async fn new(
        store: Arc<dyn RemoteStore>,
        options: ProxyOptions,
    ) -> Result<Self, std::io::Error> {
        reset_cache_dir(&options.cache_dir).await?;
        tracing::info!(
            "proxy cache at {} ({} bytes, {} descriptors)",
            options.cache_dir.display(),
            options.cache_capacity,
            options.max_open_files
        );

        Ok(Self {
            store,
            cache: CacheRegistry::new(options.cache_dir, options.cache_capacity),
            descriptors: DescriptorTable::new(options.max_open_files),
            materializing: KeyLocks::new(),
        })
    }

    pub fn cache(&self) -> &CacheRegistry {
        &self.cache
    }

    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            cache: self.cache.stats(),
            open_descriptors: self.descriptors.len(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn open(&self, path: &str, intent: OpenIntent) -> Result<Fd, ProxyError> {
        self.descriptors.check_capacity()?;

        let ns = NamespacedPath::new(path);
        let known = self.cache.current_version(&ns).unwrap_or(Version::NONE);
        let reply = self.store.open(path, intent, known).await?;
        check_reply(&reply, intent)?;

        let reservation = self.descriptors.reserve()?;
        let fd = reservation.fd();
        let handle = match intent {
            OpenIntent::Read if reply.is_dir => Handle::Directory,
            OpenIntent::Read => self.open_read(path, &ns, known, reply.snapshot).await?,
            OpenIntent::CreateExclusive => self.open_created(&ns, fd, reply.snapshot).await?,
            OpenIntent::Create | OpenIntent::Write => {
                self.open_write(path, &ns, fd, intent, known, reply.snapshot)
                    .await?
            }
        };

        reservation.install(path, handle);
        tracing::debug!("opened {} as fd {}", path, fd);
        Ok(fd)
    }

    /// Read up to `buf.len()` bytes at the current position.
    pub async fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, ProxyError> {
        let descriptor = self.descriptor(fd)?;
        let (key, file) = file_handle(&descriptor)?;
        self.ensure_local(key).await?;

        let mut file = file.lock().await;
        let filled = read_full(&mut *file, buf).await?;
        self.cache.touch(key);
        Ok(filled)
    }

    /// Write all of `data` at the current position.
    ///
    /// Growth is admitted to the registry before any byte is written, so a
    /// full cache leaves the copy untouched.
    pub async fn write(&self, fd: Fd, data: &[u8]) -> Result<usize, ProxyError> {
        let descriptor = self.descriptor(fd)?;
        let (key, file) = file_handle(&descriptor)?;
        if key.is_read_only() {
            return Err(ErrorKind::BadDescriptor.into());
        }
        self.ensure_local(key).await?;

        let mut file = file.lock().await;
        let end = file.stream_position().await? + data.len() as u64;
        let len = file.metadata().await?.len();
        if end > len {
            self.cache.resize(key, end)?;
        }
        file.write_all(data).await?;
        file.flush().await?;
        self.cache.touch(key);
        Ok(data.len())
    }

    pub async fn lseek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, ProxyError> {
        if offset < 0 {
            return Err(ErrorKind::InvalidArgument.into());
        }
        let descriptor = self.descriptor(fd)?;
        let (key, file) = file_handle(&descriptor)?;
        self.ensure_local(key).await?;

        let mut file = file.lock().await;
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => file.stream_position().await?,
            Whence::End => file.metadata().await?.len(),
        };
        let target = base
            .checked_add(offset as u64)
            .ok_or(ErrorKind::InvalidArgument)?;
        let position = file.seek(SeekFrom::Start(target)).await?;
        self.cache.touch(key);
        Ok(position)
    }

    /// End a session. Write sessions are shipped to the store first; the
    /// descriptor is released whether or not that succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, fd: Fd) -> Result<(), ProxyError> {
        let descriptor = self
            .descriptors
            .remove(fd)
            .ok_or(ErrorKind::BadDescriptor)?;

        let Handle::File { key, file } = &descriptor.handle else {
            return Ok(());
        };
        if key.is_read_only() {
            self.cache.release(key, 1);
            return Ok(());
        }

        match self.write_back(&descriptor.path, key, file).await {
            Ok(version) => {
                tracing::info!("committed {} at version {}", descriptor.path, version);
                Ok(())
            }
            Err(e) => {
                tracing::error!("write-back of {} failed: {}", descriptor.path, e);
                self.cache.remove(key);
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn unlink(&self, path: &str) -> Result<(), ProxyError> {
        self.store.unlink(path).await?;
        Ok(())
    }

    fn descriptor(&self, fd: Fd) -> Result<Arc<Descriptor>, ProxyError> {
        self.descriptors
            .get(fd)
            .ok_or(ProxyError::Fs(ErrorKind::BadDescriptor))
    }

    async fn ensure_local(&self, key: &CacheKey) -> Result<(), ProxyError> {
        if !fs::try_exists(self.cache.local_path(key)).await? {
            return Err(ErrorKind::NotFound.into());
        }
        Ok(())
    }

    async fn open_read(
        &self,
        path: &str,
        ns: &NamespacedPath,
        known: Version,
        snapshot: Option<FileSnapshot>,
    ) -> Result<Handle, ProxyError> {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                let key = CacheKey::read_only(ns.clone(), known);
                let guard = self.materializing.lock(&key).await;
                if self.cache.add_reference(&key, 1) {
                    return self.open_pinned(key).await;
                }
                drop(guard);
                // Evicted after the version lookup.
                self.refetch(path, OpenIntent::Read).await?
            }
        };

        let key = CacheKey::read_only(ns.clone(), snapshot.version);
        let _guard = self.materializing.lock(&key).await;
        if self.cache.add_reference(&key, 1) {
            return self.open_pinned(key).await;
        }

        self.cache.admit(&key, snapshot.total_len, 1)?;
        if let Err(e) = self.fill(&self.cache.local_path(&key), path, snapshot).await {
            self.cache.remove(&key);
            return Err(e);
        }
        self.cache.purge_superseded(ns);
        self.open_pinned(key).await
    }

    /// A brand-new empty copy for an exclusive create.
    async fn open_created(
        &self,
        ns: &NamespacedPath,
        fd: Fd,
        snapshot: Option<FileSnapshot>,
    ) -> Result<Handle, ProxyError> {
        let base = snapshot.map(|s| s.version).unwrap_or(Version::NONE);
        let key = CacheKey::write_in_progress(ns.clone(), fd, base);
        self.cache.admit(&key, 0, 1)?;
        if let Err(e) = File::create(self.cache.local_path(&key)).await {
            self.cache.remove(&key);
            return Err(e.into());
        }
        self.open_writable(key).await
    }

    async fn open_write(
        &self,
        path: &str,
        ns: &NamespacedPath,
        fd: Fd,
        intent: OpenIntent,
        known: Version,
        snapshot: Option<FileSnapshot>,
    ) -> Result<Handle, ProxyError> {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => match self.copy_cached(ns, fd, known).await? {
                Some(handle) => return Ok(handle),
                None => self.refetch(path, intent).await?,
            },
        };

        let key = CacheKey::write_in_progress(ns.clone(), fd, snapshot.version);
        self.cache.admit(&key, snapshot.total_len, 1)?;
        if let Err(e) = self.fill(&self.cache.local_path(&key), path, snapshot).await {
            self.cache.remove(&key);
            return Err(e);
        }
        self.open_writable(key).await
    }

    /// Start a write session from the cached read-only copy at `version`.
    /// `None` if that copy is no longer cached.
    async fn copy_cached(
        &self,
        ns: &NamespacedPath,
        fd: Fd,
        version: Version,
    ) -> Result<Option<Handle>, ProxyError> {
        let source = CacheKey::read_only(ns.clone(), version);
        {
            let _guard = self.materializing.lock(&source).await;
            if !self.cache.add_reference(&source, 1) {
                return Ok(None);
            }
        }

        let copied = self.copy_pinned(&source, ns, fd, version).await;
        self.cache.release(&source, 1);
        copied.map(Some)
    }

    async fn copy_pinned(
        &self,
        source: &CacheKey,
        ns: &NamespacedPath,
        fd: Fd,
        version: Version,
    ) -> Result<Handle, ProxyError> {
        let from = self.cache.local_path(source);
        let size = fs::metadata(&from).await?.len();

        let key = CacheKey::write_in_progress(ns.clone(), fd, version);
        self.cache.admit(&key, size, 1)?;
        if let Err(e) = fs::copy(&from, self.cache.local_path(&key)).await {
            self.cache.remove(&key);
            return Err(e.into());
        }
        self.open_writable(key).await
    }

    /// Ask again without claiming any cached version.
    async fn refetch(&self, path: &str, intent: OpenIntent) -> Result<FileSnapshot, ProxyError> {
        let reply = self.store.open(path, intent, Version::NONE).await?;
        check_reply(&reply, intent)?;
        reply
            .snapshot
            .ok_or_else(|| RemoteError::io(format!("{path}: no content in open reply")).into())
    }

    /// Open an already-pinned read-only copy, unpinning it on failure.
    async fn open_pinned(&self, key: CacheKey) -> Result<Handle, ProxyError> {
        match File::open(self.cache.local_path(&key)).await {
            Ok(file) => Ok(Handle::File {
                key,
                file: Mutex::new(file),
            }),
            Err(e) => {
                self.cache.release(&key, 1);
                Err(e.into())
            }
        }
    }

    async fn open_writable(&self, key: CacheKey) -> Result<Handle, ProxyError> {
        let opened = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.cache.local_path(&key))
            .await;
        match opened {
            Ok(file) => Ok(Handle::File {
                key,
                file: Mutex::new(file),
            }),
            Err(e) => {
                self.cache.remove(&key);
                Err(e.into())
            }
        }
    }

    /// Write `snapshot` to `local`, pulling continuation chunks until the
    /// advertised length is reached.
    async fn fill(
        &self,
        local: &Path,
        path: &str,
        snapshot: FileSnapshot,
    ) -> Result<(), ProxyError> {
        let mut file = File::create(local).await?;
        file.write_all(&snapshot.data).await?;

        let mut offset = snapshot.data.len() as u64;
        while offset < snapshot.total_len {
            let chunk = self.store.read(path, offset).await?;
            if chunk.data.is_empty() || chunk.next_offset <= offset {
                return Err(RemoteError::io(format!(
                    "{path}: short read at {offset} of {}",
                    snapshot.total_len
                ))
                .into());
            }
            file.write_all(&chunk.data).await?;
            offset = chunk.next_offset;
        }
        file.flush().await?;
        Ok(())
    }

    /// Ship a write session's copy to the store and re-key it under the
    /// version the store committed.
    async fn write_back(
        &self,
        path: &str,
        key: &CacheKey,
        file: &Mutex<File>,
    ) -> Result<Version, ProxyError> {
        file.lock().await.flush().await?;

        let local = self.cache.local_path(key);
        let len = fs::metadata(&local).await?.len();
        let version = if len <= MAX_TRANSFER_SIZE as u64 {
            let data = fs::read(&local).await?;
            self.store.close(path, data).await?
        } else {
            self.upload_chunked(path, &local).await?
        };

        let committed = CacheKey::read_only(key.path().clone(), version);
        let _guard = self.materializing.lock(&committed).await;
        if self.cache.contains(&committed) {
            // Another session already pulled this version from the store.
            self.cache.remove(key);
        } else {
            fs::rename(&local, self.cache.local_path(&committed)).await?;
            self.cache.rename(key, &committed);
        }
        Ok(version)
    }

    /// Stream `local` to a staging upload in bounded chunks, then have the
    /// store swap it in.
    async fn upload_chunked(&self, path: &str, local: &Path) -> Result<Version, ProxyError> {
        let upload_id = Uuid::new_v4().simple().to_string();
        let mut file = File::open(local).await?;
        let mut buf = vec![0u8; MAX_TRANSFER_SIZE];

        let mut offset = 0;
        let mut chunks = 0;
        loop {
            let n = read_full(&mut file, &mut buf).await?;
            if n == 0 {
                break;
            }
            offset = self.store.write(&upload_id, offset, &buf[..n]).await?;
            chunks += 1;
        }
        tracing::debug!("uploaded {} bytes of {} in {} chunks", offset, path, chunks);

        Ok(self.store.finalize(&upload_id, path).await?)
    }
}

fn check_reply(reply: &OpenReply, intent: OpenIntent) -> Result<(), ProxyError> {
    if !reply.exists && !intent.creates() {
        return Err(ErrorKind::NotFound.into());
    }
    if reply.exists && intent == OpenIntent::CreateExclusive {
        return Err(ErrorKind::AlreadyExists.into());
    }
    if reply.is_dir && intent != OpenIntent::Read {
        return Err(ErrorKind::IsDirectory.into());
    }
    if let Some(err) = &reply.error {
        return Err(err.clone().into());
    }
    Ok(())
}

fn file_handle(descriptor: &Descriptor) -> Result<(&CacheKey, &Mutex<File>), ProxyError> {
    match &descriptor.handle {
        Handle::Directory => Err(ErrorKind::IsDirectory.into()),
        Handle::File { key, file } => Ok((key, file)),
    }
}

/// Fill `buf` unless end of file comes first.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn reset_cache_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(entry.path()).await?;
        } else {
            fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
