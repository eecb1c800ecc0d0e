//! Capacity-bounded, reference-counted registry of cached copies.
//!
//! Every mutation runs under one registry-wide lock so eviction always sees
//! a consistent byte total. Only entries with no references are evictable,
//! oldest access first. Evicting an entry unlinks its local copy while the
//! lock is held; that unlink is the only filesystem work done under it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use common::Version;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::key::{CacheKey, NamespacedPath};

/// Admission could not be satisfied even after evicting every
/// unreferenced entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cache full: cannot fit {requested} bytes ({used}/{capacity} bytes in use)")]
pub struct CacheFull {
    pub requested: u64,
    pub used: u64,
    pub capacity: u64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Configured capacity in bytes
    pub capacity: u64,
    /// Bytes currently accounted to cached copies
    pub used: u64,
    /// Number of cached copies
    pub entries: usize,
    /// Number of copies with at least one open session
    pub pinned: usize,
}

/// One row of [`CacheRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    /// The un-namespaced path the copy belongs to
    pub path: String,
    pub size: u64,
    pub refs: u32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    size: u64,
    refs: u32,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    used: u64,
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn newest_version(&self, path: &NamespacedPath) -> Option<Version> {
        self.entries
            .keys()
            .filter(|key| key.path() == path)
            .filter_map(CacheKey::version)
            .max()
    }
}

#[derive(Debug)]
pub struct CacheRegistry {
    dir: PathBuf,
    capacity: u64,
    inner: Mutex<Inner>,
}

impl CacheRegistry {
    pub fn new(dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            dir: dir.into(),
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Where the local copy for `key` lives.
    pub fn local_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Insert or update `key` with `size` bytes and `refs` references.
    ///
    /// An existing entry's bytes are released first. Unreferenced entries
    /// are evicted in LRU order until the new total fits; if it cannot fit,
    /// nothing changes.
    pub fn admit(&self, key: &CacheKey, size: u64, refs: u32) -> Result<(), CacheFull> {
        let mut inner = self.inner.lock();
        self.admit_locked(&mut inner, key, size, refs)
    }

    /// Update the tracked size of `key`, keeping its reference count.
    pub fn resize(&self, key: &CacheKey, size: u64) -> Result<(), CacheFull> {
        let mut inner = self.inner.lock();
        let refs = inner.entries.get(key).map(|entry| entry.refs).unwrap_or(1);
        self.admit_locked(&mut inner, key, size, refs)
    }

    /// Mark `key` most recently used. No-op if absent.
    pub fn touch(&self, key: &CacheKey) {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.last_used = tick;
        }
    }

    /// Pin `key` for `delta` more sessions. Returns false if it is not cached.
    pub fn add_reference(&self, key: &CacheKey, delta: u32) -> bool {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.refs += delta;
                entry.last_used = tick;
                true
            }
            None => false,
        }
    }

    /// Unpin `key`. Reaching zero purges superseded versions of its path.
    pub fn release(&self, key: &CacheKey, delta: u32) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(delta);
        if entry.refs == 0 {
            self.purge_locked(&mut inner, key.path());
        }
    }

    /// Move the entry at `old` to `new` with no references, then purge
    /// superseded versions of its path. Returns false if `old` is absent.
    ///
    /// If `new` is already cached it stays as it is, refs included, since
    /// open sessions may be reading it; the copy at `old` is dropped and its
    /// file unlinked instead, and the call returns false.
    pub fn rename(&self, old: &CacheKey, new: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(new) {
            self.discard(&mut inner, old);
            return false;
        }
        let Some(moved) = inner.entries.remove(old) else {
            return false;
        };
        let tick = inner.next_tick();
        inner.entries.insert(
            new.clone(),
            Entry {
                size: moved.size,
                refs: 0,
                last_used: tick,
            },
        );

        self.purge_locked(&mut inner, new.path());
        true
    }

    /// Highest read-only version cached for `path`.
    ///
    /// Older unreferenced versions found along the way are purged.
    pub fn current_version(&self, path: &NamespacedPath) -> Option<Version> {
        let mut inner = self.inner.lock();
        let newest = inner.newest_version(path)?;
        self.purge_locked(&mut inner, path);
        Some(newest)
    }

    /// Remove strictly older, unreferenced read-only versions of `path`.
    pub fn purge_superseded(&self, path: &NamespacedPath) {
        let mut inner = self.inner.lock();
        self.purge_locked(&mut inner, path);
    }

    /// Drop `key` and its local copy regardless of references.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        self.discard(&mut inner, key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn refs(&self, key: &CacheKey) -> Option<u32> {
        self.inner.lock().entries.get(key).map(|entry| entry.refs)
    }

    pub fn size(&self, key: &CacheKey) -> Option<u64> {
        self.inner.lock().entries.get(key).map(|entry| entry.size)
    }

    pub fn used(&self) -> u64 {
        self.inner.lock().used
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            capacity: self.capacity,
            used: inner.used,
            entries: inner.entries.len(),
            pinned: inner.entries.values().filter(|e| e.refs > 0).count(),
        }
    }

    /// Entries from least to most recently used.
    pub fn snapshot(&self) -> Vec<EntryInfo> {
        let inner = self.inner.lock();
        let mut rows: Vec<_> = inner.entries.iter().collect();
        rows.sort_by_key(|(_, entry)| entry.last_used);
        rows.into_iter()
            .map(|(key, entry)| EntryInfo {
                key: key.to_string(),
                path: key.path().original(),
                size: entry.size,
                refs: entry.refs,
            })
            .collect()
    }

    fn admit_locked(
        &self,
        inner: &mut Inner,
        key: &CacheKey,
        size: u64,
        refs: u32,
    ) -> Result<(), CacheFull> {
        let previous = inner.entries.get(key).map(|e| e.size).unwrap_or(0);
        self.make_room(inner, key, previous, size)?;

        let tick = inner.next_tick();
        inner.used = inner.used - previous + size;
        inner.entries.insert(
            key.clone(),
            Entry {
                size,
                refs,
                last_used: tick,
            },
        );
        Ok(())
    }

    /// Evict unreferenced entries other than `keep` until swapping
    /// `previous` bytes for `size` bytes fits. Evicts nothing on failure.
    fn make_room(
        &self,
        inner: &mut Inner,
        keep: &CacheKey,
        previous: u64,
        size: u64,
    ) -> Result<(), CacheFull> {
        let projected = inner.used - previous + size;
        if projected <= self.capacity {
            return Ok(());
        }

        let mut candidates: Vec<(u64, &CacheKey, u64)> = inner
            .entries
            .iter()
            .filter(|(key, entry)| entry.refs == 0 && *key != keep)
            .map(|(key, entry)| (entry.last_used, key, entry.size))
            .collect();
        candidates.sort_by_key(|(last_used, _, _)| *last_used);

        let mut excess = projected - self.capacity;
        let mut victims = Vec::new();
        for (_, key, bytes) in candidates {
            if excess == 0 {
                break;
            }
            excess = excess.saturating_sub(bytes);
            victims.push(key.clone());
        }

        if excess > 0 {
            return Err(CacheFull {
                requested: size,
                used: inner.used,
                capacity: self.capacity,
            });
        }

        for victim in victims {
            tracing::info!("evicting {} from cache", victim);
            self.discard(inner, &victim);
        }
        Ok(())
    }

    /// Remove strictly older, unreferenced read-only versions of `path`.
    fn purge_locked(&self, inner: &mut Inner, path: &NamespacedPath) {
        let Some(newest) = inner.newest_version(path) else {
            return;
        };
        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(key, entry)| {
                entry.refs == 0
                    && key.path() == path
                    && key.version().is_some_and(|version| version < newest)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            tracing::debug!("purging superseded copy {}", key);
            self.discard(inner, &key);
        }
    }

    fn discard(&self, inner: &mut Inner, key: &CacheKey) -> bool {
        let Some(entry) = inner.entries.remove(key) else {
            return false;
        };
        inner.used -= entry.size;

        let path = self.local_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove cached copy {}: {}", path.display(), e),
        }
        true
    }
}
