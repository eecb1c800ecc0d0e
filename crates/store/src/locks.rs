//! Per-path reader/writer locks.
//!
//! Each canonical path gets one [`PathEntry`], created on first access and
//! dropped when the path is unlinked. Creation goes through the map's entry
//! API, so concurrent first accesses agree on a single instance without a
//! separate map-wide lock.

use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::versions::Stamp;

#[derive(Debug, Default)]
pub struct PathEntry {
    lock: Arc<RwLock<()>>,
    stamp: Mutex<Option<Stamp>>,
}

impl PathEntry {
    pub fn stamp(&self) -> Option<Stamp> {
        *self.stamp.lock()
    }

    pub fn set_stamp(&self, stamp: Stamp) {
        *self.stamp.lock() = Some(stamp);
    }

    /// Return the stamp if `keep` accepts it, otherwise install `fresh()`.
    pub fn stamp_or_refresh(
        &self,
        keep: impl FnOnce(&Stamp) -> bool,
        fresh: impl FnOnce() -> Stamp,
    ) -> Stamp {
        let mut slot = self.stamp.lock();
        match *slot {
            Some(stamp) if keep(&stamp) => stamp,
            _ => {
                let stamp = fresh();
                *slot = Some(stamp);
                stamp
            }
        }
    }
}

/// Shared access to a path; other readers may hold it concurrently.
pub struct ReadAccess {
    entry: Arc<PathEntry>,
    _guard: OwnedRwLockReadGuard<()>,
}

impl Deref for ReadAccess {
    type Target = PathEntry;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

/// Exclusive access to a path.
pub struct WriteAccess {
    entry: Arc<PathEntry>,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl Deref for WriteAccess {
    type Target = PathEntry;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

#[derive(Debug, Default)]
pub struct PathTable {
    entries: DashMap<String, Arc<PathEntry>>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic get-or-create of the entry for `key`.
    pub fn entry(&self, key: &str) -> Arc<PathEntry> {
        if let Some(entry) = self.entries.get(key) {
            return entry.clone();
        }
        self.entries.entry(key.to_string()).or_default().clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<PathEntry>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget `key`. The next access lazily creates a fresh entry.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Take the read lock for `key`.
    ///
    /// If the entry was unlinked while we waited, the lock we got belongs to
    /// a retired instance; retry against the current one.
    pub async fn read(&self, key: &str) -> ReadAccess {
        loop {
            let entry = self.entry(key);
            let guard = entry.lock.clone().read_owned().await;
            if self.is_current(key, &entry) {
                return ReadAccess {
                    entry,
                    _guard: guard,
                };
            }
        }
    }

    /// Take the write lock for `key`, with the same retry rule as [`Self::read`].
    pub async fn write(&self, key: &str) -> WriteAccess {
        loop {
            let entry = self.entry(key);
            let guard = entry.lock.clone().write_owned().await;
            if self.is_current(key, &entry) {
                return WriteAccess {
                    entry,
                    _guard: guard,
                };
            }
        }
    }

    fn is_current(&self, key: &str, entry: &Arc<PathEntry>) -> bool {
        self.entries
            .get(key)
            .map(|current| Arc::ptr_eq(&current, entry))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::Version;

    use super::*;

    #[test]
    fn test_entry_is_shared() {
        let table = PathTable::new();
        let a = table.entry("a/b.txt");
        let b = table.entry("a/b.txt");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_recreates_lazily() {
        let table = PathTable::new();
        let first = table.entry("x");
        table.remove("x");
        assert!(!table.contains("x"));
        let second = table.entry("x");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_stamp_or_refresh() {
        let entry = PathEntry::default();
        let fresh = Stamp {
            version: Version(5),
            modified: None,
            len: 1,
        };
        assert_eq!(entry.stamp_or_refresh(|_| true, || fresh), fresh);

        let newer = Stamp {
            version: Version(6),
            ..fresh
        };
        assert_eq!(entry.stamp_or_refresh(|_| true, || newer), fresh);
        assert_eq!(entry.stamp_or_refresh(|_| false, || newer), newer);
        assert_eq!(entry.stamp(), Some(newer));
    }

    #[tokio::test]
    async fn test_readers_share_writers_exclude() {
        let table = Arc::new(PathTable::new());
        let r1 = table.read("p").await;
        let r2 = table.read("p").await;

        let writer = {
            let table = table.clone();
            tokio::spawn(async move {
                let _w = table.write("p").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        drop(r1);
        drop(r2);
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_waiter_moves_to_fresh_entry_after_remove() {
        let table = Arc::new(PathTable::new());
        let held = table.write("p").await;

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move {
                let access = table.read("p").await;
                access.stamp()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        held.set_stamp(Stamp {
            version: Version(9),
            modified: None,
            len: 0,
        });
        table.remove("p");
        drop(held);

        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, None);
    }
}
