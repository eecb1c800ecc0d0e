//! Per-key serialization of materialization.
//!
//! Two sessions opening the same uncached version must not both download
//! it, and neither may reuse a copy the other is still writing. Whoever
//! holds a key's guard is the only one allowed to look up, admit or fill
//! that key's local copy.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::cache::CacheKey;

#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &CacheKey) -> KeyGuard<'_> {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // A waiter that already cloned the lock keeps the count above one,
        // and cloning happens under the same shard lock as this check.
        self.locks
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::Version;

    use super::*;
    use crate::cache::NamespacedPath;

    fn key() -> CacheKey {
        CacheKey::read_only(NamespacedPath::new("/k"), Version(1))
    }

    #[tokio::test]
    async fn test_entries_are_dropped_when_idle() {
        let locks = KeyLocks::new();
        {
            let _guard = locks.lock(&key()).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_second_holder_waits() {
        let locks = Arc::new(KeyLocks::new());
        let held = locks.lock(&key()).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key()).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(locks.len(), 1);

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.is_empty());
    }
}
