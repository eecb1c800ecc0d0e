//! Descriptor table
//!
//! Hands out integer descriptors for open sessions. Numbers start at
//! [`FIRST_FD`] and only ever grow, so a number is never reused within the
//! life of the process. The table has its own lock and never touches the
//! cache registry.

use std::collections::HashMap;
use std::sync::Arc;

use common::ErrorKind;
use parking_lot::Mutex;
use tokio::fs::File;

use crate::cache::CacheKey;

pub type Fd = i32;

/// 0 through 5 stay free for the caller's own standard streams.
pub const FIRST_FD: Fd = 6;

#[derive(Debug)]
pub enum Handle {
    Directory,
    File {
        key: CacheKey,
        file: tokio::sync::Mutex<File>,
    },
}

/// One open session.
#[derive(Debug)]
pub struct Descriptor {
    pub fd: Fd,
    /// The path as the caller passed it to `open`.
    pub path: String,
    pub handle: Handle,
}

impl Descriptor {
    pub fn key(&self) -> Option<&CacheKey> {
        match &self.handle {
            Handle::Directory => None,
            Handle::File { key, .. } => Some(key),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.handle, Handle::Directory)
    }
}

#[derive(Debug)]
struct Table {
    next: Fd,
    open: HashMap<Fd, Arc<Descriptor>>,
    reserved: usize,
}

#[derive(Debug)]
pub struct DescriptorTable {
    max_open: usize,
    inner: Mutex<Table>,
}

impl DescriptorTable {
    pub fn new(max_open: usize) -> Self {
        Self {
            max_open,
            inner: Mutex::new(Table {
                next: FIRST_FD,
                open: HashMap::new(),
                reserved: 0,
            }),
        }
    }

    /// Fail if no further descriptor could be handed out right now.
    pub fn check_capacity(&self) -> Result<(), ErrorKind> {
        let table = self.inner.lock();
        if table.open.len() + table.reserved >= self.max_open {
            return Err(ErrorKind::TooManyOpenFiles);
        }
        Ok(())
    }

    /// Claim the next descriptor number. The slot counts against the limit
    /// until the reservation is installed or dropped.
    pub fn reserve(&self) -> Result<Reservation<'_>, ErrorKind> {
        let mut table = self.inner.lock();
        if table.open.len() + table.reserved >= self.max_open {
            return Err(ErrorKind::TooManyOpenFiles);
        }
        let fd = table.next;
        table.next += 1;
        table.reserved += 1;
        Ok(Reservation {
            table: self,
            fd,
            installed: false,
        })
    }

    pub fn get(&self, fd: Fd) -> Option<Arc<Descriptor>> {
        self.inner.lock().open.get(&fd).cloned()
    }

    /// Take `fd` out of the table. Only one caller can win for a given fd.
    pub fn remove(&self, fd: Fd) -> Option<Arc<Descriptor>> {
        self.inner.lock().open.remove(&fd)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }
}

/// A descriptor number handed out but not yet bound to a session.
#[derive(Debug)]
pub struct Reservation<'a> {
    table: &'a DescriptorTable,
    fd: Fd,
    installed: bool,
}

impl Reservation<'_> {
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Publish the session under the reserved number.
    pub fn install(mut self, path: impl Into<String>, handle: Handle) -> Arc<Descriptor> {
        let descriptor = Arc::new(Descriptor {
            fd: self.fd,
            path: path.into(),
            handle,
        });
        let mut table = self.table.inner.lock();
        table.reserved -= 1;
        table.open.insert(self.fd, descriptor.clone());
        self.installed = true;
        descriptor
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.installed {
            self.table.inner.lock().reserved -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fd_is_six_and_monotonic() {
        let table = DescriptorTable::new(16);
        let a = table.reserve().unwrap().install("/a", Handle::Directory);
        let b = table.reserve().unwrap().install("/b", Handle::Directory);
        assert_eq!(a.fd, 6);
        assert_eq!(b.fd, 7);

        table.remove(6);
        let c = table.reserve().unwrap().install("/c", Handle::Directory);
        assert_eq!(c.fd, 8);
    }

    #[test]
    fn test_limit_counts_reservations() {
        let table = DescriptorTable::new(2);
        let _open = table.reserve().unwrap().install("/a", Handle::Directory);
        let pending = table.reserve().unwrap();

        assert_eq!(table.reserve().unwrap_err(), ErrorKind::TooManyOpenFiles);
        assert_eq!(table.check_capacity(), Err(ErrorKind::TooManyOpenFiles));

        drop(pending);
        assert!(table.check_capacity().is_ok());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_wins_once() {
        let table = DescriptorTable::new(4);
        let d = table.reserve().unwrap().install("/d", Handle::Directory);
        assert!(d.is_directory());
        assert!(d.key().is_none());

        assert!(table.remove(d.fd).is_some());
        assert!(table.remove(d.fd).is_none());
        assert!(table.get(d.fd).is_none());
        assert!(table.is_empty());
    }
}
