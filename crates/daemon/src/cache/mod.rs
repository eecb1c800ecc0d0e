//! Local cache of remote files.
//!
//! # Architecture
//!
//! - `key`: cache keys and the flat path namespacing used for file names
//! - `registry`: the capacity-bounded, reference-counted LRU registry
//!
//! Cached copies are ordinary files in one directory. The registry tracks
//! which of them are in use and decides which ones may be deleted.

mod key;
mod registry;

pub use key::{CacheKey, NamespacedPath};
pub use registry::{CacheFull, CacheRegistry, CacheStats, EntryInfo};
