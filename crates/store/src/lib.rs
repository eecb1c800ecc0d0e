//! The authoritative side of ferry.
//!
//! [`Store`] owns the canonical files under a root directory and arbitrates
//! access to them with one reader/writer lock per path. It serves
//! version-checked opens, chunked reads, staged chunked writes and
//! close-time write-back, and implements [`common::RemoteStore`] so a proxy
//! can drive it in-process or through the HTTP transport.

mod config;
mod error;
mod locks;
mod store;
mod versions;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use locks::{PathEntry, PathTable};
pub use store::Store;
pub use versions::{Stamp, VersionClock};
