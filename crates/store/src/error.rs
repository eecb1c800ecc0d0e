use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures setting up a store. Request-time failures are reported as
/// [`common::RemoteError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to prepare directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}
