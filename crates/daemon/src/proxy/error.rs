use common::{ErrorKind, RemoteError};

use crate::cache::CacheFull;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    Fs(ErrorKind),
    #[error("remote store: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    CacheFull(#[from] CacheFull),
    #[error("local cache I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Collapse to the errno vocabulary. Local disk failures are always
    /// reported as `Io`, whatever their underlying cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Fs(kind) => *kind,
            ProxyError::Remote(err) => err.kind(),
            ProxyError::CacheFull(_) => ErrorKind::CacheFull,
            ProxyError::Io(_) => ErrorKind::Io,
        }
    }

    /// Negative errno, as a filesystem call would return it.
    pub fn errno(&self) -> i32 {
        -self.kind().errno()
    }
}

impl From<ErrorKind> for ProxyError {
    fn from(kind: ErrorKind) -> Self {
        ProxyError::Fs(kind)
    }
}
