//! Closed error vocabulary shared across the remote boundary.

use std::io;

use serde::{Deserialize, Serialize};

/// Every failure either side can report, in errno terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("no such file or directory")]
    NotFound,
    #[error("is a directory")]
    IsDirectory,
    #[error("file exists")]
    AlreadyExists,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("operation not permitted")]
    PermissionDenied,
    #[error("permission denied")]
    AccessDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("cache is full")]
    CacheFull,
    #[error("input/output error")]
    Io,
}

impl ErrorKind {
    /// Positive POSIX errno for this kind.
    ///
    /// A full cache is a resource-exhaustion condition and shares `EMFILE`
    /// with the descriptor limit.
    pub fn errno(self) -> i32 {
        match self {
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::IsDirectory => libc::EISDIR,
            ErrorKind::AlreadyExists => libc::EEXIST,
            ErrorKind::BadDescriptor => libc::EBADF,
            ErrorKind::PermissionDenied => libc::EPERM,
            ErrorKind::AccessDenied => libc::EACCES,
            ErrorKind::InvalidArgument => libc::EINVAL,
            ErrorKind::TooManyOpenFiles | ErrorKind::CacheFull => libc::EMFILE,
            ErrorKind::Io => libc::EIO,
        }
    }

    /// Map a POSIX errno back to a kind. Unknown codes collapse to `Io`.
    pub fn from_errno(errno: i32) -> Self {
        match errno.abs() {
            libc::ENOENT => ErrorKind::NotFound,
            libc::EISDIR => ErrorKind::IsDirectory,
            libc::EEXIST => ErrorKind::AlreadyExists,
            libc::EBADF => ErrorKind::BadDescriptor,
            libc::EPERM => ErrorKind::PermissionDenied,
            libc::EACCES => ErrorKind::AccessDenied,
            libc::EINVAL => ErrorKind::InvalidArgument,
            libc::EMFILE => ErrorKind::TooManyOpenFiles,
            _ => ErrorKind::Io,
        }
    }
}

impl From<&io::Error> for ErrorKind {
    fn from(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return ErrorKind::from_errno(code);
        }
        match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::AccessDenied,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            _ => ErrorKind::Io,
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::from(&err)
    }
}

/// The error type carried over the remote boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(ErrorKind::NotFound, path)
    }

    pub fn is_directory(path: &str) -> Self {
        Self::new(ErrorKind::IsDirectory, path)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<io::Error> for RemoteError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::from(&err), err.to_string())
    }
}
