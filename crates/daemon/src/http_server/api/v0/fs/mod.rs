//! Filesystem-call endpoints of the proxy role
//!
//! Each endpoint mirrors one proxy call. Like the calls themselves they
//! report failure as a result code: a `200 OK` whose body carries a
//! negative `errno` instead of the success payload.

use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::proxy::ProxyError;
use crate::ProxyState;

mod close;
mod lseek;
mod open;
mod read;
mod unlink;
mod write;

pub use close::{FsCloseRequest, FsCloseResponse};
pub use lseek::{LseekRequest, LseekResponse};
pub use open::{FsOpenRequest, FsOpenResponse};
pub use read::{FsReadRequest, FsReadResponse};
pub use unlink::{FsUnlinkRequest, FsUnlinkResponse};
pub use write::{FsWriteRequest, FsWriteResponse};

pub fn router(state: ProxyState) -> Router<ProxyState> {
    Router::new()
        .route("/open", post(open::handler))
        .route("/read", post(read::handler))
        .route("/write", post(write::handler))
        .route("/lseek", post(lseek::handler))
        .route("/close", post(close::handler))
        .route("/unlink", post(unlink::handler))
        .with_state(state)
}

/// A failed filesystem call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (errno {errno})")]
pub struct FsFailure {
    /// Negative POSIX errno.
    pub errno: i32,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<ProxyError> for FsFailure {
    fn from(err: ProxyError) -> Self {
        Self {
            errno: err.errno(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for FsFailure {
    fn into_response(self) -> Response {
        (http::StatusCode::OK, Json(self)).into_response()
    }
}

/// Body of every fs endpoint response: the failure or the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FsReply<T> {
    Failed(FsFailure),
    Done(T),
}

impl<T> FsReply<T> {
    pub fn into_result(self) -> Result<T, FsFailure> {
        match self {
            FsReply::Failed(failure) => Err(failure),
            FsReply::Done(value) => Ok(value),
        }
    }
}

/// Handler-side conversion from a proxy call result.
pub(crate) fn reply<T: Serialize>(result: Result<T, ProxyError>) -> Response {
    match result {
        Ok(value) => (http::StatusCode::OK, Json(value)).into_response(),
        Err(err) => {
            tracing::debug!("fs call failed: {}", err);
            FsFailure::from(err).into_response()
        }
    }
}
