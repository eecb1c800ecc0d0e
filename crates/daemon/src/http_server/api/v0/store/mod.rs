//! Store role endpoints
//!
//! The remote half of the proxy protocol, one endpoint per
//! [`common::RemoteStore`] call. Failures are answered with an error status
//! and a [`RemoteError`] body that [`ApiClient`](crate::http_server::api::client::ApiClient)
//! decodes back into the same error.

use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::{ErrorKind, RemoteError};
use http::StatusCode;

use crate::StoreState;

mod close;
mod finalize;
mod open;
mod read;
mod unlink;
mod write;

pub use close::{CloseRequest, CloseResponse};
pub use finalize::{FinalizeRequest, FinalizeResponse};
pub use open::StoreOpenRequest;
pub use read::StoreReadRequest;
pub use unlink::{StoreUnlinkRequest, StoreUnlinkResponse};
pub use write::{StoreWriteRequest, StoreWriteResponse};

pub fn router(state: StoreState) -> Router<StoreState> {
    Router::new()
        .route("/open", post(open::handler))
        .route("/read", post(read::handler))
        .route("/write", post(write::handler))
        .route("/close", post(close::handler))
        .route("/finalize", post(finalize::handler))
        .route("/unlink", post(unlink::handler))
        .with_state(state)
}

/// A store failure on its way back to the proxy.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct StoreApiError(#[from] pub RemoteError);

impl IntoResponse for StoreApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::PermissionDenied | ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::IsDirectory | ErrorKind::InvalidArgument | ErrorKind::BadDescriptor => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::TooManyOpenFiles | ErrorKind::CacheFull => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_round_trips() {
        let response = StoreApiError(RemoteError::is_directory("dir")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let err: RemoteError = serde_json::from_slice(&body).unwrap();
        assert_eq!(err, RemoteError::is_directory("dir"));
    }
}
