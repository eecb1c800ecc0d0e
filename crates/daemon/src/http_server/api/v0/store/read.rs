use axum::extract::{Json, State};
use axum::response::IntoResponse;
use common::{ChunkReply, RemoteStore};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::StoreApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::StoreState;

/// Continuation fetch for content past the inline chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReadRequest {
    pub path: String,
    pub offset: u64,
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<StoreState>,
    Json(req): Json<StoreReadRequest>,
) -> Result<impl IntoResponse, StoreApiError> {
    let chunk = state.store().read(&req.path, req.offset).await?;
    Ok((http::StatusCode::OK, Json(chunk)).into_response())
}

impl ApiRequest for StoreReadRequest {
    type Response = ChunkReply;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/store/read")?;
        Ok(client.post(full_url).json(&self))
    }
}
