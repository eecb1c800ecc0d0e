use axum::extract::{Json, State};
use axum::response::IntoResponse;
use common::RemoteStore;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use super::StoreApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::StoreState;

/// One chunk of a staged upload.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreWriteRequest {
    pub upload_id: String,
    pub offset: u64,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreWriteResponse {
    pub next_offset: u64,
}

#[tracing::instrument(skip_all, fields(upload_id = %req.upload_id, offset = req.offset))]
pub async fn handler(
    State(state): State<StoreState>,
    Json(req): Json<StoreWriteRequest>,
) -> Result<impl IntoResponse, StoreApiError> {
    let next_offset = state
        .store()
        .write(&req.upload_id, req.offset, &req.data)
        .await?;
    Ok((http::StatusCode::OK, Json(StoreWriteResponse { next_offset })).into_response())
}

impl ApiRequest for StoreWriteRequest {
    type Response = StoreWriteResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/store/write")?;
        Ok(client.post(full_url).json(&self))
    }
}
