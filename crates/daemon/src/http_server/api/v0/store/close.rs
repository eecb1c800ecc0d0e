use axum::extract::{Json, State};
use axum::response::IntoResponse;
use common::{RemoteStore, Version};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use super::StoreApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::StoreState;

/// Single-shot write-back of a whole file.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    pub path: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseResponse {
    pub version: Version,
}

#[tracing::instrument(skip_all, fields(path = %req.path, len = req.data.len()))]
pub async fn handler(
    State(state): State<StoreState>,
    Json(req): Json<CloseRequest>,
) -> Result<impl IntoResponse, StoreApiError> {
    let version = state.store().close(&req.path, req.data).await?;
    Ok((http::StatusCode::OK, Json(CloseResponse { version })).into_response())
}

impl ApiRequest for CloseRequest {
    type Response = CloseResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/store/close")?;
        Ok(client.post(full_url).json(&self))
    }
}
