use axum::extract::{Json, State};
use axum::response::IntoResponse;
use common::{RemoteStore, Version};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::StoreApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::StoreState;

/// Swap a finished staged upload in for `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub upload_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub version: Version,
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<StoreState>,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, StoreApiError> {
    let version = state.store().finalize(&req.upload_id, &req.path).await?;
    Ok((http::StatusCode::OK, Json(FinalizeResponse { version })).into_response())
}

impl ApiRequest for FinalizeRequest {
    type Response = FinalizeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/store/finalize")?;
        Ok(client.post(full_url).json(&self))
    }
}
