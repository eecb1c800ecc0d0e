use axum::extract::{Json, State};
use axum::response::IntoResponse;
use common::RemoteStore;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::StoreApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::StoreState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUnlinkRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUnlinkResponse {
    pub path: String,
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<StoreState>,
    Json(req): Json<StoreUnlinkRequest>,
) -> Result<impl IntoResponse, StoreApiError> {
    state.store().unlink(&req.path).await?;
    Ok((
        http::StatusCode::OK,
        Json(StoreUnlinkResponse { path: req.path }),
    )
        .into_response())
}

impl ApiRequest for StoreUnlinkRequest {
    type Response = StoreUnlinkResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/store/unlink")?;
        Ok(client.post(full_url).json(&self))
    }
}
