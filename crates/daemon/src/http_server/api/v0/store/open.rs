use axum::extract::{Json, State};
use axum::response::IntoResponse;
use common::{OpenIntent, OpenReply, RemoteStore, Version};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::StoreApiError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::StoreState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOpenRequest {
    pub path: String,
    pub intent: OpenIntent,
    /// Version of the caller's cached copy, or none.
    #[serde(default)]
    pub known: Version,
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<StoreState>,
    Json(req): Json<StoreOpenRequest>,
) -> Result<impl IntoResponse, StoreApiError> {
    let reply = state.store().open(&req.path, req.intent, req.known).await?;
    Ok((http::StatusCode::OK, Json(reply)).into_response())
}

impl ApiRequest for StoreOpenRequest {
    type Response = OpenReply;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/store/open")?;
        Ok(client.post(full_url).json(&self))
    }
}
