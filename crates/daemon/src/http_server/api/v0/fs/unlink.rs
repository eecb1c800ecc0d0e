use axum::extract::{Json, State};
use axum::response::Response;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{reply, FsReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ProxyState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsUnlinkRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsUnlinkResponse {
    pub path: String,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ProxyState>, Json(req): Json<FsUnlinkRequest>) -> Response {
    let result = state.proxy().unlink(&req.path).await;
    reply(result.map(|()| FsUnlinkResponse { path: req.path.clone() }))
}

impl ApiRequest for FsUnlinkRequest {
    type Response = FsReply<FsUnlinkResponse>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/unlink")?;
        Ok(client.post(full_url).json(&self))
    }
}
