use axum::extract::{Json, State};
use axum::response::Response;
use common::OpenIntent;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{reply, FsReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::proxy::Fd;
use crate::ProxyState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsOpenRequest {
    pub path: String,
    pub intent: OpenIntent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsOpenResponse {
    pub fd: Fd,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ProxyState>, Json(req): Json<FsOpenRequest>) -> Response {
    let result = state.proxy().open(&req.path, req.intent).await;
    reply(result.map(|fd| FsOpenResponse { fd }))
}

impl ApiRequest for FsOpenRequest {
    type Response = FsReply<FsOpenResponse>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/open")?;
        Ok(client.post(full_url).json(&self))
    }
}
