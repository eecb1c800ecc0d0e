use axum::extract::{Json, State};
use axum::response::Response;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{reply, FsReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::proxy::Fd;
use crate::ProxyState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsCloseRequest {
    pub fd: Fd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsCloseResponse {
    pub closed: Fd,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ProxyState>, Json(req): Json<FsCloseRequest>) -> Response {
    let result = state.proxy().close(req.fd).await;
    reply(result.map(|()| FsCloseResponse { closed: req.fd }))
}

impl ApiRequest for FsCloseRequest {
    type Response = FsReply<FsCloseResponse>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/close")?;
        Ok(client.post(full_url).json(&self))
    }
}
