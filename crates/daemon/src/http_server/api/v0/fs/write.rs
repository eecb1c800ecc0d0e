use axum::extract::{Json, State};
use axum::response::Response;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use super::{reply, FsReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::proxy::Fd;
use crate::ProxyState;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsWriteRequest {
    pub fd: Fd,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsWriteResponse {
    pub written: usize,
}

#[tracing::instrument(skip_all, fields(fd = req.fd, len = req.data.len()))]
pub async fn handler(State(state): State<ProxyState>, Json(req): Json<FsWriteRequest>) -> Response {
    let result = state.proxy().write(req.fd, &req.data).await;
    reply(result.map(|written| FsWriteResponse { written }))
}

impl ApiRequest for FsWriteRequest {
    type Response = FsReply<FsWriteResponse>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/write")?;
        Ok(client.post(full_url).json(&self))
    }
}
