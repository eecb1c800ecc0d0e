use axum::extract::{Json, State};
use axum::response::Response;
use common::MAX_TRANSFER_SIZE;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use super::{reply, FsReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::proxy::Fd;
use crate::ProxyState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsReadRequest {
    pub fd: Fd,
    /// Upper bound on bytes returned; clamped to one transfer.
    pub len: usize,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsReadResponse {
    pub size: usize,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ProxyState>, Json(req): Json<FsReadRequest>) -> Response {
    let mut buf = vec![0u8; req.len.min(MAX_TRANSFER_SIZE)];
    let result = state.proxy().read(req.fd, &mut buf).await;
    reply(result.map(|size| {
        buf.truncate(size);
        FsReadResponse { size, data: buf }
    }))
}

impl ApiRequest for FsReadRequest {
    type Response = FsReply<FsReadResponse>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/read")?;
        Ok(client.post(full_url).json(&self))
    }
}
