use axum::extract::{Json, State};
use axum::response::Response;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{reply, FsReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::proxy::{Fd, Whence};
use crate::ProxyState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LseekRequest {
    pub fd: Fd,
    pub offset: i64,
    pub whence: Whence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LseekResponse {
    pub position: u64,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ProxyState>, Json(req): Json<LseekRequest>) -> Response {
    let result = state.proxy().lseek(req.fd, req.offset, req.whence).await;
    reply(result.map(|position| LseekResponse { position }))
}

impl ApiRequest for LseekRequest {
    type Response = FsReply<LseekResponse>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/fs/lseek")?;
        Ok(client.post(full_url).json(&self))
    }
}
