//! Cache stats API endpoint

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::cache::EntryInfo;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::proxy::ProxyStats;
use crate::ProxyState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsRequest {
    /// Include every cached entry, least recently used first.
    #[serde(default)]
    pub entries: bool,
}

/// Response containing cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub stats: ProxyStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntryInfo>>,
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ProxyState>,
    axum::extract::Query(req): axum::extract::Query<CacheStatsRequest>,
) -> Response {
    let proxy = state.proxy();
    let entries = req.entries.then(|| proxy.cache().snapshot());
    (
        http::StatusCode::OK,
        Json(CacheStatsResponse {
            stats: proxy.stats(),
            entries,
        }),
    )
        .into_response()
}

impl ApiRequest for CacheStatsRequest {
    type Response = CacheStatsResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/cache/stats")?;
        Ok(client.get(full_url).query(&self))
    }
}
