use axum::routing::get;
use axum::Router;

use crate::ProxyState;

mod stats;

pub use stats::{CacheStatsRequest, CacheStatsResponse};

pub fn router(state: ProxyState) -> Router<ProxyState> {
    Router::new()
        .route("/stats", get(stats::handler))
        .with_state(state)
}
