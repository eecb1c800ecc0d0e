//! HTTP surface of both roles.
//!
//! A store process serves the remote half of the proxy protocol under
//! `/api/v0/store`. A proxy process serves filesystem calls under
//! `/api/v0/fs` and cache introspection under `/api/v0/cache`. Both answer
//! `/_status/livez` and `/_status/version`.

use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::process::ShutdownHandle;
use crate::{ProxyState, StoreState};

pub mod api;
pub mod health;

/// Largest request body accepted: one base64-encoded transfer plus framing.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn store_router(state: StoreState) -> Router {
    Router::new()
        .nest("/_status", health::router())
        .nest("/api/v0/store", api::v0::store::router(state.clone()))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn proxy_router(state: ProxyState) -> Router {
    Router::new()
        .nest("/_status", health::router())
        .nest("/api/v0/fs", api::v0::fs::router(state.clone()))
        .nest("/api/v0/cache", api::v0::cache::router(state.clone()))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: ShutdownHandle,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.wait())
        .await
}
