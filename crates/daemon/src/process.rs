//! Process plumbing: logging, service start-up and shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use store::{Store, StoreError};

use crate::http_server::{self, api::client::ApiError};
use crate::proxy::Proxy;
use crate::remote::HttpStore;
use crate::service_config::{ConfigError, ProxyConfig, StoreConfig};
use crate::service_state::{ProxyState, StoreState};

/// Install the global subscriber, writing to stdout through a background
/// worker. `RUST_LOG` overrides `default_level`. Keep the guard alive for
/// the life of the process or buffered lines are lost.
pub fn init_tracing(default_level: tracing::Level) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
    guard
}

/// Cloneable trigger shared by every server in the process.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Self::shutdown`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),
    #[error("cache setup failed: {0}")]
    Cache(#[source] std::io::Error),
    #[error("store client setup failed: {0}")]
    Client(#[from] ApiError),
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error("server task panicked")]
    Panicked,
}

/// A server running on a background task.
#[derive(Debug)]
pub struct RunningService {
    pub addr: SocketAddr,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningService {
    /// Wait for the server to stop after a shutdown.
    pub async fn wait(self) -> Result<(), ServiceError> {
        match self.handle.await {
            Ok(result) => result.map_err(ServiceError::Serve),
            Err(_) => Err(ServiceError::Panicked),
        }
    }
}

pub async fn spawn_store(
    config: &StoreConfig,
    shutdown: ShutdownHandle,
) -> Result<RunningService, ServiceError> {
    config.validate()?;
    let store = Store::new(config.store()).await?;
    let router = http_server::store_router(StoreState::new(Arc::new(store)));
    spawn_router("store", config.listen_addr, router, shutdown).await
}

pub async fn spawn_proxy(
    config: &ProxyConfig,
    shutdown: ShutdownHandle,
) -> Result<RunningService, ServiceError> {
    config.validate()?;
    let remote = HttpStore::new(&config.store_url)?;
    let proxy = Proxy::new(Arc::new(remote), config.options())
        .await
        .map_err(ServiceError::Cache)?;
    let router = http_server::proxy_router(ProxyState::new(Arc::new(proxy)));
    spawn_router("proxy", config.listen_addr, router, shutdown).await
}

async fn spawn_router(
    role: &'static str,
    addr: SocketAddr,
    router: axum::Router,
    shutdown: ShutdownHandle,
) -> Result<RunningService, ServiceError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind { addr, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServiceError::Bind { addr, source })?;

    tracing::info!("{} listening on {}", role, addr);
    let handle = tokio::spawn(http_server::serve(listener, router, shutdown));
    Ok(RunningService { addr, handle })
}

/// Resolve on Ctrl-C, then trip `shutdown`.
pub async fn shutdown_on_ctrl_c(shutdown: ShutdownHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {}", e);
    }
    tracing::info!("shutting down");
    shutdown.shutdown();
}
