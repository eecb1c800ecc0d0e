use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use ferry_daemon::process::{init_tracing, shutdown_on_ctrl_c};
use ferry_daemon::{spawn_store, ServiceError, ShutdownHandle};

/// Run the file store server
#[derive(Args, Debug, Clone)]
pub struct Store {
    /// Address to listen on
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Directory holding the canonical files
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Directory for chunked uploads in flight
    #[arg(long)]
    pub staging: Option<PathBuf>,
}

#[derive(Debug)]
pub struct StoreOutput {
    pub addr: SocketAddr,
}

impl fmt::Display for StoreOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", "store stopped".dimmed(), self.addr)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store failed: {0}")]
    Service(#[from] ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Store {
    type Error = StoreError;
    type Output = StoreOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let _guard = init_tracing(tracing::Level::INFO);

        let mut config = ctx.config.store.clone();
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(staging) = &self.staging {
            config.staging = staging.clone();
        }

        let shutdown = ShutdownHandle::new();
        let service = spawn_store(&config, shutdown.clone()).await?;
        let addr = service.addr;

        shutdown_on_ctrl_c(shutdown).await;
        service.wait().await?;
        Ok(StoreOutput { addr })
    }
}
