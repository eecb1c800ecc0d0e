use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;
use url::Url;

use ferry_daemon::process::{init_tracing, shutdown_on_ctrl_c};
use ferry_daemon::{spawn_proxy, ServiceError, ShutdownHandle};

/// Run the caching proxy server
#[derive(Args, Debug, Clone)]
pub struct Proxy {
    /// Address to listen on
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Base URL of the store server
    #[arg(long, env = "FERRY_STORE_URL")]
    pub store_url: Option<Url>,

    /// Directory for cached copies (emptied at start-up)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Cache capacity in bytes
    #[arg(long)]
    pub cache_capacity: Option<u64>,

    /// Maximum number of open descriptors
    #[arg(long)]
    pub max_open_files: Option<usize>,
}

#[derive(Debug)]
pub struct ProxyOutput {
    pub addr: SocketAddr,
}

impl fmt::Display for ProxyOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", "proxy stopped".dimmed(), self.addr)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("proxy failed: {0}")]
    Service(#[from] ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Proxy {
    type Error = ProxyError;
    type Output = ProxyOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let _guard = init_tracing(tracing::Level::INFO);

        let mut config = ctx.config.proxy.clone();
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(url) = &self.store_url {
            config.store_url = url.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(max) = self.max_open_files {
            config.max_open_files = max;
        }

        let shutdown = ShutdownHandle::new();
        let service = spawn_proxy(&config, shutdown.clone()).await?;
        let addr = service.addr;

        shutdown_on_ctrl_c(shutdown).await;
        service.wait().await?;
        Ok(ProxyOutput { addr })
    }
}
