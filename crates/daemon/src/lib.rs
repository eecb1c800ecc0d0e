use std::fmt;

use serde::{Deserialize, Serialize};

// Proxy side: local cache and the filesystem-call surface
pub mod cache;
pub mod proxy;
pub mod remote;

// Service modules
pub mod http_server;
pub mod process;
pub mod service_config;
pub mod service_state;

pub use process::{spawn_proxy, spawn_store, RunningService, ServiceError, ShutdownHandle};
pub use proxy::{Proxy, ProxyError, ProxyOptions};
pub use remote::HttpStore;
pub use service_config::{Config as ServiceConfig, ConfigError, ProxyConfig, StoreConfig};
pub use service_state::{ProxyState, StoreState};

/// Name and version of the running binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub name: String,
    pub version: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
