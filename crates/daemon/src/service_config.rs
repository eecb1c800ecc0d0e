//! Service configuration.
//!
//! Read from a TOML file with optional `[proxy]` and `[store]` tables.
//! Missing keys fall back to defaults, and a missing file is the same as
//! an empty one.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::proxy::ProxyOptions;

pub const DEFAULT_CONFIG_PATH: &str = "ferry.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Load `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub store_url: Url,
    pub cache_dir: PathBuf,
    /// Bytes of local disk the cache may hold.
    pub cache_capacity: u64,
    pub max_open_files: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5101)),
            store_url: default_store_url(),
            cache_dir: PathBuf::from("ferry-cache"),
            cache_capacity: 64 * 1024 * 1024,
            max_open_files: 4096,
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_files == 0 {
            return Err(ConfigError::Invalid {
                field: "max_open_files",
                reason: "must be at least 1".into(),
            });
        }
        if self.store_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "store_url",
                reason: format!("{} is not an http(s) base url", self.store_url),
            });
        }
        Ok(())
    }

    pub fn options(&self) -> ProxyOptions {
        ProxyOptions {
            cache_dir: self.cache_dir.clone(),
            cache_capacity: self.cache_capacity,
            max_open_files: self.max_open_files,
        }
    }
}

fn default_store_url() -> Url {
    Url::parse("http://127.0.0.1:5100").expect("default store url is valid")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub listen_addr: SocketAddr,
    /// Directory holding the canonical files.
    pub root: PathBuf,
    /// Directory for chunked uploads in flight. Keep it outside `root`.
    pub staging: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5100)),
            root: PathBuf::from("ferry-root"),
            staging: PathBuf::from("ferry-staging"),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staging.starts_with(&self.root) {
            return Err(ConfigError::Invalid {
                field: "staging",
                reason: format!(
                    "{} is inside the store root {}",
                    self.staging.display(),
                    self.root.display()
                ),
            });
        }
        Ok(())
    }

    pub fn store(&self) -> store::StoreConfig {
        store::StoreConfig::new(self.root.clone(), self.staging.clone())
    }
}
