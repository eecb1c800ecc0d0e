use std::path::PathBuf;

use clap::Parser;
use url::Url;

use ferry_daemon::service_config::DEFAULT_CONFIG_PATH;

pub mod op;
pub mod ops;

crate::command_enum! {
    (Store, ops::Store),
    (Proxy, ops::Proxy),
    (Cat, ops::Cat),
    (Put, ops::Put),
    (Health, ops::Health),
    (Version, ops::Version),
}

#[derive(Parser, Debug)]
#[command(name = "ferry", version, about = "Caching file proxy and its remote store")]
pub struct Args {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "FERRY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Server to talk to for cat, put and health (defaults to the configured proxy)
    #[arg(long, global = true, env = "FERRY_REMOTE")]
    pub remote: Option<Url>,

    #[command(subcommand)]
    pub command: Command,
}
