use std::fmt;
use std::path::PathBuf;

use url::Url;

use ferry_daemon::http_server::api::client::{ApiClient, ApiError};
use ferry_daemon::{ConfigError, ServiceConfig};

/// One CLI command.
#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: fmt::Display + fmt::Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// What every command gets: the loaded config and a client for the
/// server it talks to.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub config_path: PathBuf,
    pub config: ServiceConfig,
    pub client: ApiClient,
}

#[derive(Debug, thiserror::Error)]
pub enum OpContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid remote url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl OpContext {
    /// `remote` defaults to the configured proxy address.
    pub fn new(config_path: PathBuf, remote: Option<Url>) -> Result<Self, OpContextError> {
        let config = ServiceConfig::load(&config_path)?;
        let remote = match remote {
            Some(remote) => remote,
            None => Url::parse(&format!("http://{}", config.proxy.listen_addr))?,
        };
        let client = ApiClient::new(&remote)?;

        Ok(Self {
            config_path,
            config,
            client,
        })
    }
}

/// Generate a `Command` subcommand enum over the listed ops, with matching
/// `OpError`/`OpOutput` enums and an `Op` impl that dispatches to them.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $ty:ty)),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($ty),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$ty as $crate::cli::op::Op>::Error),
            )*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$ty as $crate::cli::op::Op>::Output),)*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => write!(f, "{}", output),)*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
