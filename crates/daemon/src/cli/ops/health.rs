use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use ferry_daemon::http_server::api::client::ApiError;
use ferry_daemon::http_server::health::liveness::LivezRequest;
use ferry_daemon::http_server::health::version::VersionRequest;
use ferry_daemon::BuildInfo;

/// Check the config and probe a running server
#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug)]
pub enum EndpointStatus {
    Ok,
    Unhealthy(String),
    NotReachable,
}

#[derive(Debug)]
pub struct ServerInfo {
    pub url: String,
    pub livez: EndpointStatus,
    pub build: Option<BuildInfo>,
}

#[derive(Debug)]
pub struct HealthOutput {
    pub config_path: PathBuf,
    pub config_error: Option<String>,
    pub server: ServerInfo,
}

impl fmt::Display for HealthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", "Config".bold())?;
        write!(f, "  {} ", format!("{}:", self.config_path.display()).dimmed())?;
        match &self.config_error {
            None => writeln!(f, "{}", "OK".green())?,
            Some(err) => writeln!(f, "{} {}", "error:".red(), err)?,
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", "Server".bold(), self.server.url)?;
        let livez = match &self.server.livez {
            EndpointStatus::Ok => "OK".green().to_string(),
            EndpointStatus::Unhealthy(code) => format!("{} ({})", "UNHEALTHY".red(), code),
            EndpointStatus::NotReachable => "NOT REACHABLE".red().to_string(),
        };
        writeln!(f, "  {} {}", "livez:".dimmed(), livez)?;
        match &self.server.build {
            Some(build) => write!(f, "  {} {}", "version:".dimmed(), build),
            None => write!(f, "  {} {}", "version:".dimmed(), "unknown".yellow()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = HealthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config_error = ctx
            .config
            .proxy
            .validate()
            .and_then(|_| ctx.config.store.validate())
            .err()
            .map(|e| e.to_string());

        let base = ctx.client.base_url();
        let livez = match ctx.client.call(LivezRequest {}).await {
            Ok(_) => EndpointStatus::Ok,
            Err(ApiError::HttpStatus(status, _)) => EndpointStatus::Unhealthy(status.to_string()),
            Err(ApiError::Remote(err)) => EndpointStatus::Unhealthy(err.to_string()),
            Err(_) => EndpointStatus::NotReachable,
        };

        let build = ctx.client.call(VersionRequest {}).await.ok();

        Ok(HealthOutput {
            config_path: ctx.config_path.clone(),
            config_error,
            server: ServerInfo {
                url: base.to_string(),
                livez,
                build,
            },
        })
    }
}
