use std::fmt;

use clap::Args;
use common::{OpenIntent, MAX_TRANSFER_SIZE};
use owo_colors::OwoColorize;

use ferry_daemon::http_server::api::client::ApiError;
use ferry_daemon::http_server::api::v0::fs::{FsFailure, FsOpenRequest, FsReadRequest};

/// Print a file through a running proxy
#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Path of the file on the store
    pub path: String,
}

#[derive(Debug)]
pub enum CatContent {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug)]
pub struct CatOutput {
    pub path: String,
    pub size: usize,
    pub content: CatContent,
}

impl fmt::Display for CatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}  {} {} bytes",
            "File:".dimmed(),
            self.path.bold(),
            "Size:".dimmed(),
            self.size
        )?;
        match &self.content {
            CatContent::Text(text) => write!(f, "{text}"),
            CatContent::Binary(bytes) => {
                let hex = bytes
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "{} {hex}", "Binary content (hex):".dimmed())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Fs(#[from] FsFailure),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = CatOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = &ctx.client;
        let fd = client
            .call(FsOpenRequest {
                path: self.path.clone(),
                intent: OpenIntent::Read,
            })
            .await?
            .into_result()?
            .fd;

        let transfer = async {
            let mut data = Vec::new();
            loop {
                let chunk = client
                    .call(FsReadRequest {
                        fd,
                        len: MAX_TRANSFER_SIZE,
                    })
                    .await?
                    .into_result()?;
                if chunk.size == 0 {
                    break;
                }
                data.extend_from_slice(&chunk.data);
            }
            Ok::<_, CatError>(data)
        }
        .await;
        let data = super::close_after(client, fd, transfer).await?;

        let size = data.len();
        let content = match String::from_utf8(data) {
            Ok(text) => CatContent::Text(text),
            Err(e) => CatContent::Binary(e.into_bytes()),
        };
        Ok(CatOutput {
            path: self.path.clone(),
            size,
            content,
        })
    }
}
