use std::fmt;
use std::path::PathBuf;

use clap::Args;
use common::{OpenIntent, MAX_TRANSFER_SIZE};
use owo_colors::OwoColorize;

use ferry_daemon::http_server::api::client::ApiError;
use ferry_daemon::http_server::api::v0::fs::{FsFailure, FsOpenRequest, FsWriteRequest};

/// Upload a local file through a running proxy
#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Destination path on the store
    pub path: String,

    /// Local file to upload
    pub file: PathBuf,
}

#[derive(Debug)]
pub struct PutOutput {
    pub path: String,
    pub size: usize,
}

impl fmt::Display for PutOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} bytes to {}",
            "Wrote".green(),
            self.size,
            self.path.bold()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Fs(#[from] FsFailure),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = PutOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let content = tokio::fs::read(&self.file)
            .await
            .map_err(|e| PutError::Read(self.file.clone(), e))?;

        let client = &ctx.client;
        let fd = client
            .call(FsOpenRequest {
                path: self.path.clone(),
                intent: OpenIntent::Create,
            })
            .await?
            .into_result()?
            .fd;

        let transfer = async {
            for chunk in content.chunks(MAX_TRANSFER_SIZE) {
                client
                    .call(FsWriteRequest {
                        fd,
                        data: chunk.to_vec(),
                    })
                    .await?
                    .into_result()?;
            }
            Ok::<_, PutError>(())
        }
        .await;
        super::close_after(client, fd, transfer).await?;

        Ok(PutOutput {
            path: self.path.clone(),
            size: content.len(),
        })
    }
}
