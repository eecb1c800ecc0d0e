//! [`RemoteStore`] over HTTP, as used by a proxy process.

use async_trait::async_trait;
use common::{ChunkReply, OpenIntent, OpenReply, RemoteError, RemoteStore, Version};
use url::Url;

use crate::http_server::api::client::{ApiClient, ApiError};
use crate::http_server::api::v0::store::{
    CloseRequest, FinalizeRequest, StoreOpenRequest, StoreReadRequest, StoreUnlinkRequest,
    StoreWriteRequest,
};

/// Talks to a store process. Transport failures are reported as
/// [`common::ErrorKind::Io`].
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: ApiClient,
}

impl HttpStore {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(remote)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        self.client.base_url()
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn open(
        &self,
        path: &str,
        intent: OpenIntent,
        known: Version,
    ) -> Result<OpenReply, RemoteError> {
        let request = StoreOpenRequest {
            path: path.to_string(),
            intent,
            known,
        };
        Ok(self.client.call(request).await?)
    }

    async fn read(&self, path: &str, offset: u64) -> Result<ChunkReply, RemoteError> {
        let request = StoreReadRequest {
            path: path.to_string(),
            offset,
        };
        Ok(self.client.call(request).await?)
    }

    async fn write(&self, upload_id: &str, offset: u64, data: &[u8]) -> Result<u64, RemoteError> {
        let request = StoreWriteRequest {
            upload_id: upload_id.to_string(),
            offset,
            data: data.to_vec(),
        };
        Ok(self.client.call(request).await?.next_offset)
    }

    async fn close(&self, path: &str, data: Vec<u8>) -> Result<Version, RemoteError> {
        let request = CloseRequest {
            path: path.to_string(),
            data,
        };
        Ok(self.client.call(request).await?.version)
    }

    async fn finalize(&self, upload_id: &str, path: &str) -> Result<Version, RemoteError> {
        let request = FinalizeRequest {
            upload_id: upload_id.to_string(),
            path: path.to_string(),
        };
        Ok(self.client.call(request).await?.version)
    }

    async fn unlink(&self, path: &str) -> Result<(), RemoteError> {
        let request = StoreUnlinkRequest {
            path: path.to_string(),
        };
        self.client.call(request).await?;
        Ok(())
    }
}
