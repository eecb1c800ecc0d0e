use common::RemoteError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use url::Url;

use super::error::ApiError;
use super::ApiRequest;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    /// Send `request` and decode its response.
    ///
    /// Error statuses carrying a [`RemoteError`] body surface as
    /// [`ApiError::Remote`].
    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        if response.status().is_success() {
            return Ok(response.json::<T::Response>().await?);
        }

        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<RemoteError>(&body) {
            Ok(err) => Err(ApiError::Remote(err)),
            Err(_) => Err(ApiError::HttpStatus(status, body)),
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
