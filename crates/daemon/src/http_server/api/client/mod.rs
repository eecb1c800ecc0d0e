use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

/// One endpoint call: how to build the HTTP request and what it answers.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}
