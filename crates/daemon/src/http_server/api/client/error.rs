use common::RemoteError;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("remote error: {0}")]
    Remote(RemoteError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl ApiError {
    /// The failure as seen across the remote boundary. Anything that is
    /// not a store-reported error is a transport failure.
    pub fn into_remote(self) -> RemoteError {
        match self {
            ApiError::Remote(err) => err,
            other => RemoteError::io(other.to_string()),
        }
    }
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        err.into_remote()
    }
}
