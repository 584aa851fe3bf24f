//! Remote fetching for absolute-URL references.

use std::time::Duration;

use url::Url;

/// Fetches bytes for a remote reference. The default is a blocking HTTP
/// GET; callers can plug in anything (an auth-aware client, a test stub, a
/// recording proxy).
pub trait RemoteUrlHandler {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, RemoteFetchError>;
}

#[derive(Debug, thiserror::Error)]
#[error("remote fetch of {url} failed: {message}")]
pub struct RemoteFetchError {
    pub url: String,
    pub message: String,
}

impl RemoteFetchError {
    pub fn new(url: &Url, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// The built-in handler: HTTP GET with a configurable timeout.
#[derive(Debug)]
pub struct HttpRemoteHandler {
    client: reqwest::blocking::Client,
}

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpRemoteHandler {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(DEFAULT_REMOTE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
        })
    }
}

impl RemoteUrlHandler for HttpRemoteHandler {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, RemoteFetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| RemoteFetchError::new(url, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteFetchError::new(url, format!("HTTP {status}")));
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| RemoteFetchError::new(url, err.to_string()))
    }
}
