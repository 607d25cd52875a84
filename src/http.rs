//! "Fetch bytes from a URL" capability.
//!
//! Both the playlist loader and the cover fetchers go through
//! [`HttpClient`], so tests can substitute an in-memory implementation
//! and count requests.

use std::time::Duration;

/// Errors from a single plain GET.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    pub fn network(url: &str, err: impl std::fmt::Display) -> Self {
        Self::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Plain GET returning the full response body.
///
/// Implement this trait to create mock implementations for testing.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking reqwest client.
///
/// No request timeout is set: a hung cover fetch blocks the caller
/// until the server gives up.
pub struct ReqwestClient {
    http_client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Create a new client
    pub fn new() -> Result<Self, FetchError> {
        let http_client = reqwest::blocking::Client::builder()
            .user_agent(concat!("rp/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(None)
            .build()
            .map_err(|e| FetchError::network("<client>", e))?;
        Ok(Self { http_client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let data = response
            .bytes()
            .map_err(|e| FetchError::network(url, e))?
            .to_vec();

        tracing::debug!(target: "rp::http", url, bytes = data.len(), "GET complete");
        Ok(data)
    }
}
