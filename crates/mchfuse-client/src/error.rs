//! Client error types.

use reqwest::{Method, StatusCode};

/// Errors that can occur while talking to the cloud service or a device.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Login or token refresh failed, or a token could not be decoded.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The bootstrap configuration is unreachable or malformed.
    #[error("service configuration error: {0}")]
    Config(String),

    /// A network-level error (connection, timeout, TLS, etc.).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// An HTTP status outside the expected success set for an operation.
    #[error("unexpected status {status} for {method} {url}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
    },

    /// Semantic misuse, e.g. listing a file or reading a directory.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A transport error after which the LAN/WAN probe observed a different
    /// reachability mode. The caller may retry on the new endpoint.
    #[error("connection mode changed after an error: {0}")]
    ConnectionModeChanged(#[source] reqwest::Error),

    /// The server response violated the wire contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Build an `UnexpectedStatus` from a live response.
    pub(crate) fn unexpected(method: Method, resp: &reqwest::Response) -> Self {
        ClientError::UnexpectedStatus {
            method,
            url: resp.url().to_string(),
            status: resp.status(),
        }
    }
}

/// Convenience result type.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
