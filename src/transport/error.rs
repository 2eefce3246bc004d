use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}: {body}")]
    HttpStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to read the reply body from {0}")]
    BodyRead(String, #[source] std::io::Error),
}

impl TransportError {
    /// 5xx statuses are the server's fault; everything else is on the client side.
    pub fn is_server_failure(&self) -> bool {
        matches!(self, TransportError::HttpStatus { status, .. } if status.is_server_error())
    }
}
