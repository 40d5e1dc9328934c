//! Error types for the receiver HTTP client

use thiserror::Error;

/// Errors that can occur while talking to the receiver's HTTP interface
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection refused, DNS failure, timeout or broken transfer
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The receiver answered with a non-2xx status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Body was not well-formed XML
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// Well-formed document that is not a receiver response (an HTML page, wrong shape)
    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl HttpError {
    /// Whether this error comes from the transport rather than the document
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Network(_) | HttpError::Status(_))
    }
}

impl From<ureq::Error> for HttpError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => HttpError::Status(code),
            ureq::Error::Transport(transport) => HttpError::Network(transport.to_string()),
        }
    }
}

/// Convenience alias for HTTP client results
pub type Result<T> = std::result::Result<T, HttpError>;
