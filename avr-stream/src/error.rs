//! Error types for the avr-stream crate.

/// Errors from the persistent stream connection.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Socket-level failure (refused, reset, DNS)
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The handshake did not complete within the connect timeout
    #[error("Connect to {target} timed out after {timeout_ms} ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// An explicit connect request failed
    #[error("Connection to {target} failed: {reason}")]
    ConnectionFailed { target: String, reason: String },

    /// No data received within the idle timeout
    #[error("No data received for {0} ms")]
    StaleConnection(u64),

    /// Operation requires a live connection
    #[error("Not connected")]
    NotConnected,

    /// Connect requested while a connection is already running
    #[error("Already connected")]
    AlreadyConnected,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A line that could not be turned into a record.
///
/// Only the offending line is lost; the parser continues with the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("Line exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("Line is not valid UTF-8: {0}")]
    InvalidEncoding(String),
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
