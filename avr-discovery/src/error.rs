//! Error types for receiver discovery.

use std::fmt;

/// Failures while searching for or describing a receiver
#[derive(Debug)]
pub enum DiscoveryError {
    /// Socket setup, send failures and description fetches
    NetworkError(String),
    /// Unreadable SSDP answers or description documents
    ParseError(String),
    /// No answer within the search window
    Timeout,
    /// A description that does not belong to a usable receiver
    InvalidDevice(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DiscoveryError::Timeout => write!(f, "Operation timed out"),
            DiscoveryError::InvalidDevice(msg) => write!(f, "Invalid device: {}", msg),
        }
    }
}

impl std::error::Error for DiscoveryError {}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
