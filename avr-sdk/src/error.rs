use avr_state::{AttributeKey, ZoneId};
use thiserror::Error;

use crate::zone::{Capability, ZoneRole};

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("State error: {0}")]
    State(#[from] avr_state::StateError),

    #[error("HTTP error: {0}")]
    Http(#[from] avr_http::HttpError),

    #[error("Stream error: {0}")]
    Stream(#[from] avr_stream::StreamError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] avr_discovery::DiscoveryError),

    #[error("{role:?} zone {zone} cannot {capability}")]
    CapabilityDenied {
        zone: ZoneId,
        role: ZoneRole,
        capability: Capability,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The receiver accepted a command but reports a different value afterwards
    #[error("Receiver kept {key} at {actual:?}, expected {expected}")]
    CommandRejected {
        key: AttributeKey,
        expected: String,
        actual: Option<String>,
    },

    #[error("Unsupported zone: {0}")]
    UnsupportedZone(ZoneId),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<avr_state::ParseError> for SdkError {
    fn from(err: avr_state::ParseError) -> Self {
        SdkError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
