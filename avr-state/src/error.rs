//! Error types for avr-state

use std::fmt;

use avr_stream::ZoneId;

/// Result type for avr-state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur during state management
#[derive(Debug)]
pub enum StateError {
    /// Zone was never added to the store
    ZoneNotFound(ZoneId),

    /// Zone is already present in the store
    ZoneExists(ZoneId),

    /// A status fetch or decode failed; nothing was applied
    RefreshFailed { zone: ZoneId, reason: String },

    /// A document or event could not be decoded
    Parse(ParseError),

    /// Background task failed
    Task(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::ZoneNotFound(zone) => write!(f, "Zone not found: {}", zone),
            StateError::ZoneExists(zone) => write!(f, "Zone already exists: {}", zone),
            StateError::RefreshFailed { zone, reason } => {
                write!(f, "Refresh of {} failed: {}", zone, reason)
            }
            StateError::Parse(err) => write!(f, "Parse error: {}", err),
            StateError::Task(msg) => write!(f, "Task error: {}", msg),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for StateError {
    fn from(err: ParseError) -> Self {
        StateError::Parse(err)
    }
}

/// A raw value that does not fit its attribute's domain.
///
/// Reported as a warning; the attribute keeps its previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub attribute: String,
    pub raw: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(
        attribute: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse {} from {:?}: {}", self.attribute, self.raw, self.reason)
    }
}

impl std::error::Error for ParseError {}
