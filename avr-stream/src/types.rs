//! Core types for the avr-stream crate.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identifier of a receiver zone ("Main", "Zone2", "Zone3").
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn main() -> Self {
        Self::new("Main")
    }

    pub fn zone2() -> Self {
        Self::new("Zone2")
    }

    pub fn zone3() -> Self {
        Self::new("Zone3")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_main(&self) -> bool {
        self.0 == "Main"
    }

    /// Zone number used by the HTTP endpoints (1 for Main)
    pub fn number(&self) -> Option<u8> {
        match self.0.as_str() {
            "Main" => Some(1),
            "Zone2" => Some(2),
            "Zone3" => Some(3),
            _ => None,
        }
    }
}

impl From<String> for ZoneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a stream event.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
pub enum EventKind {
    /// `PW`: whole device power
    Power,
    /// `ZM`, `Z2ON`, `Z3OFF`: power of one zone
    ZonePower,
    Volume,
    Mute,
    Input,
    SoundMode,
    /// `PS...`: tone and surround parameters
    Parameter,
    /// `NSE...`: net audio display lines
    NetAudio,
    /// `TF...`: tuner frequency and station
    Tuner,
}

/// A classified line from the event stream.
///
/// Produced by the dispatcher and handed to listeners once; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub zone: ZoneId,
    pub kind: EventKind,
    /// The line with its tag stripped, e.g. `"455"` for `MV455`
    pub parameter: String,
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(zone: ZoneId, kind: EventKind, parameter: impl Into<String>) -> Self {
        Self {
            zone,
            kind,
            parameter: parameter.into(),
            received_at: Utc::now(),
        }
    }
}

/// Lifecycle state of the persistent stream connection.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal until a new explicit connect
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Notifications published by the connection supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// Reconnect budget exhausted; a new explicit connect is required
    ConnectionFailed { attempts: u32, reason: String },
}

/// Input source tokens the receiver sends on the stream
pub const TELNET_SOURCES: &[&str] = &[
    "CD", "PHONO", "TUNER", "DVD", "BD", "TV", "SAT/CBL", "MPLAY", "GAME", "HDRADIO", "NET",
    "PANDORA", "SIRIUSXM", "LASTFM", "FLICKR", "IRADIO", "SERVER", "FAVORITES", "AUX1", "AUX2",
    "AUX3", "AUX4", "AUX5", "AUX6", "AUX7", "BT", "USB/IPOD", "USB DIRECT", "IPOD DIRECT",
];
