//! Zone attributes and their typed value domains
//!
//! Every attribute of a zone is named by an [`AttributeKey`]. A key knows how to parse a raw
//! string from the stream or from a status document into its domain; parsing is where range
//! checks and unit conversions happen, so stored values are always valid.

use serde::Serialize;

use crate::audyssey::{self, DYNAMIC_VOLUME, MULTI_EQ, REFERENCE_LEVEL_OFFSET};
use crate::error::ParseError;
use crate::sound_mode::{match_sound_mode, normalize_source};
use crate::volume;

/// Where an update batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// A line on the event stream
    Push,
    /// A status document fetched over HTTP
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    Power,
    Volume,
    Mute,
    InputSource,
    SoundMode,
    Bass,
    Treble,
    /// Bass gain in dB, -6 to 6
    BassLevel,
    /// Treble gain in dB, -6 to 6
    TrebleLevel,
    /// Whether tone controls can be used at all; off while Dynamic EQ is on
    ToneControlAvailable,
    /// The tone control on/off switch
    ToneControlAdjust,
    DynamicEq,
    MultiEq,
    ReferenceLevelOffset,
    DynamicVolume,
    Title,
    Artist,
    Album,
    Station,
    Frequency,
    Band,
}

impl AttributeKey {
    pub const ALL: [AttributeKey; 21] = [
        AttributeKey::Power,
        AttributeKey::Volume,
        AttributeKey::Mute,
        AttributeKey::InputSource,
        AttributeKey::SoundMode,
        AttributeKey::Bass,
        AttributeKey::Treble,
        AttributeKey::BassLevel,
        AttributeKey::TrebleLevel,
        AttributeKey::ToneControlAvailable,
        AttributeKey::ToneControlAdjust,
        AttributeKey::DynamicEq,
        AttributeKey::MultiEq,
        AttributeKey::ReferenceLevelOffset,
        AttributeKey::DynamicVolume,
        AttributeKey::Title,
        AttributeKey::Artist,
        AttributeKey::Album,
        AttributeKey::Station,
        AttributeKey::Frequency,
        AttributeKey::Band,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AttributeKey::Power => "power",
            AttributeKey::Volume => "volume",
            AttributeKey::Mute => "mute",
            AttributeKey::InputSource => "input_source",
            AttributeKey::SoundMode => "sound_mode",
            AttributeKey::Bass => "bass",
            AttributeKey::Treble => "treble",
            AttributeKey::BassLevel => "bass_level",
            AttributeKey::TrebleLevel => "treble_level",
            AttributeKey::ToneControlAvailable => "tone_control_available",
            AttributeKey::ToneControlAdjust => "tone_control_adjust",
            AttributeKey::DynamicEq => "dynamic_eq",
            AttributeKey::MultiEq => "multi_eq",
            AttributeKey::ReferenceLevelOffset => "reference_level_offset",
            AttributeKey::DynamicVolume => "dynamic_volume",
            AttributeKey::Title => "title",
            AttributeKey::Artist => "artist",
            AttributeKey::Album => "album",
            AttributeKey::Station => "station",
            AttributeKey::Frequency => "frequency",
            AttributeKey::Band => "band",
        }
    }

    /// Parse `raw` into this attribute's domain
    pub fn parse(&self, raw: &str, source: UpdateSource) -> Result<AttributeValue, ParseError> {
        let trimmed = raw.trim();
        match self {
            AttributeKey::Power => PowerState::parse(trimmed).map(AttributeValue::Power),
            AttributeKey::Volume => match source {
                UpdateSource::Push => volume::decode_stream_volume(trimmed),
                UpdateSource::Poll => volume::decode_status_volume(trimmed),
            }
            .map(AttributeValue::Decibels),
            AttributeKey::Mute
            | AttributeKey::ToneControlAvailable
            | AttributeKey::ToneControlAdjust
            | AttributeKey::DynamicEq => {
                parse_switch(self.name(), trimmed).map(AttributeValue::Switch)
            }
            AttributeKey::Bass | AttributeKey::Treble => {
                volume::decode_tone_level(trimmed, source == UpdateSource::Push)
                    .map(AttributeValue::Level)
            }
            AttributeKey::BassLevel | AttributeKey::TrebleLevel => {
                volume::decode_tone_decibels(trimmed, source == UpdateSource::Push)
                    .map(AttributeValue::Decibels)
            }
            AttributeKey::MultiEq => self.parse_choice(MULTI_EQ, trimmed, source),
            AttributeKey::ReferenceLevelOffset => {
                self.parse_choice(REFERENCE_LEVEL_OFFSET, trimmed, source)
            }
            AttributeKey::DynamicVolume => self.parse_choice(DYNAMIC_VOLUME, trimmed, source),
            AttributeKey::InputSource => {
                non_empty(self.name(), trimmed).map(|s| AttributeValue::Text(normalize_source(s)))
            }
            AttributeKey::SoundMode => {
                non_empty(self.name(), trimmed).map(|s| AttributeValue::Text(match_sound_mode(s)))
            }
            AttributeKey::Title
            | AttributeKey::Artist
            | AttributeKey::Album
            | AttributeKey::Station
            | AttributeKey::Frequency
            | AttributeKey::Band => Ok(AttributeValue::Text(trimmed.to_string())),
        }
    }

    fn parse_choice(
        &self,
        choices: &[audyssey::Choice],
        raw: &str,
        source: UpdateSource,
    ) -> Result<AttributeValue, ParseError> {
        audyssey::decode_choice(self.name(), choices, raw, source)
            .map(|label| AttributeValue::Text(label.to_string()))
    }
}

impl std::fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
    Standby,
}

impl PowerState {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw.to_ascii_uppercase().as_str() {
            "ON" => Ok(PowerState::On),
            "OFF" => Ok(PowerState::Off),
            "STANDBY" => Ok(PowerState::Standby),
            _ => Err(ParseError::new("power", raw, "expected ON, OFF or STANDBY")),
        }
    }
}

/// Typed value of one attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Power(PowerState),
    /// Volume (half-step resolution) or tone gain in decibels
    Decibels(f32),
    /// Tone level 0..=12
    Level(u8),
    Switch(bool),
    Text(String),
}

impl AttributeValue {
    pub fn as_power(&self) -> Option<PowerState> {
        match self {
            AttributeValue::Power(state) => Some(*state),
            _ => None,
        }
    }

    pub fn as_decibels(&self) -> Option<f32> {
        match self {
            AttributeValue::Decibels(db) => Some(*db),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<u8> {
        match self {
            AttributeValue::Level(level) => Some(*level),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<bool> {
        match self {
            AttributeValue::Switch(on) => Some(*on),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Power(PowerState::On) => f.write_str("ON"),
            AttributeValue::Power(PowerState::Off) => f.write_str("OFF"),
            AttributeValue::Power(PowerState::Standby) => f.write_str("STANDBY"),
            AttributeValue::Decibels(db) => write!(f, "{:.1} dB", db),
            AttributeValue::Level(level) => write!(f, "{}", level),
            AttributeValue::Switch(true) => f.write_str("ON"),
            AttributeValue::Switch(false) => f.write_str("OFF"),
            AttributeValue::Text(text) => f.write_str(text),
        }
    }
}

fn parse_switch(attribute: &str, raw: &str) -> Result<bool, ParseError> {
    match raw.to_ascii_uppercase().as_str() {
        "ON" | "1" => Ok(true),
        "OFF" | "0" => Ok(false),
        _ => Err(ParseError::new(attribute, raw, "expected ON/OFF or 1/0")),
    }
}

fn non_empty<'a>(attribute: &str, raw: &'a str) -> Result<&'a str, ParseError> {
    if raw.is_empty() {
        Err(ParseError::new(attribute, raw, "empty value"))
    } else {
        Ok(raw)
    }
}
