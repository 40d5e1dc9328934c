//! Turning stream events and status documents into update batches
//!
//! Decoders only pick raw strings out of their input and pair them with attribute keys. Parsing
//! into typed values happens when the batch is applied, one attribute at a time.

use avr_stream::{EventKind, EventRecord};
use serde::Serialize;
use xmltree::{Element, XMLNode};

use crate::attribute::{AttributeKey, UpdateSource};
use crate::error::ParseError;

/// Raw attribute updates applied to one zone as a unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateBatch {
    pub source: UpdateSource,
    pub updates: Vec<(AttributeKey, String)>,
}

impl UpdateBatch {
    pub fn new(source: UpdateSource) -> Self {
        Self {
            source,
            updates: Vec::new(),
        }
    }

    pub fn push(source: UpdateSource, key: AttributeKey, raw: impl Into<String>) -> Self {
        Self::new(source).with(key, raw)
    }

    pub fn with(mut self, key: AttributeKey, raw: impl Into<String>) -> Self {
        self.updates.push((key, raw.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Append the updates of `other`, keeping this batch's source
    pub fn extend(&mut self, other: UpdateBatch) {
        self.updates.extend(other.updates);
    }
}

/// Updates carried by one stream event, `None` for events without a stored attribute
pub fn decode_event(event: &EventRecord) -> Option<UpdateBatch> {
    let param = event.parameter.as_str();
    let single = |key| Some(UpdateBatch::push(UpdateSource::Push, key, param));

    match event.kind {
        EventKind::Power | EventKind::ZonePower => single(AttributeKey::Power),
        EventKind::Volume => single(AttributeKey::Volume),
        EventKind::Mute => single(AttributeKey::Mute),
        EventKind::Input => single(AttributeKey::InputSource),
        EventKind::SoundMode => single(AttributeKey::SoundMode),
        EventKind::Parameter => decode_parameter(param),
        EventKind::NetAudio => decode_net_audio(param),
        EventKind::Tuner => decode_tuner(param),
    }
}

/// `PS` parameter prefixes and the attributes they carry
const PARAMETER_FIELDS: &[(&str, &[AttributeKey])] = &[
    ("BAS ", &[AttributeKey::Bass, AttributeKey::BassLevel]),
    ("TRE ", &[AttributeKey::Treble, AttributeKey::TrebleLevel]),
    ("TONE CTRL ", &[AttributeKey::ToneControlAdjust]),
    ("DYNEQ ", &[AttributeKey::DynamicEq]),
    ("MULTEQ:", &[AttributeKey::MultiEq]),
    ("REFLEV ", &[AttributeKey::ReferenceLevelOffset]),
    ("DYNVOL ", &[AttributeKey::DynamicVolume]),
];

fn decode_parameter(param: &str) -> Option<UpdateBatch> {
    PARAMETER_FIELDS.iter().find_map(|(prefix, keys)| {
        let value = param.strip_prefix(prefix)?;
        let mut batch = UpdateBatch::new(UpdateSource::Push);
        for key in keys.iter() {
            batch.updates.push((*key, value.to_string()));
        }
        Some(batch)
    })
}

fn decode_net_audio(param: &str) -> Option<UpdateBatch> {
    let key = match param.chars().next()? {
        '1' => AttributeKey::Title,
        '2' => AttributeKey::Artist,
        '4' => AttributeKey::Album,
        _ => return None,
    };
    Some(UpdateBatch::push(UpdateSource::Push, key, &param[1..]))
}

fn decode_tuner(param: &str) -> Option<UpdateBatch> {
    if let Some(station) = param.strip_prefix("ANNAME") {
        return Some(UpdateBatch::push(UpdateSource::Push, AttributeKey::Station, station));
    }

    let digits = param.strip_prefix("AN")?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole = match digits[..4].trim_start_matches('0') {
        "" => "0",
        whole => whole,
    };
    let fraction = digits[4..].trim_end_matches('0');
    let frequency = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };
    let band = if digits > "050000" { "AM" } else { "FM" };

    Some(
        UpdateBatch::push(UpdateSource::Push, AttributeKey::Frequency, frequency)
            .with(AttributeKey::Band, band),
    )
}

/// Child paths searched in a status document, first match wins
const STATUS_FIELDS: &[(AttributeKey, &[&str])] = &[
    (AttributeKey::Power, &["ZonePower", "Power"]),
    (AttributeKey::Volume, &["MasterVolume"]),
    (AttributeKey::Mute, &["Mute"]),
    (AttributeKey::InputSource, &["InputFuncSelect"]),
    (AttributeKey::SoundMode, &["selectSurround", "SurrMode"]),
];

/// Updates found in a zone status document (`<item><MasterVolume><value>..`)
///
/// Attributes missing from the document are simply not part of the batch. A document with none
/// of the known fields is rejected.
pub fn decode_status(root: &Element) -> Result<UpdateBatch, ParseError> {
    let mut batch = UpdateBatch::new(UpdateSource::Poll);

    for (key, tags) in STATUS_FIELDS {
        let value = tags.iter().find_map(|tag| child_value(root, tag));
        if let Some(value) = value {
            batch.updates.push((*key, value));
        }
    }

    if batch.is_empty() {
        return Err(ParseError::new(
            "status document",
            root.name.clone(),
            "no known attributes",
        ));
    }
    Ok(batch)
}

/// Updates from a `GetToneControl` AppCommand response element
pub fn decode_tone_control(cmd: &Element) -> UpdateBatch {
    let fields = [
        (AttributeKey::ToneControlAvailable, "status"),
        (AttributeKey::ToneControlAdjust, "adjust"),
        (AttributeKey::BassLevel, "basslevel"),
        (AttributeKey::Bass, "bassvalue"),
        (AttributeKey::TrebleLevel, "treblelevel"),
        (AttributeKey::Treble, "treblevalue"),
    ];

    let mut batch = UpdateBatch::new(UpdateSource::Poll);
    for (key, tag) in fields {
        if let Some(value) = cmd.get_child(tag).and_then(|e| e.get_text()) {
            batch.updates.push((key, value.trim().to_string()));
        }
    }
    batch
}

/// Updates from a `GetAudyssey` AppCommand response element (`<list><param name="..">`)
pub fn decode_audyssey(cmd: &Element) -> UpdateBatch {
    let mut batch = UpdateBatch::new(UpdateSource::Poll);
    let Some(list) = cmd.get_child("list") else {
        return batch;
    };

    for node in &list.children {
        let XMLNode::Element(param) = node else {
            continue;
        };
        let key = match param.attributes.get("name").map(String::as_str) {
            Some("dynamiceq") => AttributeKey::DynamicEq,
            Some("multeq") => AttributeKey::MultiEq,
            Some("reflevoffset") => AttributeKey::ReferenceLevelOffset,
            Some("dynamicvol") => AttributeKey::DynamicVolume,
            _ => continue,
        };
        if let Some(value) = param.get_text() {
            batch.updates.push((key, value.trim().to_string()));
        }
    }
    batch
}

fn child_value(root: &Element, tag: &str) -> Option<String> {
    root.get_child(tag)?
        .get_child("value")?
        .get_text()
        .map(|text| text.trim().to_string())
}
