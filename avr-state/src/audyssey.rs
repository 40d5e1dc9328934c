//! Audyssey room correction settings
//!
//! Status responses report MultEQ, reference level offset and Dynamic Volume as numeric codes;
//! the event stream uses short tokens (`PSMULTEQ:BYP.LR`, `PSREFLEV 5`, `PSDYNVOL MED`). Both
//! decode to the same label, which is also what commands take.

use crate::attribute::UpdateSource;
use crate::error::ParseError;

/// One setting value: status code, stream token, label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub code: Option<&'static str>,
    pub token: &'static str,
    pub label: &'static str,
}

const fn choice(code: &'static str, token: &'static str, label: &'static str) -> Choice {
    Choice {
        code: Some(code),
        token,
        label,
    }
}

pub const MULTI_EQ: &[Choice] = &[
    choice("0", "OFF", "Off"),
    choice("1", "FLAT", "Flat"),
    choice("2", "BYP.LR", "L/R Bypass"),
    choice("3", "AUDYSSEY", "Reference"),
    // Only reported on the stream, cannot be selected over HTTP
    Choice {
        code: None,
        token: "MANUAL",
        label: "Manual",
    },
];

pub const REFERENCE_LEVEL_OFFSET: &[Choice] = &[
    choice("0", "0", "0dB"),
    choice("1", "5", "+5dB"),
    choice("2", "10", "+10dB"),
    choice("3", "15", "+15dB"),
];

pub const DYNAMIC_VOLUME: &[Choice] = &[
    choice("0", "OFF", "Off"),
    choice("1", "LIT", "Light"),
    choice("2", "MED", "Medium"),
    choice("3", "HEV", "Heavy"),
];

/// Label for a raw status code or stream token
pub fn decode_choice(
    attribute: &str,
    choices: &[Choice],
    raw: &str,
    source: UpdateSource,
) -> Result<&'static str, ParseError> {
    choices
        .iter()
        .find(|choice| match source {
            UpdateSource::Push => choice.token.eq_ignore_ascii_case(raw),
            UpdateSource::Poll => choice.code == Some(raw),
        })
        .map(|choice| choice.label)
        .ok_or_else(|| ParseError::new(attribute, raw, "unknown setting"))
}

/// Status code to send for `label`, `None` if the label is unknown or read-only
pub fn code_for_label(choices: &[Choice], label: &str) -> Option<&'static str> {
    choices
        .iter()
        .find(|choice| choice.label.eq_ignore_ascii_case(label.trim()))
        .and_then(|choice| choice.code)
}

/// Labels a command accepts
pub fn labels(choices: &[Choice]) -> Vec<&'static str> {
    choices
        .iter()
        .filter(|choice| choice.code.is_some())
        .map(|choice| choice.label)
        .collect()
}
