//! Volume and tone level conversions
//!
//! The stream encodes volume as a level in half steps: two digits for a whole level (`46`) and
//! three digits ending in `5` for a half level (`455` is 45.5). Decibels are the level minus
//! [`VOLUME_ORIGIN`]. The status XML reports decibels directly, with `--` for the minimum.

use crate::error::ParseError;

pub const MIN_VOLUME_DB: f32 = -80.0;
pub const MAX_VOLUME_DB: f32 = 18.0;

/// Level that corresponds to 0 dB
pub const VOLUME_ORIGIN: f32 = 82.0;

pub const MIN_TONE_LEVEL: u8 = 0;
pub const MAX_TONE_LEVEL: u8 = 12;

/// Offset of bass and treble levels on the stream (`PSBAS 50` is level 6)
pub const TONE_STREAM_OFFSET: u8 = 44;

/// Tone level that corresponds to 0 dB; each level step is 1 dB
pub const TONE_LEVEL_ORIGIN: u8 = 6;

const MUTED_VOLUME: &str = "--";

/// Decode a stream volume token to decibels
pub fn decode_stream_volume(raw: &str) -> Result<f32, ParseError> {
    let raw = raw.trim();
    if raw == MUTED_VOLUME {
        return Ok(MIN_VOLUME_DB);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new("volume", raw, "not a number"));
    }

    let level = match raw.len() {
        2 => whole_level(raw)?,
        3 if raw.ends_with('5') => whole_level(&raw[..2])? + 0.5,
        3 => whole_level(raw)?,
        _ => return Err(ParseError::new("volume", raw, "expected two or three digits")),
    };

    check_volume_range(raw, level - VOLUME_ORIGIN)
}

/// Encode decibels to the stream's volume token
pub fn encode_stream_volume(decibels: f32) -> Result<String, ParseError> {
    let decibels = check_volume_step(decibels)?;
    let level = decibels + VOLUME_ORIGIN;
    let whole = level.floor() as u32;

    if level.fract() == 0.5 {
        Ok(format!("{:02}5", whole))
    } else {
        Ok(format!("{:02}", whole))
    }
}

/// Decode a status XML volume (decimal decibels or `--`)
pub fn decode_status_volume(raw: &str) -> Result<f32, ParseError> {
    let raw = raw.trim();
    if raw == MUTED_VOLUME {
        return Ok(MIN_VOLUME_DB);
    }
    let decibels: f32 = raw
        .parse()
        .map_err(|_| ParseError::new("volume", raw, "not a decimal number"))?;
    check_volume_range(raw, decibels)
}

/// Validate a requested volume and snap it to the receiver's half steps
pub fn check_volume_step(decibels: f32) -> Result<f32, ParseError> {
    if !decibels.is_finite() || !(MIN_VOLUME_DB..=MAX_VOLUME_DB).contains(&decibels) {
        return Err(ParseError::new(
            "volume",
            decibels.to_string(),
            "outside -80.0..=18.0 dB",
        ));
    }
    Ok((decibels * 2.0).round() / 2.0)
}

/// Decode a bass/treble level; stream values carry [`TONE_STREAM_OFFSET`]
pub fn decode_tone_level(raw: &str, from_stream: bool) -> Result<u8, ParseError> {
    let raw = raw.trim();
    let value: u8 = raw
        .parse()
        .map_err(|_| ParseError::new("tone level", raw, "not an integer"))?;
    let level = if from_stream {
        value
            .checked_sub(TONE_STREAM_OFFSET)
            .ok_or_else(|| ParseError::new("tone level", raw, "below stream offset"))?
    } else {
        value
    };
    check_tone_level(level).map_err(|_| ParseError::new("tone level", raw, "outside 0..=12"))
}

/// Decode a bass/treble gain in decibels.
///
/// Status responses report it as `-2dB`, `0dB` or `+4dB`; on the stream it is derived from the
/// level token.
pub fn decode_tone_decibels(raw: &str, from_stream: bool) -> Result<f32, ParseError> {
    if from_stream {
        let level = decode_tone_level(raw, true)?;
        return Ok(f32::from(level) - f32::from(TONE_LEVEL_ORIGIN));
    }

    let raw = raw.trim();
    let number = raw
        .strip_suffix("dB")
        .or_else(|| raw.strip_suffix("DB"))
        .unwrap_or(raw)
        .trim();
    let decibels: i8 = number
        .parse()
        .map_err(|_| ParseError::new("tone gain", raw, "not a decibel value"))?;
    let limit = TONE_LEVEL_ORIGIN as i8;
    if !(-limit..=limit).contains(&decibels) {
        return Err(ParseError::new("tone gain", raw, "outside -6..=6 dB"));
    }
    Ok(f32::from(decibels))
}

pub fn check_tone_level(level: u8) -> Result<u8, ParseError> {
    if (MIN_TONE_LEVEL..=MAX_TONE_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(ParseError::new("tone level", level.to_string(), "outside 0..=12"))
    }
}

fn whole_level(digits: &str) -> Result<f32, ParseError> {
    digits
        .parse::<u32>()
        .map(|level| level as f32)
        .map_err(|_| ParseError::new("volume", digits, "not a number"))
}

fn check_volume_range(raw: &str, decibels: f32) -> Result<f32, ParseError> {
    if (MIN_VOLUME_DB..=MAX_VOLUME_DB).contains(&decibels) {
        Ok(decibels)
    } else {
        Err(ParseError::new("volume", raw, "outside -80.0..=18.0 dB"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_half_step_decodes() {
        assert_eq!(decode_stream_volume("455").unwrap(), -36.5);
        assert_eq!(encode_stream_volume(-36.5).unwrap(), "455");
    }

    #[test]
    fn test_whole_step_decodes() {
        assert_eq!(decode_stream_volume("46").unwrap(), -36.0);
        assert_eq!(decode_stream_volume("82").unwrap(), 0.0);
        assert_eq!(encode_stream_volume(0.0).unwrap(), "82");
    }

    #[test]
    fn test_range_edges() {
        assert_eq!(decode_stream_volume("02").unwrap(), MIN_VOLUME_DB);
        assert_eq!(decode_stream_volume("100").unwrap(), MAX_VOLUME_DB);
        assert_eq!(decode_stream_volume("--").unwrap(), MIN_VOLUME_DB);
        assert_eq!(encode_stream_volume(MIN_VOLUME_DB).unwrap(), "02");
        assert_eq!(encode_stream_volume(MAX_VOLUME_DB).unwrap(), "100");
    }

    #[test]
    fn test_invalid_stream_volume() {
        assert!(decode_stream_volume("00").is_err());
        assert!(decode_stream_volume("4").is_err());
        assert!(decode_stream_volume("4555").is_err());
        assert!(decode_stream_volume("4a").is_err());
        assert!(decode_stream_volume("").is_err());
        assert!(decode_stream_volume("101").is_err());
    }

    #[test]
    fn test_status_volume() {
        assert_eq!(decode_status_volume("-36.5").unwrap(), -36.5);
        assert_eq!(decode_status_volume(" -80.0 ").unwrap(), -80.0);
        assert_eq!(decode_status_volume("--").unwrap(), -80.0);
        assert!(decode_status_volume("-81.0").is_err());
        assert!(decode_status_volume("loud").is_err());
    }

    #[test]
    fn test_volume_step_snaps_to_half() {
        assert_eq!(check_volume_step(-36.3).unwrap(), -36.5);
        assert_eq!(check_volume_step(-36.2).unwrap(), -36.0);
        assert!(check_volume_step(18.5).is_err());
        assert!(check_volume_step(f32::NAN).is_err());
    }

    #[test]
    fn test_tone_levels() {
        assert_eq!(decode_tone_level("50", true).unwrap(), 6);
        assert_eq!(decode_tone_level("44", true).unwrap(), 0);
        assert_eq!(decode_tone_level("56", true).unwrap(), 12);
        assert!(decode_tone_level("57", true).is_err());
        assert!(decode_tone_level("40", true).is_err());
        assert_eq!(decode_tone_level("6", false).unwrap(), 6);
        assert!(decode_tone_level("13", false).is_err());
    }

    #[test]
    fn test_tone_decibels() {
        assert_eq!(decode_tone_decibels("50", true).unwrap(), 0.0);
        assert_eq!(decode_tone_decibels("44", true).unwrap(), -6.0);
        assert_eq!(decode_tone_decibels("+4dB", false).unwrap(), 4.0);
        assert_eq!(decode_tone_decibels("-2dB", false).unwrap(), -2.0);
        assert_eq!(decode_tone_decibels(" 0dB ", false).unwrap(), 0.0);
        assert!(decode_tone_decibels("+7dB", false).is_err());
        assert!(decode_tone_decibels("flat", false).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every half step in range survives encoding
        #[test]
        fn prop_volume_codec_inverse(half_steps in 0u32..=196) {
            let decibels = MIN_VOLUME_DB + half_steps as f32 * 0.5;
            let token = encode_stream_volume(decibels).unwrap();
            prop_assert_eq!(decode_stream_volume(&token).unwrap(), decibels);
        }
    }
}
