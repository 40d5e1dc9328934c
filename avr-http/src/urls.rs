//! Endpoint paths of the receiver's HTTP interface

pub const APPCOMMAND_URL: &str = "/goform/AppCommand.xml";
pub const APPCOMMAND0300_URL: &str = "/goform/AppCommand0300.xml";

const DIRECT_URL: &str = "/goform/formiPhoneAppDirect.xml?";

/// Paths used to query and control one zone.
///
/// Zones are addressed by number in the power/volume/mute endpoints (`1` main, `2`, `3`) and by a
/// command prefix in the direct endpoint (`SI`/`MV` for main, `Z2`, `Z3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEndpoints {
    number: u8,
    status: &'static str,
    source_prefix: &'static str,
    volume_prefix: &'static str,
}

impl ZoneEndpoints {
    pub fn main() -> Self {
        Self {
            number: 1,
            status: "/goform/formMainZone_MainZoneXmlStatus.xml",
            source_prefix: "SI",
            volume_prefix: "MV",
        }
    }

    pub fn zone2() -> Self {
        Self {
            number: 2,
            status: "/goform/formZone2_Zone2XmlStatus.xml",
            source_prefix: "Z2",
            volume_prefix: "Z2",
        }
    }

    pub fn zone3() -> Self {
        Self {
            number: 3,
            status: "/goform/formZone3_Zone3XmlStatus.xml",
            source_prefix: "Z3",
            volume_prefix: "Z3",
        }
    }

    /// Endpoints for zone number 1, 2 or 3
    pub fn for_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::main()),
            2 => Some(Self::zone2()),
            3 => Some(Self::zone3()),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn is_main(&self) -> bool {
        self.number == 1
    }

    /// Status XML of this zone
    pub fn status(&self) -> &'static str {
        self.status
    }

    pub fn power_on(&self) -> String {
        format!("/goform/formiPhoneAppPower.xml?{}+PowerOn", self.number)
    }

    pub fn power_standby(&self) -> String {
        format!("/goform/formiPhoneAppPower.xml?{}+PowerStandby", self.number)
    }

    pub fn volume_up(&self) -> String {
        format!("{}{}UP", DIRECT_URL, self.volume_prefix)
    }

    pub fn volume_down(&self) -> String {
        format!("{}{}DOWN", DIRECT_URL, self.volume_prefix)
    }

    /// Absolute volume in decibels, written with one decimal
    pub fn set_volume(&self, decibels: f32) -> String {
        format!("/goform/formiPhoneAppVolume.xml?{}+{:.1}", self.number, decibels)
    }

    pub fn mute_on(&self) -> String {
        format!("/goform/formiPhoneAppMute.xml?{}+MuteOn", self.number)
    }

    pub fn mute_off(&self) -> String {
        format!("/goform/formiPhoneAppMute.xml?{}+MuteOff", self.number)
    }

    pub fn select_source(&self, source: &str) -> String {
        format!("{}{}{}", DIRECT_URL, self.source_prefix, encode_query(source))
    }

    /// Sound mode selection exists for the main zone only
    pub fn select_sound_mode(&self, mode: &str) -> Option<String> {
        self.is_main()
            .then(|| format!("{}MS{}", DIRECT_URL, encode_query(mode)))
    }
}

/// Percent-encode the characters that break the receiver's query parser
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b':' => {
                out.push(byte as char)
            }
            b' ' => out.push_str("%20"),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
