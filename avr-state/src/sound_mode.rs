//! Sound mode families and input source aliases

/// Raw sound modes grouped by the family they are reported as
pub const SOUND_MODE_FAMILIES: &[(&str, &[&str])] = &[
    (
        "MUSIC",
        &["PLII MUSIC", "DTS NEO:6 MUSIC", "DOLBY D +NEO:X M", "DTS NEO:X MUSIC", "DOLBY PL2 MUSIC", "PLIIX MUSIC"],
    ),
    (
        "MOVIE",
        &[
            "PLII MOVIE", "PLII CINEMA", "DTS NEO:X CINEMA", "DTS NEO:6 CINEMA", "DOLBY D +NEO:X C",
            "PLIIX CINEMA", "DOLBY PLII MOVIE", "MULTI IN + VIRTUAL:X", "DOLBY PL2 CINEMA",
        ],
    ),
    ("GAME", &["PLII GAME", "DOLBY D +NEO:X G", "DOLBY PL2 GAME"]),
    ("AUTO", &["NONE"]),
    ("STANDARD", &["NONE2"]),
    ("VIRTUAL", &["VIRTUAL"]),
    ("MATRIX", &["MATRIX"]),
    ("ROCK ARENA", &["ROCK ARENA"]),
    ("JAZZ CLUB", &["JAZZ CLUB"]),
    ("VIDEO GAME", &["VIDEO GAME"]),
    ("MONO MOVIE", &["MONO MOVIE"]),
    ("DIRECT", &["DIRECT"]),
    ("PURE DIRECT", &["PURE_DIRECT", "PURE DIRECT"]),
    (
        "DOLBY DIGITAL",
        &[
            "DOLBY DIGITAL", "DOLBY D + DOLBY SURROUND", "DOLBY DIGITAL +", "STANDARD(DOLBY)",
            "DOLBY SURROUND", "DOLBY D + +DOLBY SURROUND", "NEURAL", "DOLBY HD",
            "DOLBY HD + DOLBY SURROUND", "MULTI IN + DSUR", "MULTI IN + NEURAL:X",
            "MULTI IN + DOLBY SURROUND", "DOLBY D + NEURAL:X", "DOLBY DIGITAL + NEURAL:X",
            "DOLBY DIGITAL + + NEURAL:X", "DOLBY ATMOS", "DOLBY AUDIO - DOLBY SURROUND",
            "DOLBY TRUEHD", "DOLBY AUDIO - DOLBY DIGITAL PLUS", "DOLBY AUDIO - TRUEHD + DSUR",
            "DOLBY AUDIO - DOLBY TRUEHD", "DOLBY AUDIO - TRUEHD + NEURAL:X",
            "DOLBY AUDIO - DD + DSUR", "DOLBY AUDIO - DD+ + NEURAL:X", "DOLBY AUDIO - DD+ + DSUR",
            "DOLBY AUDIO - DOLBY DIGITAL",
        ],
    ),
    (
        "DTS SURROUND",
        &[
            "DTS SURROUND", "DTS NEURAL:X", "STANDARD(DTS)", "DTS + NEURAL:X", "MULTI CH IN",
            "DTS-HD MSTR", "DTS VIRTUAL:X", "DTS-HD + NEURAL:X", "DTS-HD", "DTS + VIRTUAL:X",
            "DTS + DOLBY SURROUND", "DTS-HD + DOLBY SURROUND", "DTS-HD + DSUR", "DTS:X MSTR",
        ],
    ),
    ("AURO3D", &["AURO-3D", "AURO-2D SURROUND"]),
    ("MCH STEREO", &["MULTI CH STEREO", "MULTI_CH_STEREO", "MCH STEREO", "MULTI CH IN 7.1"]),
    ("STEREO", &["STEREO"]),
    ("ALL ZONE STEREO", &["ALL ZONE STEREO"]),
];

/// Status XML source names and the stream token they stand for
pub const SOURCE_ALIASES: &[(&str, &str)] = &[
    ("TV AUDIO", "TV"),
    ("iPod/USB", "USB/IPOD"),
    ("Bluetooth", "BT"),
    ("Blu-ray", "BD"),
    ("CBL/SAT", "SAT/CBL"),
    ("NETWORK", "NET"),
    ("Media Player", "MPLAY"),
    ("AUX", "AUX1"),
    ("Tuner", "TUNER"),
    ("FM", "TUNER"),
    ("SpotifyConnect", "Spotify Connect"),
];

/// Upper case with runs of whitespace collapsed
pub fn normalize_sound_mode(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Family a raw sound mode belongs to.
///
/// Unknown modes are placed by keyword; anything unrecognised is reported as itself.
pub fn match_sound_mode(raw: &str) -> String {
    let normalized = normalize_sound_mode(raw);

    let known = SOUND_MODE_FAMILIES.iter().find_map(|(family, modes)| {
        modes
            .iter()
            .any(|mode| normalize_sound_mode(mode) == normalized)
            .then_some(*family)
    });
    if let Some(family) = known {
        return family.to_string();
    }

    let estimated = if normalized.contains("DTS") {
        Some("DTS SURROUND")
    } else if normalized.contains("DOLBY") {
        Some("DOLBY DIGITAL")
    } else if normalized.contains("MUSIC") {
        Some("MUSIC")
    } else if normalized.contains("AURO") {
        Some("AURO3D")
    } else if normalized.contains("MOVIE") || normalized.contains("CINEMA") {
        Some("MOVIE")
    } else {
        None
    };

    match estimated {
        Some(family) => {
            tracing::warn!("Unknown sound mode {:?}, assuming {}", normalized, family);
            family.to_string()
        }
        None => normalized,
    }
}

/// Map a status XML source name to its stream token
pub fn normalize_source(raw: &str) -> String {
    let raw = raw.trim();
    SOURCE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, token)| token.to_string())
        .unwrap_or_else(|| raw.to_string())
}
