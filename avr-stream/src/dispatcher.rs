//! Tag-prefix classification and routing of stream lines
//!
//! Every line on the stream starts with a tag naming the zone and category (`MV455`, `Z2ON`,
//! `NSE1Title`). The dispatcher turns a line into an [`EventRecord`] and hands it to every
//! registered listener, synchronously and in arrival order. Lines with an unknown tag, and lines
//! for zones that were never registered, are dropped.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{EventKind, EventRecord, ZoneId, TELNET_SOURCES};

/// Receives every accepted event record.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &EventRecord);
}

impl<F> EventListener for F
where
    F: Fn(&EventRecord) + Send + Sync,
{
    fn on_event(&self, event: &EventRecord) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy)]
enum Tag {
    Main(EventKind),
    MainVolume,
    Secondary(&'static str),
}

/// Tags ordered longest first so that the most specific prefix wins
const TAGS: &[(&str, Tag)] = &[
    ("NSE", Tag::Main(EventKind::NetAudio)),
    ("PW", Tag::Main(EventKind::Power)),
    ("ZM", Tag::Main(EventKind::ZonePower)),
    ("MV", Tag::MainVolume),
    ("MU", Tag::Main(EventKind::Mute)),
    ("SI", Tag::Main(EventKind::Input)),
    ("MS", Tag::Main(EventKind::SoundMode)),
    ("PS", Tag::Main(EventKind::Parameter)),
    ("TF", Tag::Main(EventKind::Tuner)),
    ("Z2", Tag::Secondary("Zone2")),
    ("Z3", Tag::Secondary("Zone3")),
];

/// Map a line to `(zone, kind, parameter)` without looking at registered zones
pub fn classify(line: &str) -> Option<(ZoneId, EventKind, String)> {
    let (tag, rest) = TAGS
        .iter()
        .find_map(|(prefix, tag)| line.strip_prefix(prefix).map(|rest| (*tag, rest)))?;

    match tag {
        Tag::Main(kind) => Some((ZoneId::main(), kind, rest.to_string())),
        // MVMAX reports the volume limit, not the volume
        Tag::MainVolume if rest.starts_with("MAX") => None,
        Tag::MainVolume => Some((ZoneId::main(), EventKind::Volume, rest.to_string())),
        Tag::Secondary(zone) => {
            classify_secondary(rest).map(|(kind, param)| (ZoneId::new(zone), kind, param))
        }
    }
}

fn classify_secondary(rest: &str) -> Option<(EventKind, String)> {
    if rest == "ON" || rest == "OFF" {
        return Some((EventKind::ZonePower, rest.to_string()));
    }
    if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
        return Some((EventKind::Volume, rest.to_string()));
    }
    if let Some(mute) = rest.strip_prefix("MU") {
        return Some((EventKind::Mute, mute.to_string()));
    }
    if let Some(param) = rest.strip_prefix("PS") {
        return Some((EventKind::Parameter, param.to_string()));
    }
    if TELNET_SOURCES.contains(&rest) {
        return Some((EventKind::Input, rest.to_string()));
    }
    None
}

/// Routes classified lines to listeners for registered zones.
#[derive(Default)]
pub struct EventDispatcher {
    zones: RwLock<HashSet<ZoneId>>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_zone(&self, zone: ZoneId) {
        self.zones.write().insert(zone);
    }

    pub fn unregister_zone(&self, zone: &ZoneId) -> bool {
        self.zones.write().remove(zone)
    }

    pub fn is_registered(&self, zone: &ZoneId) -> bool {
        self.zones.read().contains(zone)
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    /// Classify `line` and deliver it to every listener.
    ///
    /// Returns the delivered record, or `None` when the line was dropped.
    pub fn dispatch(&self, line: &str) -> Option<EventRecord> {
        let Some((zone, kind, parameter)) = classify(line) else {
            tracing::debug!("Dropping line with unknown tag: {:?}", line);
            return None;
        };

        if !self.is_registered(&zone) {
            tracing::debug!("Dropping {:?} for unregistered zone {}", line, zone);
            return None;
        }

        let record = EventRecord::new(zone, kind, parameter);
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_event(&record);
        }
        Some(record)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("zones", &*self.zones.read())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_dispatcher() -> (EventDispatcher, Arc<Mutex<Vec<EventRecord>>>) {
        let dispatcher = EventDispatcher::new();
        dispatcher.register_zone(ZoneId::main());
        dispatcher.register_zone(ZoneId::zone2());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.add_listener(Arc::new(move |event: &EventRecord| {
            sink.lock().push(event.clone());
        }));
        (dispatcher, seen)
    }

    #[test]
    fn test_nse_wins_over_shorter_prefixes() {
        let (zone, kind, param) = classify("NSE1Hey Jude").unwrap();
        assert_eq!(zone, ZoneId::main());
        assert_eq!(kind, EventKind::NetAudio);
        assert_eq!(param, "1Hey Jude");
    }

    #[test]
    fn test_mvmax_is_dropped() {
        assert!(classify("MVMAX 98").is_none());
        assert_eq!(classify("MV455").unwrap().2, "455");
    }

    #[test]
    fn test_unknown_tag_is_dropped() {
        let (dispatcher, seen) = recording_dispatcher();
        assert!(dispatcher.dispatch("CVFL 50").is_none());
        assert!(dispatcher.dispatch("Z2CVFL 50").is_none());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unregistered_zone_is_dropped() {
        let (dispatcher, seen) = recording_dispatcher();
        assert!(dispatcher.dispatch("Z3ON").is_none());
        assert!(dispatcher.dispatch("Z2ON").is_some());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_delivery_preserves_wire_order() {
        let (dispatcher, seen) = recording_dispatcher();
        for line in ["MV455", "Z2MUON", "MV46", "MUON", "Z250"] {
            dispatcher.dispatch(line);
        }

        let seen = seen.lock();
        let params: Vec<(&str, &str)> = seen
            .iter()
            .map(|e| (e.zone.as_str(), e.parameter.as_str()))
            .collect();
        assert_eq!(
            params,
            vec![
                ("Main", "455"),
                ("Zone2", "ON"),
                ("Main", "46"),
                ("Main", "ON"),
                ("Zone2", "50")
            ]
        );
    }

    #[test]
    fn test_unregister_zone() {
        let (dispatcher, seen) = recording_dispatcher();
        assert!(dispatcher.unregister_zone(&ZoneId::zone2()));
        assert!(dispatcher.dispatch("Z2ON").is_none());
        assert!(seen.lock().is_empty());
    }
}
