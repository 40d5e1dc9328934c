//! Zone handle
//!
//! One type serves the main zone and the secondary zones. The role decides what a zone may do:
//! only Main manages the event connection, creates secondary zones, selects sound modes and
//! adjusts tone controls and Audyssey settings. Every zone reads its own attribute table and
//! sends its own commands.
//!
//! Commands are sent over HTTP and never touch the attribute table. The new value shows up once
//! the receiver reports it on the event stream or a refresh reads it back.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use avr_http::{appcommand, urls, AppCommand, ReceiverClient, ZoneEndpoints};
use avr_state::audyssey::{self, Choice, DYNAMIC_VOLUME, MULTI_EQ, REFERENCE_LEVEL_OFFSET};
use avr_state::{
    volume, ApplyOutcome, AttributeKey, AttributeValue, HandlerError, PollSynchronizer,
    PowerState, SubscriptionId, ZoneChange, ZoneFilter, ZoneSnapshot, ZoneStateStore,
};
use avr_stream::{ConnectionEvent, ConnectionState, ConnectionSupervisor, EventDispatcher, ZoneId};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{Result, SdkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneRole {
    Main,
    Secondary,
}

/// Operations restricted by zone role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageZones,
    ManageConnection,
    SelectSoundMode,
    ToneControl,
    Audyssey,
}

impl ZoneRole {
    pub fn allows(&self, capability: Capability) -> bool {
        match self {
            ZoneRole::Main => true,
            ZoneRole::Secondary => match capability {
                Capability::ManageZones
                | Capability::ManageConnection
                | Capability::SelectSoundMode
                | Capability::ToneControl
                | Capability::Audyssey => false,
            },
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::ManageZones => "manage zones",
            Capability::ManageConnection => "manage the event connection",
            Capability::SelectSoundMode => "select sound modes",
            Capability::ToneControl => "adjust tone controls",
            Capability::Audyssey => "change Audyssey settings",
        })
    }
}

/// Everything the zones of one receiver share
pub(crate) struct DeviceContext {
    pub(crate) client: Arc<ReceiverClient>,
    pub(crate) store: ZoneStateStore,
    pub(crate) sync: PollSynchronizer,
    pub(crate) dispatcher: Arc<EventDispatcher>,
}

enum ConnectionLink {
    Owner(Arc<ConnectionSupervisor>),
    Shared(Weak<ConnectionSupervisor>),
}

struct ZoneInner {
    id: ZoneId,
    role: ZoneRole,
    endpoints: ZoneEndpoints,
    device: Arc<DeviceContext>,
    connection: ConnectionLink,
    secondaries: RwLock<BTreeMap<ZoneId, Zone>>,
    resync: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one zone of a receiver; clones share the same zone
#[derive(Clone)]
pub struct Zone {
    inner: Arc<ZoneInner>,
}

impl Zone {
    pub(crate) fn main(
        device: Arc<DeviceContext>,
        supervisor: Arc<ConnectionSupervisor>,
    ) -> Result<Self> {
        Self::create(
            ZoneId::main(),
            ZoneRole::Main,
            ZoneEndpoints::main(),
            device,
            ConnectionLink::Owner(supervisor),
        )
    }

    fn create(
        id: ZoneId,
        role: ZoneRole,
        endpoints: ZoneEndpoints,
        device: Arc<DeviceContext>,
        connection: ConnectionLink,
    ) -> Result<Self> {
        device.store.add_zone(id.clone())?;
        device.dispatcher.register_zone(id.clone());
        tracing::debug!("Created {:?} zone {}", role, id);

        Ok(Self {
            inner: Arc::new(ZoneInner {
                id,
                role,
                endpoints,
                device,
                connection,
                secondaries: RwLock::new(BTreeMap::new()),
                resync: Mutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> &ZoneId {
        &self.inner.id
    }

    pub fn role(&self) -> ZoneRole {
        self.inner.role
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.inner.role.allows(capability) {
            Ok(())
        } else {
            Err(SdkError::CapabilityDenied {
                zone: self.inner.id.clone(),
                role: self.inner.role,
                capability,
            })
        }
    }

    // ========================================================================
    // Zone management (Main only)
    // ========================================================================

    /// Start tracking a secondary zone, or return it if it is already tracked
    pub fn add_zone(&self, id: ZoneId) -> Result<Zone> {
        self.require(Capability::ManageZones)?;

        let endpoints = match id.number().and_then(ZoneEndpoints::for_number) {
            Some(endpoints) if !endpoints.is_main() => endpoints,
            _ => return Err(SdkError::UnsupportedZone(id)),
        };

        let mut secondaries = self.inner.secondaries.write();
        if let Some(existing) = secondaries.get(&id) {
            return Ok(existing.clone());
        }

        let supervisor = match &self.inner.connection {
            ConnectionLink::Owner(supervisor) => Arc::downgrade(supervisor),
            ConnectionLink::Shared(supervisor) => supervisor.clone(),
        };
        let zone = Zone::create(
            id.clone(),
            ZoneRole::Secondary,
            endpoints,
            Arc::clone(&self.inner.device),
            ConnectionLink::Shared(supervisor),
        )?;
        secondaries.insert(id, zone.clone());
        Ok(zone)
    }

    /// This zone or one of its secondary zones
    pub fn zone(&self, id: &ZoneId) -> Option<Zone> {
        if *id == self.inner.id {
            return Some(self.clone());
        }
        self.inner.secondaries.read().get(id).cloned()
    }

    pub fn secondary_zones(&self) -> Vec<Zone> {
        self.inner.secondaries.read().values().cloned().collect()
    }

    // ========================================================================
    // Event connection
    // ========================================================================

    fn supervisor(&self) -> Option<Arc<ConnectionSupervisor>> {
        match &self.inner.connection {
            ConnectionLink::Owner(supervisor) => Some(Arc::clone(supervisor)),
            ConnectionLink::Shared(supervisor) => supervisor.upgrade(),
        }
    }

    /// State of the shared event connection; `Closed` once the receiver is gone
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor()
            .map_or(ConnectionState::Closed, |supervisor| supervisor.state())
    }

    pub fn connection_events(&self) -> Option<broadcast::Receiver<ConnectionEvent>> {
        self.supervisor().map(|supervisor| supervisor.subscribe_events())
    }

    /// Open the event connection. Every time it reaches `Connected` all zones are refreshed.
    pub async fn connect(&self) -> Result<()> {
        self.require(Capability::ManageConnection)?;
        let Some(supervisor) = self.supervisor() else {
            return Err(SdkError::Stream(avr_stream::StreamError::NotConnected));
        };

        let events = supervisor.subscribe_events();
        supervisor.connect().await?;

        let handle = tokio::spawn(resync_on_connect(self.inner.device.sync.clone(), events));
        if let Some(previous) = self.inner.resync.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.require(Capability::ManageConnection)?;
        if let Some(supervisor) = self.supervisor() {
            supervisor.disconnect().await;
        }
        if let Some(resync) = self.inner.resync.lock().take() {
            resync.abort();
        }
        Ok(())
    }

    // ========================================================================
    // State
    // ========================================================================

    fn store(&self) -> &ZoneStateStore {
        &self.inner.device.store
    }

    pub(crate) fn synchronizer(&self) -> &PollSynchronizer {
        &self.inner.device.sync
    }

    pub(crate) fn client(&self) -> &ReceiverClient {
        &self.inner.device.client
    }

    pub fn snapshot(&self) -> Result<ZoneSnapshot> {
        Ok(self.store().snapshot(&self.inner.id)?)
    }

    pub fn get(&self, key: AttributeKey) -> Option<AttributeValue> {
        self.store().get(&self.inner.id, key).ok().flatten()
    }

    pub fn power(&self) -> Option<PowerState> {
        self.get(AttributeKey::Power)?.as_power()
    }

    /// Volume in dB
    pub fn volume(&self) -> Option<f32> {
        self.get(AttributeKey::Volume)?.as_decibels()
    }

    pub fn is_muted(&self) -> Option<bool> {
        self.get(AttributeKey::Mute)?.as_switch()
    }

    pub fn input_source(&self) -> Option<String> {
        self.get(AttributeKey::InputSource)?.as_text().map(str::to_string)
    }

    pub fn sound_mode(&self) -> Option<String> {
        self.get(AttributeKey::SoundMode)?.as_text().map(str::to_string)
    }

    pub fn bass(&self) -> Option<u8> {
        self.get(AttributeKey::Bass)?.as_level()
    }

    pub fn treble(&self) -> Option<u8> {
        self.get(AttributeKey::Treble)?.as_level()
    }

    /// Bass gain in dB
    pub fn bass_level(&self) -> Option<f32> {
        self.get(AttributeKey::BassLevel)?.as_decibels()
    }

    /// Treble gain in dB
    pub fn treble_level(&self) -> Option<f32> {
        self.get(AttributeKey::TrebleLevel)?.as_decibels()
    }

    /// Whether tone controls can be used; the receiver turns them off while Dynamic EQ is on
    pub fn tone_control_available(&self) -> Option<bool> {
        self.get(AttributeKey::ToneControlAvailable)?.as_switch()
    }

    pub fn tone_control_adjust(&self) -> Option<bool> {
        self.get(AttributeKey::ToneControlAdjust)?.as_switch()
    }

    pub fn dynamic_eq(&self) -> Option<bool> {
        self.get(AttributeKey::DynamicEq)?.as_switch()
    }

    pub fn multi_eq(&self) -> Option<String> {
        self.get(AttributeKey::MultiEq)?.as_text().map(str::to_string)
    }

    pub fn reference_level_offset(&self) -> Option<String> {
        self.get(AttributeKey::ReferenceLevelOffset)?
            .as_text()
            .map(str::to_string)
    }

    pub fn dynamic_volume(&self) -> Option<String> {
        self.get(AttributeKey::DynamicVolume)?.as_text().map(str::to_string)
    }

    /// Read the zone's full status from the receiver and apply it
    pub fn refresh(&self) -> Result<ApplyOutcome> {
        Ok(self.inner.device.sync.refresh(&self.inner.id)?)
    }

    /// Refresh, then check that `key` now holds `expected`.
    ///
    /// The receiver answers commands it ignores with HTTP 200 as well; this is the way to find
    /// out whether one took effect.
    pub fn refresh_and_confirm(&self, key: AttributeKey, expected: &AttributeValue) -> Result<()> {
        self.refresh()?;
        match self.get(key) {
            Some(actual) if actual == *expected => Ok(()),
            actual => Err(SdkError::CommandRejected {
                key,
                expected: expected.to_string(),
                actual: actual.map(|value| value.to_string()),
            }),
        }
    }

    /// Subscribe to changes of this zone
    pub fn on_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ZoneChange) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.store()
            .registry()
            .register(ZoneFilter::Zone(self.inner.id.clone()), handler)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn command(&self, path: &str) -> Result<()> {
        tracing::debug!("{} command {}", self.inner.id, path);
        self.inner.device.client.get_command(path)?;
        Ok(())
    }

    pub fn power_on(&self) -> Result<()> {
        self.command(&self.inner.endpoints.power_on())
    }

    pub fn power_off(&self) -> Result<()> {
        self.command(&self.inner.endpoints.power_standby())
    }

    pub fn volume_up(&self) -> Result<()> {
        self.command(&self.inner.endpoints.volume_up())
    }

    pub fn volume_down(&self) -> Result<()> {
        self.command(&self.inner.endpoints.volume_down())
    }

    /// Absolute volume in dB, -80.0 to 18.0 in 0.5 steps
    pub fn set_volume(&self, decibels: f32) -> Result<()> {
        let decibels = volume::check_volume_step(decibels)?;
        self.command(&self.inner.endpoints.set_volume(decibels))
    }

    pub fn set_mute(&self, muted: bool) -> Result<()> {
        if muted {
            self.command(&self.inner.endpoints.mute_on())
        } else {
            self.command(&self.inner.endpoints.mute_off())
        }
    }

    /// Select an input by its stream token (`CD`, `SAT/CBL`, `TUNER`, ...)
    pub fn select_input(&self, source: &str) -> Result<()> {
        let source = source.trim();
        if source.is_empty() {
            return Err(SdkError::InvalidArgument("input source is empty".to_string()));
        }
        self.command(&self.inner.endpoints.select_source(source))
    }

    pub fn set_sound_mode(&self, mode: &str) -> Result<()> {
        self.require(Capability::SelectSoundMode)?;
        let mode = mode.trim();
        if mode.is_empty() {
            return Err(SdkError::InvalidArgument("sound mode is empty".to_string()));
        }
        let path = self
            .inner
            .endpoints
            .select_sound_mode(mode)
            .ok_or_else(|| SdkError::UnsupportedZone(self.inner.id.clone()))?;
        self.command(&path)
    }

    /// Switch tone control adjustment on or off.
    ///
    /// Refused while the receiver reports tone controls as unavailable.
    pub fn set_tone_control(&self, enabled: bool) -> Result<()> {
        self.require(Capability::ToneControl)?;
        if self.tone_control_available() == Some(false) {
            return Err(SdkError::InvalidArgument(
                "tone control is unavailable while Dynamic EQ is on".to_string(),
            ));
        }
        self.tone_command("adjust", u8::from(enabled))
    }

    /// Bass level 0 to 12; enables tone control adjustment first
    pub fn set_bass(&self, level: u8) -> Result<()> {
        volume::check_tone_level(level)?;
        self.set_tone_control(true)?;
        self.tone_command("bassvalue", level)
    }

    /// Treble level 0 to 12; enables tone control adjustment first
    pub fn set_treble(&self, level: u8) -> Result<()> {
        volume::check_tone_level(level)?;
        self.set_tone_control(true)?;
        self.tone_command("treblevalue", level)
    }

    /// One bass level up from the stored level; nothing is sent at the top of the range
    pub fn bass_up(&self) -> Result<()> {
        self.step_tone(AttributeKey::Bass, "bassvalue", true)
    }

    pub fn bass_down(&self) -> Result<()> {
        self.step_tone(AttributeKey::Bass, "bassvalue", false)
    }

    pub fn treble_up(&self) -> Result<()> {
        self.step_tone(AttributeKey::Treble, "treblevalue", true)
    }

    pub fn treble_down(&self) -> Result<()> {
        self.step_tone(AttributeKey::Treble, "treblevalue", false)
    }

    fn step_tone(&self, key: AttributeKey, parameter: &str, up: bool) -> Result<()> {
        self.require(Capability::ToneControl)?;
        let current = self
            .get(key)
            .and_then(|value| value.as_level())
            .ok_or_else(|| SdkError::InvalidArgument(format!("{} level is unknown", key)))?;

        let next = if up {
            Some(current + 1).filter(|level| *level <= volume::MAX_TONE_LEVEL)
        } else {
            current.checked_sub(1)
        };
        let Some(next) = next else {
            tracing::debug!("{} {} already at {}", self.inner.id, key, current);
            return Ok(());
        };

        self.set_tone_control(true)?;
        self.tone_command(parameter, next)
    }

    fn tone_command(&self, parameter: &str, value: u8) -> Result<()> {
        let command = AppCommand::set_tone_control(parameter, value);
        tracing::debug!("{} tone control {}={}", self.inner.id, parameter, value);
        self.inner
            .device
            .client
            .post_appcommand(urls::APPCOMMAND_URL, std::slice::from_ref(&command))?;
        Ok(())
    }

    pub fn set_dynamic_eq(&self, enabled: bool) -> Result<()> {
        self.require(Capability::Audyssey)?;
        self.audyssey_command("dynamiceq", if enabled { "1" } else { "0" })
    }

    /// MultEQ by label: `Off`, `Flat`, `L/R Bypass` or `Reference`
    pub fn set_multi_eq(&self, label: &str) -> Result<()> {
        self.require(Capability::Audyssey)?;
        let code = choice_code("MultEQ", MULTI_EQ, label)?;
        self.audyssey_command("multieq", code)
    }

    /// Reference level offset by label (`0dB` to `+15dB`); only accepted while Dynamic EQ is on
    pub fn set_reference_level_offset(&self, label: &str) -> Result<()> {
        self.require(Capability::Audyssey)?;
        let code = choice_code("reference level offset", REFERENCE_LEVEL_OFFSET, label)?;
        if self.dynamic_eq() != Some(true) {
            return Err(SdkError::InvalidArgument(
                "reference level offset needs Dynamic EQ on".to_string(),
            ));
        }
        self.audyssey_command("reflevoffset", code)
    }

    /// Dynamic Volume by label: `Off`, `Light`, `Medium` or `Heavy`
    pub fn set_dynamic_volume(&self, label: &str) -> Result<()> {
        self.require(Capability::Audyssey)?;
        let code = choice_code("Dynamic Volume", DYNAMIC_VOLUME, label)?;
        self.audyssey_command("dynamicvol", code)
    }

    fn audyssey_command(&self, parameter: &str, code: &str) -> Result<()> {
        let command = AppCommand::set_audyssey(parameter, code);
        tracing::debug!("{} Audyssey {}={}", self.inner.id, parameter, code);
        let root = self
            .inner
            .device
            .client
            .post_appcommand(urls::APPCOMMAND0300_URL, std::slice::from_ref(&command))?;

        let reply = appcommand::find_named_command(&root, "SetAudyssey")
            .and_then(|cmd| cmd.get_text())
            .map(|text| text.trim().to_string());
        if reply.as_deref() != Some("OK") {
            tracing::warn!(
                "{} Audyssey {}={} answered {:?}",
                self.inner.id,
                parameter,
                code,
                reply
            );
        }
        Ok(())
    }
}

fn choice_code(setting: &str, choices: &[Choice], label: &str) -> Result<&'static str> {
    audyssey::code_for_label(choices, label).ok_or_else(|| {
        SdkError::InvalidArgument(format!(
            "unknown {} {:?}, expected one of {:?}",
            setting,
            label,
            audyssey::labels(choices)
        ))
    })
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("connection", &self.connection_state())
            .finish()
    }
}

impl Drop for ZoneInner {
    fn drop(&mut self) {
        if let Some(resync) = self.resync.get_mut().take() {
            resync.abort();
        }
    }
}

/// Refresh every zone each time the connection comes up
async fn resync_on_connect(
    sync: PollSynchronizer,
    mut events: broadcast::Receiver<ConnectionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::StateChanged(ConnectionState::Connected)) => {
                let round = sync.clone();
                match tokio::task::spawn_blocking(move || round.refresh_all()).await {
                    Ok(results) => {
                        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
                        tracing::debug!(
                            "Resync after connect: {} zone(s), {} failed",
                            results.len(),
                            failed
                        );
                    }
                    Err(e) => tracing::warn!("Resync after connect aborted: {}", e),
                }
            }
            Ok(ConnectionEvent::ConnectionFailed { attempts, reason }) => {
                tracing::warn!("Event connection gave up after {} attempts: {}", attempts, reason);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Missed {} connection events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
