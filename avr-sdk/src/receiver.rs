//! Receiver entry point
//!
//! Wires one receiver's HTTP client, attribute store, telnet event connection and background
//! refresh together and hands out the zone handles built on them.

use std::sync::Arc;
use std::time::Duration;

use avr_http::ReceiverClient;
use avr_state::{
    ApplyOutcome, AttributeKey, HandlerError, PollSynchronizer, PollTask, StatusSource,
    SubscriptionId, ZoneChange, ZoneFilter, ZoneStateStore,
};
use avr_stream::{ConnectionEvent, ConnectionState, ConnectionSupervisor, EventDispatcher, ZoneId};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::ReceiverConfig;
use crate::error::{Result, SdkError};
use crate::zone::{DeviceContext, Zone};

/// One Denon or Marantz receiver with its zones.
///
/// Owns the HTTP client, the attribute store, the telnet event connection and the optional
/// background refresh. Dropping the receiver stops the background refresh. The event connection
/// closes once the last handle to the main zone is gone; secondary zone handles that outlive it
/// report `Closed` and keep reading the last known state.
pub struct Receiver {
    config: ReceiverConfig,
    main: Zone,
    supervisor: Arc<ConnectionSupervisor>,
    poll_task: Mutex<Option<PollTask>>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(
            ReceiverClient::with_timeouts(
                config.host.clone(),
                config.http_connect_timeout,
                config.http_read_timeout,
            )
            .with_port(config.http_port),
        );
        let store = ZoneStateStore::new();
        let source: Arc<dyn StatusSource> = client.clone();
        let sync = PollSynchronizer::new(source, store.clone());

        let dispatcher = Arc::new(EventDispatcher::new());
        dispatcher.add_listener(Arc::new(store.clone()));
        let supervisor = Arc::new(ConnectionSupervisor::new(
            config.stream.clone(),
            Arc::clone(&dispatcher),
        ));

        let device = Arc::new(DeviceContext {
            client,
            store,
            sync,
            dispatcher,
        });
        let main = Zone::main(device, Arc::clone(&supervisor))?;
        for zone in &config.secondary_zones {
            main.add_zone(zone.clone())?;
        }

        tracing::info!(
            "Receiver {} with zones {:?}",
            config.host,
            main.secondary_zones()
                .iter()
                .map(|zone| zone.id().to_string())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            config,
            main,
            supervisor,
            poll_task: Mutex::new(None),
        })
    }

    /// Receiver at `host` with default settings, Main zone only
    pub fn with_host(host: impl Into<String>) -> Result<Self> {
        Self::new(ReceiverConfig::new(host))
    }

    /// Discover receivers on the local network, each tracking its Main zone only
    pub fn discover(timeout: Duration) -> Result<Vec<Receiver>> {
        avr_discovery::get_with_timeout(timeout)
            .into_iter()
            .map(|device| {
                tracing::info!(
                    "Discovered {} {} \"{}\" at {}",
                    device.manufacturer,
                    device.model_name,
                    device.name,
                    device.host
                );
                Receiver::with_host(device.host)
            })
            .collect()
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    // ========================================================================
    // Zones
    // ========================================================================

    pub fn main(&self) -> &Zone {
        &self.main
    }

    pub fn zone(&self, id: &ZoneId) -> Option<Zone> {
        self.main.zone(id)
    }

    /// Main first, then secondary zones by id
    pub fn zones(&self) -> Vec<Zone> {
        let mut zones = vec![self.main.clone()];
        zones.extend(self.main.secondary_zones());
        zones
    }

    pub fn add_zone(&self, id: ZoneId) -> Result<Zone> {
        self.main.add_zone(id)
    }

    // ========================================================================
    // Change notifications
    // ========================================================================

    /// Register a handler for changes of the zones `filter` selects
    pub fn on_change<F>(&self, filter: ZoneFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ZoneChange) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.store().registry().register(filter, handler)
    }

    /// Like [`on_change`](Self::on_change), for changes touching one of `keys`
    pub fn on_change_keys<F>(
        &self,
        filter: ZoneFilter,
        keys: &[AttributeKey],
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&ZoneChange) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.store().registry().register_keys(filter, keys, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store().registry().unregister(id)
    }

    fn store(&self) -> &ZoneStateStore {
        self.sync().store()
    }

    fn sync(&self) -> &PollSynchronizer {
        self.main.synchronizer()
    }

    // ========================================================================
    // Event connection
    // ========================================================================

    pub async fn connect_events(&self) -> Result<()> {
        self.main.connect().await
    }

    pub async fn disconnect_events(&self) -> Result<()> {
        self.main.disconnect().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.supervisor.subscribe_events()
    }

    /// Send a raw telnet command such as `PW?` over the event connection
    pub async fn send_raw_command(&self, command: &str) -> Result<()> {
        let command = command.trim();
        if command.is_empty() {
            return Err(SdkError::InvalidArgument("command is empty".to_string()));
        }
        self.supervisor.send_command(command).await?;
        Ok(())
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Refresh every zone once; a failing zone leaves the others unaffected
    pub fn refresh_all(&self) -> Vec<(ZoneId, Result<ApplyOutcome>)> {
        self.sync()
            .refresh_all()
            .into_iter()
            .map(|(zone, result)| (zone, result.map_err(SdkError::from)))
            .collect()
    }

    /// Start the configured background refresh. Needs a tokio runtime.
    ///
    /// Returns `false` when no poll interval is configured or polling already runs.
    pub fn start_polling(&self) -> Result<bool> {
        let Some(interval) = self.config.poll_interval else {
            return Ok(false);
        };
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SdkError::Configuration(
                "background refresh needs a tokio runtime".to_string(),
            ));
        }

        let mut task = self.poll_task.lock();
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(false);
        }
        *task = Some(self.sync().spawn_periodic(interval));
        Ok(true)
    }

    pub async fn stop_polling(&self) -> Result<()> {
        let task = self.poll_task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
        }
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Friendly name as configured on the receiver
    pub fn friendly_name(&self) -> Result<String> {
        Ok(self.main.client().friendly_name()?)
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("host", &self.config.host)
            .field("zones", &self.zones())
            .field("connection", &self.connection_state())
            .finish()
    }
}
