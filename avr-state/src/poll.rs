//! Full-state refresh over HTTP
//!
//! A refresh fetches everything it needs before touching the store. Any fetch or decode failure
//! ends the refresh with [`StateError::RefreshFailed`] and the zone keeps its current state.
//! Commands sent to the receiver never reach the store by themselves; only a refresh or a push
//! event does.

use std::sync::Arc;
use std::time::Duration;

use avr_http::{appcommand, urls, AppCommand, HttpError, ReceiverClient, ZoneEndpoints};
use avr_stream::ZoneId;
use tokio::sync::mpsc;
use xmltree::Element;

use crate::decoder::{decode_audyssey, decode_status, decode_tone_control};
use crate::error::{Result, StateError};
use crate::store::{ApplyOutcome, ZoneStateStore};

/// Ceiling for the delay between polls after repeated failures
pub const MAX_POLL_BACKOFF: Duration = Duration::from_secs(300);

pub type FetchResult<T> = std::result::Result<T, HttpError>;

/// Where zone status documents come from
pub trait StatusSource: Send + Sync {
    /// Status document of `zone`
    fn fetch_status(&self, zone: &ZoneId) -> FetchResult<Element>;

    /// `GetToneControl` response element, if the zone has tone controls
    fn fetch_tone_control(&self, _zone: &ZoneId) -> FetchResult<Option<Element>> {
        Ok(None)
    }

    /// `GetAudyssey` response element, if the zone has Audyssey settings
    fn fetch_audyssey(&self, _zone: &ZoneId) -> FetchResult<Option<Element>> {
        Ok(None)
    }
}

fn endpoints_for(zone: &ZoneId) -> FetchResult<ZoneEndpoints> {
    zone.number()
        .and_then(ZoneEndpoints::for_number)
        .ok_or_else(|| HttpError::InvalidResponse {
            endpoint: zone.to_string(),
            reason: "no status endpoint for zone".to_string(),
        })
}

impl StatusSource for ReceiverClient {
    fn fetch_status(&self, zone: &ZoneId) -> FetchResult<Element> {
        let endpoints = endpoints_for(zone)?;
        self.get_xml(endpoints.status())
    }

    fn fetch_tone_control(&self, zone: &ZoneId) -> FetchResult<Option<Element>> {
        if !zone.is_main() {
            return Ok(None);
        }

        let command = AppCommand::get_tone_control();
        match self.post_appcommand(urls::APPCOMMAND_URL, std::slice::from_ref(&command)) {
            Ok(root) => Ok(appcommand::find_command(&root, "GetToneControl").cloned()),
            // Receivers without tone controls answer with an error page or an empty <rx>
            Err(HttpError::InvalidResponse { reason, .. }) => {
                tracing::debug!("No tone control on {}: {}", self.host(), reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn fetch_audyssey(&self, zone: &ZoneId) -> FetchResult<Option<Element>> {
        if !zone.is_main() {
            return Ok(None);
        }

        let command = AppCommand::get_audyssey();
        match self.post_appcommand(urls::APPCOMMAND0300_URL, std::slice::from_ref(&command)) {
            Ok(root) => Ok(appcommand::find_named_command(&root, "GetAudyssey").cloned()),
            // Older receivers have no AppCommand0300 endpoint at all
            Err(HttpError::Status(code)) => {
                tracing::debug!("No Audyssey endpoint on {}: HTTP {}", self.host(), code);
                Ok(None)
            }
            Err(HttpError::InvalidResponse { reason, .. }) => {
                tracing::debug!("No Audyssey settings on {}: {}", self.host(), reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Merges HTTP status documents into the store
#[derive(Clone)]
pub struct PollSynchronizer {
    source: Arc<dyn StatusSource>,
    store: ZoneStateStore,
}

impl PollSynchronizer {
    pub fn new(source: Arc<dyn StatusSource>, store: ZoneStateStore) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &ZoneStateStore {
        &self.store
    }

    /// Fetch and apply the full status of one zone as a single batch
    pub fn refresh(&self, zone: &ZoneId) -> Result<ApplyOutcome> {
        if !self.store.contains_zone(zone) {
            return Err(StateError::ZoneNotFound(zone.clone()));
        }
        let failed = |reason: String| StateError::RefreshFailed {
            zone: zone.clone(),
            reason,
        };

        let status = self
            .source
            .fetch_status(zone)
            .map_err(|e| failed(e.to_string()))?;
        let tone = self
            .source
            .fetch_tone_control(zone)
            .map_err(|e| failed(e.to_string()))?;
        let audyssey = self
            .source
            .fetch_audyssey(zone)
            .map_err(|e| failed(e.to_string()))?;

        let mut batch = decode_status(&status).map_err(|e| failed(e.to_string()))?;
        if let Some(cmd) = tone {
            batch.extend(decode_tone_control(&cmd));
        }
        if let Some(cmd) = audyssey {
            batch.extend(decode_audyssey(&cmd));
        }

        let outcome = self.store.apply(zone, &batch)?;
        tracing::debug!(
            "Refreshed {} (revision {}, {} changed)",
            zone,
            outcome.revision,
            outcome.changed.len()
        );
        Ok(outcome)
    }

    /// Refresh every tracked zone; one failing zone does not stop the others
    pub fn refresh_all(&self) -> Vec<(ZoneId, Result<ApplyOutcome>)> {
        self.store
            .zones()
            .into_iter()
            .map(|zone| {
                let result = self.refresh(&zone);
                if let Err(e) = &result {
                    tracing::warn!("{}", e);
                }
                (zone, result)
            })
            .collect()
    }

    /// Poll all zones every `interval` on a background task.
    ///
    /// Must be called from within a tokio runtime. Failed rounds stretch the delay to
    /// `interval * 2^min(failures, 6)`, capped at [`MAX_POLL_BACKOFF`].
    pub fn spawn_periodic(&self, interval: Duration) -> PollTask {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let synchronizer = self.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!("Starting periodic refresh every {:?}", interval);
            let mut failures: u32 = 0;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(poll_delay(interval, failures)) => {}
                }

                let round = synchronizer.clone();
                match tokio::task::spawn_blocking(move || round.refresh_all()).await {
                    Ok(results) if results.iter().all(|(_, result)| result.is_ok()) => failures = 0,
                    Ok(_) => failures = failures.saturating_add(1),
                    Err(e) => {
                        tracing::warn!("Refresh round aborted: {}", e);
                        failures = failures.saturating_add(1);
                    }
                }
            }

            tracing::debug!("Periodic refresh stopped");
        });

        PollTask {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl std::fmt::Debug for PollSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSynchronizer")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn poll_delay(interval: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return interval;
    }
    interval
        .saturating_mul(2u32.pow(failures.min(6)))
        .min(MAX_POLL_BACKOFF.max(interval))
}

/// Handle to a periodic refresh task
#[derive(Debug)]
pub struct PollTask {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl PollTask {
    /// Stop polling and wait for a round in progress to finish
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| StateError::Task(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
