//! Per-zone attribute tables
//!
//! Every zone has its own slot. `apply` calls on one zone are serialized by the slot's apply lock,
//! and the attribute table is only written while its `RwLock` is held for the whole batch, so a
//! reader sees either all of a batch or none of it. Different zones never contend.
//!
//! ```text
//! ZoneStateStore
//! ├── zones: DashMap<ZoneId, Arc<ZoneSlot>>
//! │   └── ZoneSlot
//! │       ├── apply_lock: Mutex<()>      (one writer per zone, held through notify)
//! │       └── table: RwLock<ZoneTable>   (revision + attribute values)
//! └── registry: CallbackRegistry
//! ```
//!
//! Subscribers are notified after the table lock is released but before the apply lock is, so
//! notifications for one zone arrive in apply order. A handler must not apply to the zone it is
//! being notified about.

use std::collections::BTreeMap;
use std::sync::Arc;

use avr_stream::{EventListener, EventRecord, ZoneId};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::attribute::{AttributeKey, AttributeValue};
use crate::decoder::{decode_event, UpdateBatch};
use crate::error::{ParseError, Result, StateError};
use crate::registry::{AttributeChange, CallbackRegistry, ZoneChange};

#[derive(Debug, Default)]
struct ZoneTable {
    revision: u64,
    values: BTreeMap<AttributeKey, AttributeValue>,
}

#[derive(Debug, Default)]
struct ZoneSlot {
    apply_lock: Mutex<()>,
    table: RwLock<ZoneTable>,
}

/// Point-in-time copy of one zone's attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub zone: ZoneId,
    /// Number of batches applied to the zone so far
    pub revision: u64,
    pub attributes: BTreeMap<AttributeKey, AttributeValue>,
}

impl ZoneSnapshot {
    pub fn get(&self, key: AttributeKey) -> Option<&AttributeValue> {
        self.attributes.get(&key)
    }
}

/// Result of one `apply`
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    /// Zone revision assigned to this batch
    pub revision: u64,
    /// Attributes whose value actually changed
    pub changed: Vec<AttributeKey>,
    /// Updates dropped because their raw value did not parse
    pub skipped: Vec<ParseError>,
}

/// Authoritative attribute state for every zone of one receiver
#[derive(Clone, Default)]
pub struct ZoneStateStore {
    zones: Arc<DashMap<ZoneId, Arc<ZoneSlot>>>,
    registry: CallbackRegistry,
}

impl ZoneStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store notifying an existing registry
    pub fn with_registry(registry: CallbackRegistry) -> Self {
        Self {
            zones: Arc::new(DashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn add_zone(&self, zone: ZoneId) -> Result<()> {
        match self.zones.entry(zone) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(StateError::ZoneExists(entry.key().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                tracing::debug!("Tracking zone {}", entry.key());
                entry.insert(Arc::new(ZoneSlot::default()));
                Ok(())
            }
        }
    }

    pub fn remove_zone(&self, zone: &ZoneId) -> bool {
        self.zones.remove(zone).is_some()
    }

    pub fn contains_zone(&self, zone: &ZoneId) -> bool {
        self.zones.contains_key(zone)
    }

    /// Tracked zones, sorted
    pub fn zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self.zones.iter().map(|entry| entry.key().clone()).collect();
        zones.sort();
        zones
    }

    fn slot(&self, zone: &ZoneId) -> Result<Arc<ZoneSlot>> {
        self.zones
            .get(zone)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StateError::ZoneNotFound(zone.clone()))
    }

    pub fn snapshot(&self, zone: &ZoneId) -> Result<ZoneSnapshot> {
        let slot = self.slot(zone)?;
        let table = slot.table.read();
        Ok(ZoneSnapshot {
            zone: zone.clone(),
            revision: table.revision,
            attributes: table.values.clone(),
        })
    }

    pub fn get(&self, zone: &ZoneId, key: AttributeKey) -> Result<Option<AttributeValue>> {
        let slot = self.slot(zone)?;
        let value = slot.table.read().values.get(&key).cloned();
        Ok(value)
    }

    /// Merge `batch` into the zone's table.
    ///
    /// Each update is parsed on its own; one that fails is logged and skipped while the rest of
    /// the batch still applies. Attributes not in the batch keep their values. Subscribers are
    /// notified once with the net changes, and not at all if nothing changed.
    pub fn apply(&self, zone: &ZoneId, batch: &UpdateBatch) -> Result<ApplyOutcome> {
        let slot = self.slot(zone)?;
        let _writer = slot.apply_lock.lock();

        let mut parsed = Vec::with_capacity(batch.len());
        let mut skipped = Vec::new();
        for (key, raw) in &batch.updates {
            match key.parse(raw, batch.source) {
                Ok(value) => parsed.push((*key, value)),
                Err(e) => {
                    tracing::warn!("Skipping {} update for {}: {}", key, zone, e);
                    skipped.push(e);
                }
            }
        }

        let (revision, changes) = {
            let mut table = slot.table.write();
            let mut changes: Vec<AttributeChange> = Vec::new();

            for (key, value) in parsed {
                let previous = table.values.insert(key, value.clone());
                match changes.iter_mut().find(|change| change.key == key) {
                    Some(change) => change.current = value,
                    None => changes.push(AttributeChange {
                        key,
                        previous,
                        current: value,
                    }),
                }
            }
            changes.retain(|change| change.previous.as_ref() != Some(&change.current));

            table.revision += 1;
            (table.revision, changes)
        };

        let changed: Vec<AttributeKey> = changes.iter().map(|change| change.key).collect();
        if !changes.is_empty() {
            let change = ZoneChange {
                zone: zone.clone(),
                source: batch.source,
                revision,
                changes,
            };
            self.registry.notify(&change);
        }

        Ok(ApplyOutcome {
            revision,
            changed,
            skipped,
        })
    }
}

impl EventListener for ZoneStateStore {
    fn on_event(&self, event: &EventRecord) {
        let Some(batch) = decode_event(event) else {
            tracing::debug!("No stored attribute for {:?} {:?}", event.kind, event.parameter);
            return;
        };
        match self.apply(&event.zone, &batch) {
            Ok(_) => {}
            Err(StateError::ZoneNotFound(zone)) => {
                tracing::debug!("Dropping event for untracked zone {}", zone)
            }
            Err(e) => tracing::warn!("Failed to apply event for {}: {}", event.zone, e),
        }
    }
}

impl std::fmt::Debug for ZoneStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneStateStore")
            .field("zones", &self.zones())
            .field("registry", &self.registry)
            .finish()
    }
}
