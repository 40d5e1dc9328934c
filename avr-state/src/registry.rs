//! Subscriber registry for zone attribute changes
//!
//! Handlers are called synchronously, in registration order, for every applied batch that
//! changed at least one attribute they care about. A handler that returns an error or panics is
//! logged and skipped; the remaining handlers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use avr_stream::ZoneId;
use parking_lot::RwLock;
use serde::Serialize;

use crate::attribute::{AttributeKey, AttributeValue, UpdateSource};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with each accepted change
pub type ChangeHandler = Arc<dyn Fn(&ZoneChange) -> Result<(), HandlerError> + Send + Sync>;

/// Zones a subscription listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneFilter {
    All,
    Zone(ZoneId),
}

impl ZoneFilter {
    pub fn matches(&self, zone: &ZoneId) -> bool {
        match self {
            ZoneFilter::All => true,
            ZoneFilter::Zone(id) => id == zone,
        }
    }
}

impl From<ZoneId> for ZoneFilter {
    fn from(zone: ZoneId) -> Self {
        ZoneFilter::Zone(zone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

/// One attribute whose value changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub key: AttributeKey,
    pub previous: Option<AttributeValue>,
    pub current: AttributeValue,
}

/// The net effect of one applied batch on one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneChange {
    pub zone: ZoneId,
    pub source: UpdateSource,
    /// Store revision of the zone after the batch
    pub revision: u64,
    pub changes: Vec<AttributeChange>,
}

impl ZoneChange {
    pub fn get(&self, key: AttributeKey) -> Option<&AttributeChange> {
        self.changes.iter().find(|change| change.key == key)
    }

    pub fn contains(&self, key: AttributeKey) -> bool {
        self.get(key).is_some()
    }

    fn restricted_to(&self, keys: &[AttributeKey]) -> Option<ZoneChange> {
        let changes: Vec<AttributeChange> = self
            .changes
            .iter()
            .filter(|change| keys.contains(&change.key))
            .cloned()
            .collect();
        if changes.is_empty() {
            return None;
        }
        Some(ZoneChange {
            zone: self.zone.clone(),
            source: self.source,
            revision: self.revision,
            changes,
        })
    }
}

struct Subscription {
    id: SubscriptionId,
    zones: ZoneFilter,
    keys: Option<Vec<AttributeKey>>,
    handler: ChangeHandler,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

/// Shared list of change subscriptions for one receiver
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Arc<RegistryInner>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every change in zones matching `zones`
    pub fn register<F>(&self, zones: ZoneFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ZoneChange) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(zones, None, Arc::new(handler))
    }

    /// Subscribe to changes of the given attributes only
    pub fn register_keys<F>(
        &self,
        zones: ZoneFilter,
        keys: &[AttributeKey],
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&ZoneChange) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(zones, Some(keys.to_vec()), Arc::new(handler))
    }

    fn insert(
        &self,
        zones: ZoneFilter,
        keys: Option<Vec<AttributeKey>>,
        handler: ChangeHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscriptions.write().push(Subscription {
            id,
            zones,
            keys,
            handler,
        });
        id
    }

    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `change` to matching subscribers; returns how many handlers succeeded
    pub fn notify(&self, change: &ZoneChange) -> usize {
        let targets: Vec<(SubscriptionId, Option<Vec<AttributeKey>>, ChangeHandler)> = self
            .inner
            .subscriptions
            .read()
            .iter()
            .filter(|subscription| subscription.zones.matches(&change.zone))
            .map(|s| (s.id, s.keys.clone(), Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (id, keys, handler) in targets {
            let restricted;
            let view = match &keys {
                Some(keys) => match change.restricted_to(keys) {
                    Some(filtered) => {
                        restricted = filtered;
                        &restricted
                    }
                    None => continue,
                },
                None => change,
            };

            match catch_unwind(AssertUnwindSafe(|| handler(view))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Subscriber {:?} failed on {} change: {}", id, change.zone, e)
                }
                Err(_) => tracing::warn!("Subscriber {:?} panicked on {} change", id, change.zone),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}
