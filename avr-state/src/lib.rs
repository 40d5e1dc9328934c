//! Zone state for Denon and Marantz receivers
//!
//! Keeps one attribute table per zone and merges two independent producers into it: push events
//! from the telnet stream and status documents fetched over HTTP. Both go through the same
//! [`ZoneStateStore::apply`] contract.
//!
//! # Architecture
//!
//! ```text
//! EventDispatcher ─▶ decode_event ─┐
//!                                  ├─▶ ZoneStateStore::apply ─▶ CallbackRegistry::notify
//! PollSynchronizer ─▶ decode_status┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use avr_state::{AttributeKey, PollSynchronizer, ZoneFilter, ZoneStateStore};
//!
//! let store = ZoneStateStore::new();
//! store.add_zone(ZoneId::main())?;
//! store.registry().register(ZoneFilter::All, |change| {
//!     println!("{} now at revision {}", change.zone, change.revision);
//!     Ok(())
//! });
//!
//! let sync = PollSynchronizer::new(Arc::new(ReceiverClient::new("192.168.1.50")), store.clone());
//! sync.refresh(&ZoneId::main())?;
//! println!("{:?}", store.get(&ZoneId::main(), AttributeKey::Volume)?);
//! ```

mod error;

pub mod attribute;
pub mod audyssey;
pub mod decoder;
pub mod logging;
pub mod poll;
pub mod registry;
pub mod sound_mode;
pub mod store;
pub mod volume;

pub use attribute::{AttributeKey, AttributeValue, PowerState, UpdateSource};
pub use decoder::{decode_audyssey, decode_event, decode_status, decode_tone_control, UpdateBatch};
pub use error::{ParseError, Result, StateError};
pub use poll::{FetchResult, PollSynchronizer, PollTask, StatusSource};
pub use registry::{
    AttributeChange, CallbackRegistry, ChangeHandler, HandlerError, SubscriptionId, ZoneChange,
    ZoneFilter,
};
pub use store::{ApplyOutcome, ZoneSnapshot, ZoneStateStore};

// Re-export stream types that appear in this crate's API
pub use avr_stream::{EventKind, EventRecord, ZoneId};
