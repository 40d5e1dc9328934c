//! Denon and Marantz AV receiver control
//!
//! A [`Receiver`] keeps a typed attribute table per zone in sync with the device. Two paths feed
//! the same store:
//!
//! - the telnet event stream, pushed by the receiver as lines such as `MV455` or `Z2ON`
//! - HTTP status documents, read on demand, after every (re)connect and optionally on a timer
//!
//! Commands go out over HTTP and never change the table themselves; the change arrives through
//! one of the two paths above.
//!
//! ```no_run
//! use denon_avr::{Receiver, ReceiverConfig, ZoneFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let receiver = Receiver::new(ReceiverConfig::all_zones("192.168.1.50"))?;
//!
//!     receiver.on_change(ZoneFilter::All, |change| {
//!         for attribute in &change.changes {
//!             println!("{} {}: {}", change.zone, attribute.key, attribute.current);
//!         }
//!         Ok(())
//!     });
//!
//!     receiver.connect_events().await?;
//!     receiver.start_polling()?;
//!
//!     let main = receiver.main();
//!     main.set_volume(-35.0)?;
//!     println!("Volume: {:?}", main.volume());
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod receiver;
mod zone;

pub use config::ReceiverConfig;
pub use error::{Result, SdkError};
pub use receiver::Receiver;
pub use zone::{Capability, Zone, ZoneRole};

pub use avr_discovery::Device;
pub use avr_state::{
    logging, ApplyOutcome, AttributeChange, AttributeKey, AttributeValue, HandlerError, PowerState,
    StateError, SubscriptionId, UpdateSource, ZoneChange, ZoneFilter, ZoneSnapshot,
};
pub use avr_stream::{ConnectionEvent, ConnectionState, StreamConfig, ZoneId};
