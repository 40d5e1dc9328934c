//! Denon and Marantz receiver discovery
//!
//! Sends an SSDP search, fetches the UPnP description of every answering device and keeps the
//! Denon and Marantz media renderers.
//!
//! ```no_run
//! use avr_discovery::get;
//!
//! for device in get() {
//!     println!("Found {} ({}) at {}", device.name, device.model_name, device.host);
//! }
//! ```

mod discovery;
mod error;
mod ssdp;

pub mod device;

pub use discovery::{describe, DiscoveryIterator, SEARCH_ATTEMPTS};
pub use error::{DiscoveryError, Result};

use std::time::Duration;

/// Default time to wait for SSDP answers and description fetches
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// A receiver found on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Host name or IP address for the HTTP and telnet interfaces
    pub host: String,
    /// Friendly name, e.g. "Living Room"
    pub name: String,
    pub manufacturer: String,
    /// Model name, e.g. "Denon AVR-X1600H"
    pub model_name: String,
    pub serial_number: Option<String>,
    pub presentation_url: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Found(Device),
}

/// All receivers answering within [`DEFAULT_TIMEOUT`]
pub fn get() -> Vec<Device> {
    get_with_timeout(DEFAULT_TIMEOUT)
}

pub fn get_with_timeout(timeout: Duration) -> Vec<Device> {
    get_iter_with_timeout(timeout)
        .map(|event| match event {
            DeviceEvent::Found(device) => device,
        })
        .collect()
}

/// Streaming form of [`get`]; stop iterating to end the search early
pub fn get_iter() -> DiscoveryIterator {
    get_iter_with_timeout(DEFAULT_TIMEOUT)
}

pub fn get_iter_with_timeout(timeout: Duration) -> DiscoveryIterator {
    DiscoveryIterator::new(timeout).unwrap_or_else(|e| {
        tracing::warn!("Discovery unavailable: {}", e);
        DiscoveryIterator::empty()
    })
}
