//! UPnP device description parsing and receiver identification.

use serde::Deserialize;
use url::Url;

use crate::error::{DiscoveryError, Result};
use crate::Device;

/// Device type announced by network receivers
pub const MEDIA_RENDERER: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Manufacturers whose receivers speak the same control protocol
pub const SUPPORTED_MANUFACTURERS: &[&str] = &["Denon", "Marantz"];

#[derive(Debug, Deserialize)]
struct Root {
    device: DeviceDescription,
}

/// The `<device>` element of a description document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    #[serde(rename = "presentationURL")]
    pub presentation_url: Option<String>,
    #[serde(rename = "UDN")]
    pub udn: Option<String>,
}

impl DeviceDescription {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root: Root = quick_xml::de::from_str(xml)
            .map_err(|e| DiscoveryError::ParseError(format!("Failed to parse device XML: {}", e)))?;
        Ok(root.device)
    }

    /// Denon or Marantz media renderer
    pub fn is_receiver(&self) -> bool {
        let manufacturer = self.manufacturer.trim();
        SUPPORTED_MANUFACTURERS
            .iter()
            .any(|supported| manufacturer.eq_ignore_ascii_case(supported))
            && self.device_type.trim() == MEDIA_RENDERER
    }

    /// Public device record.
    ///
    /// The host comes from the presentation URL when there is one, otherwise from the location
    /// the description was fetched from.
    pub fn to_device(&self, location: &str) -> Result<Device> {
        let host = self
            .presentation_url
            .as_deref()
            .and_then(host_of)
            .or_else(|| host_of(location))
            .ok_or_else(|| {
                DiscoveryError::InvalidDevice(format!(
                    "no host for {} at {}",
                    self.friendly_name, location
                ))
            })?;

        Ok(Device {
            host,
            name: self.friendly_name.trim().to_string(),
            manufacturer: self.manufacturer.trim().to_string(),
            model_name: self.model_name.trim().to_string(),
            serial_number: self.serial_number.clone(),
            presentation_url: self.presentation_url.clone(),
        })
    }
}

/// Host name of an absolute URL
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()?
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}
