//! Discovery iterator: SSDP search, description fetch, receiver filtering.

use std::collections::HashSet;
use std::time::Duration;

use crate::device::DeviceDescription;
use crate::error::{DiscoveryError, Result};
use crate::ssdp::{SsdpClient, SsdpResponse, SEARCH_TARGET};
use crate::{Device, DeviceEvent};

/// Number of search rounds sent while nothing has answered
pub const SEARCH_ATTEMPTS: usize = 3;

/// Yields `DeviceEvent::Found` for each receiver answering the search.
///
/// The search runs on the first call to `next`. Answers are deduplicated by location, and a
/// device whose description cannot be fetched or is not a receiver is skipped.
pub struct DiscoveryIterator {
    ssdp_client: Option<SsdpClient>,
    responses: std::vec::IntoIter<SsdpResponse>,
    seen_locations: HashSet<String>,
    http_client: reqwest::blocking::Client,
}

impl DiscoveryIterator {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            ssdp_client: Some(SsdpClient::new(timeout)?),
            responses: Vec::new().into_iter(),
            seen_locations: HashSet::new(),
            http_client: http_client(timeout)?,
        })
    }

    pub(crate) fn empty() -> Self {
        Self {
            ssdp_client: None,
            responses: Vec::new().into_iter(),
            seen_locations: HashSet::new(),
            http_client: reqwest::blocking::Client::new(),
        }
    }

    fn search(&mut self) {
        let Some(client) = self.ssdp_client.take() else {
            return;
        };

        for attempt in 1..=SEARCH_ATTEMPTS {
            match client.search(SEARCH_TARGET) {
                Ok(responses) if !responses.is_empty() => {
                    tracing::debug!(
                        "{} SSDP answers after {} search(es)",
                        responses.len(),
                        attempt
                    );
                    self.responses = responses.into_iter();
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("SSDP search failed: {}", e);
                    return;
                }
            }
        }
        tracing::debug!("No SSDP answers after {} searches", SEARCH_ATTEMPTS);
    }
}

impl Iterator for DiscoveryIterator {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.search();

        for response in self.responses.by_ref() {
            if !self.seen_locations.insert(response.location.clone()) {
                continue;
            }
            match describe_with(&self.http_client, &response.location) {
                Ok(Some(device)) => return Some(DeviceEvent::Found(device)),
                Ok(None) => {}
                Err(e) => tracing::debug!(
                    "Skipping {} (ST {:?}, server {:?}): {}",
                    response.location,
                    response.search_target,
                    response.server,
                    e
                ),
            }
        }
        None
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create HTTP client: {}", e)))
}

/// Fetch the description at `location`; `Ok(None)` when it is some other kind of device
pub fn describe(location: &str, timeout: Duration) -> Result<Option<Device>> {
    describe_with(&http_client(timeout)?, location)
}

fn describe_with(client: &reqwest::blocking::Client, location: &str) -> Result<Option<Device>> {
    let response = client.get(location).send().map_err(|e| {
        if e.is_timeout() {
            DiscoveryError::Timeout
        } else {
            DiscoveryError::NetworkError(format!("Failed to fetch device description: {}", e))
        }
    })?;

    if !response.status().is_success() {
        return Err(DiscoveryError::NetworkError(format!(
            "Description fetch returned {}",
            response.status()
        )));
    }

    let xml = response
        .text()
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to read response body: {}", e)))?;
    let description = DeviceDescription::from_xml(&xml)?;

    if !description.is_receiver() {
        tracing::debug!(
            "{} is a {} {}, not a receiver",
            location,
            description.manufacturer,
            description.device_type
        );
        return Ok(None);
    }
    description.to_device(location).map(Some)
}
