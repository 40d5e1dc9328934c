//! Minimal SSDP client: one M-SEARCH out, unicast answers in until the read timeout

use std::net::UdpSocket;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

pub(crate) const SSDP_ADDR: &str = "239.255.255.250:1900";

/// Receivers answer `ssdp:all` but not every specific target across firmware versions
pub(crate) const SEARCH_TARGET: &str = "ssdp:all";

const MAX_WAIT_SECS: u32 = 2;

/// The headers of one SSDP answer that discovery cares about
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SsdpResponse {
    pub location: String,
    pub search_target: Option<String>,
    pub server: Option<String>,
}

pub(crate) struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let network = |what: &str, e: std::io::Error| {
            DiscoveryError::NetworkError(format!("Failed to {}: {}", what, e))
        };
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| network("bind UDP socket", e))?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| network("set read timeout", e))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| network("set multicast loop", e))?;

        Ok(Self { socket })
    }

    /// Send one M-SEARCH and collect every answer that arrives before the read timeout
    pub fn search(&self, search_target: &str) -> Result<Vec<SsdpResponse>> {
        self.socket
            .send_to(search_request(search_target).as_bytes(), SSDP_ADDR)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to send M-SEARCH: {}", e)))?;

        let mut responses = Vec::new();
        let mut buffer = [0u8; 10240];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((size, from)) => {
                    let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
                        tracing::debug!("Ignoring non UTF-8 SSDP answer from {}", from);
                        continue;
                    };
                    responses.extend(parse_ssdp_response(text));
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => {
                    return Err(DiscoveryError::NetworkError(format!("Socket error: {}", e)))
                }
            }
        }
        Ok(responses)
    }
}

fn search_request(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         \r\n",
        SSDP_ADDR, MAX_WAIT_SECS, search_target
    )
}

/// Answers without a `LOCATION` header are useless and yield `None`
fn parse_ssdp_response(response: &str) -> Option<SsdpResponse> {
    let mut location = None;
    let mut search_target = None;
    let mut server = None;

    for line in response.lines() {
        let line = line.trim();
        if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "ST:") {
            search_target = Some(value);
        } else if let Some(value) = extract_header_value(line, "SERVER:") {
            server = Some(value);
        }
    }

    location
        .filter(|location| !location.is_empty())
        .map(|location| SsdpResponse {
            location,
            search_target,
            server,
        })
}

fn extract_header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len() && line[..header.len()].eq_ignore_ascii_case(header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}
