//! Receiver configuration

use std::time::Duration;

use avr_http::DEFAULT_HTTP_PORT;
use avr_state::ZoneId;
use avr_stream::StreamConfig;

use crate::error::SdkError;

/// Configuration for a [`Receiver`](crate::Receiver)
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Receiver host name or IP address, shared by HTTP and telnet
    pub host: String,

    /// Default: 80
    pub http_port: u16,

    /// Default: 2 seconds
    pub http_connect_timeout: Duration,

    /// Default: 15 seconds
    pub http_read_timeout: Duration,

    /// Telnet event stream settings; its host follows `host`
    pub stream: StreamConfig,

    /// Background full refresh interval, `None` for none
    /// Default: None
    pub poll_interval: Option<Duration>,

    /// Zones besides Main tracked from the start
    /// Default: empty
    pub secondary_zones: Vec<ZoneId>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            http_port: DEFAULT_HTTP_PORT,
            http_connect_timeout: Duration::from_secs(2),
            http_read_timeout: Duration::from_secs(15),
            stream: StreamConfig::default(),
            poll_interval: None,
            secondary_zones: Vec::new(),
        }
    }
}

impl ReceiverConfig {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            stream: StreamConfig::new(host.clone()),
            host,
            ..Default::default()
        }
    }

    /// Main, Zone2 and Zone3 with a one minute background refresh
    pub fn all_zones(host: impl Into<String>) -> Self {
        Self::new(host)
            .with_secondary_zone(ZoneId::zone2())
            .with_secondary_zone(ZoneId::zone3())
            .with_poll_interval(Some(Duration::from_secs(60)))
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.host.trim().is_empty() {
            return Err(SdkError::Configuration("host must not be empty".to_string()));
        }
        if self.http_port == 0 {
            return Err(SdkError::Configuration("http_port must be non-zero".to_string()));
        }
        if self.http_connect_timeout.is_zero() || self.http_read_timeout.is_zero() {
            return Err(SdkError::Configuration("HTTP timeouts must be non-zero".to_string()));
        }
        if self.stream.host != self.host {
            return Err(SdkError::Configuration(format!(
                "stream host {} differs from receiver host {}",
                self.stream.host, self.host
            )));
        }
        if let Some(interval) = self.poll_interval {
            if interval < Duration::from_secs(1) {
                return Err(SdkError::Configuration(
                    "poll_interval must be at least 1 second".to_string(),
                ));
            }
        }
        for zone in &self.secondary_zones {
            if zone.is_main() || zone.number().is_none() {
                return Err(SdkError::UnsupportedZone(zone.clone()));
            }
        }
        self.stream.validate()?;
        Ok(())
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_http_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.http_connect_timeout = connect;
        self.http_read_timeout = read;
        self
    }

    /// Replace the stream settings, keeping the receiver host
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = StreamConfig {
            host: self.host.clone(),
            ..stream
        };
        self
    }

    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_secondary_zone(mut self, zone: ZoneId) -> Self {
        if !self.secondary_zones.contains(&zone) {
            self.secondary_zones.push(zone);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReceiverConfig::new("192.168.1.50");
        assert_eq!(config.http_port, 80);
        assert_eq!(config.stream.host, "192.168.1.50");
        assert_eq!(config.stream.port, 23);
        assert!(config.poll_interval.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_zones_preset() {
        let config = ReceiverConfig::all_zones("avr.local");
        assert_eq!(config.secondary_zones, vec![ZoneId::zone2(), ZoneId::zone3()]);
        assert_eq!(config.poll_interval, Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_stream_keeps_host() {
        let config =
            ReceiverConfig::new("10.0.0.2").with_stream(StreamConfig::fast_reconnect("other"));
        assert_eq!(config.stream.host, "10.0.0.2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(ReceiverConfig::default().validate().is_err());
        assert!(ReceiverConfig::new("h").with_http_port(0).validate().is_err());
        assert!(ReceiverConfig::new("h")
            .with_poll_interval(Some(Duration::from_millis(10)))
            .validate()
            .is_err());
        assert!(matches!(
            ReceiverConfig::new("h")
                .with_secondary_zone(ZoneId::new("Patio"))
                .validate(),
            Err(SdkError::UnsupportedZone(_))
        ));
        assert!(matches!(
            ReceiverConfig::new("h")
                .with_secondary_zone(ZoneId::main())
                .validate(),
            Err(SdkError::UnsupportedZone(_))
        ));
    }
}
