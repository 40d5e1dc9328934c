//! Configuration for the stream connection supervisor
//!
//! Controls the connect and idle timeouts, the heartbeat query, the reconnect backoff policy and
//! the parser's line bound.

use std::time::Duration;

use crate::error::StreamError;

/// Well-known port of the receiver's telnet interface
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Configuration for the ConnectionSupervisor
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Receiver host name or IP address
    pub host: String,

    /// Default: 23
    pub port: u16,

    /// Bound on a single connect attempt
    /// Default: 2 seconds
    pub connect_timeout: Duration,

    /// No bytes for this long marks the connection stale
    /// Default: 90 seconds
    pub idle_timeout: Duration,

    /// Interval of the `PW?` query sent while connected, `None` disables it
    /// Default: 30 seconds
    pub heartbeat_interval: Option<Duration>,

    /// Delay before the first reconnect attempt
    /// Default: 1 second
    pub initial_backoff: Duration,

    /// Ceiling of the exponential backoff
    /// Default: 30 seconds
    pub max_backoff: Duration,

    /// Reconnect attempts before giving up, `None` retries forever
    /// Default: None
    pub max_reconnect_attempts: Option<u32>,

    /// Longest line accepted by the parser, in bytes
    /// Default: 512
    pub max_line_length: usize,

    /// Capacity of the connection event and command channels
    /// Default: 64
    pub event_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_TELNET_PORT,
            connect_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(90),
            heartbeat_interval: Some(Duration::from_secs(30)),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_reconnect_attempts: None,
            max_line_length: 512,
            event_buffer_size: 64,
        }
    }
}

impl StreamConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Short backoff and idle window, for receivers on a reliable LAN
    pub fn fast_reconnect(host: impl Into<String>) -> Self {
        Self {
            idle_timeout: Duration::from_secs(45),
            heartbeat_interval: Some(Duration::from_secs(15)),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            ..Self::new(host)
        }
    }

    /// Long backoff with a bounded retry budget
    pub fn patient(host: impl Into<String>) -> Self {
        Self {
            idle_timeout: Duration::from_secs(180),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            max_reconnect_attempts: Some(20),
            ..Self::new(host)
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.host.is_empty() {
            return Err(StreamError::Configuration("Host must not be empty".to_string()));
        }

        if self.connect_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        if self.idle_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Idle timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(heartbeat) = self.heartbeat_interval {
            if heartbeat == Duration::ZERO || heartbeat >= self.idle_timeout {
                return Err(StreamError::Configuration(
                    "Heartbeat interval must be between 0 and the idle timeout".to_string(),
                ));
            }
        }

        if self.initial_backoff > self.max_backoff {
            return Err(StreamError::Configuration(
                "Invalid backoff: initial must not exceed max".to_string(),
            ));
        }

        if self.max_line_length == 0 {
            return Err(StreamError::Configuration(
                "Max line length must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(StreamError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Delay before reconnect attempt number `attempt` (0-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }
}
