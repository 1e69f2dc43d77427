//! # Link Configuration
//!
//! Endpoint, device address and timing settings for one controller link.
//! Defaults match what the controller and its serial-to-Wi-Fi bridge need
//! in the field; every value can be overridden with the `with_*` setters.
//!
//! ```rust
//! use jnge_link::LinkConfig;
//! use std::time::Duration;
//!
//! let config = LinkConfig::new("192.168.4.1:8899".parse().unwrap())
//!     .with_device_address(0x06)
//!     .with_reconnect_interval(Duration::from_secs(5));
//!
//! assert_eq!(config.device_address, 0x06);
//! assert_eq!(config.timing.idle_gap, Duration::from_millis(100));
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DEVICE_ADDRESS, DEFAULT_FIRST_BYTE_TIMEOUT,
    DEFAULT_IDLE_GAP, DEFAULT_RECONNECT_INTERVAL, DEFAULT_RETRY_PAUSE, DEFAULT_TCP_PORT,
    DEFAULT_WRITE_TIMEOUT,
};
use crate::error::{LinkError, LinkResult};

/// Timings of a single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTiming {
    /// Wait for the first reply byte on the idle-framed path.
    pub first_byte_timeout: Duration,
    /// Silence that ends an idle-framed reply.
    pub idle_gap: Duration,
    /// Deadline for writing a command frame.
    pub write_timeout: Duration,
    /// Pause between two exact-read attempts.
    pub retry_pause: Duration,
}

impl ExchangeTiming {
    /// Create timings with the protocol defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first-byte timeout.
    pub fn with_first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.first_byte_timeout = timeout;
        self
    }

    /// Set the idle gap.
    pub fn with_idle_gap(mut self, gap: Duration) -> Self {
        self.idle_gap = gap;
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the pause between exact-read attempts.
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            first_byte_timeout: DEFAULT_FIRST_BYTE_TIMEOUT,
            idle_gap: DEFAULT_IDLE_GAP,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }
}

/// Settings for one controller link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Bridge endpoint.
    pub endpoint: SocketAddr,
    /// Device address stamped into every command.
    pub device_address: u8,
    /// Minimum interval between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Deadline for one TCP connect.
    pub connect_timeout: Duration,
    /// Disable Nagle on the socket.
    pub nodelay: bool,
    /// Hex-dump every frame sent and received.
    pub packet_logging: bool,
    /// Exchange timings.
    pub timing: ExchangeTiming,
}

impl LinkConfig {
    /// Create a configuration for the given endpoint with default settings.
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Parse `host:port` (or a bare host, which gets the default port).
    pub fn from_address(addr: &str) -> LinkResult<Self> {
        let endpoint = match addr.parse::<SocketAddr>() {
            Ok(endpoint) => endpoint,
            Err(_) => {
                let ip: Ipv4Addr = addr.parse().map_err(|e| {
                    LinkError::configuration(format!("Invalid address {}: {}", addr, e))
                })?;
                SocketAddr::V4(SocketAddrV4::new(ip, DEFAULT_TCP_PORT))
            }
        };
        Ok(Self::new(endpoint))
    }

    /// Set the device address.
    pub fn with_device_address(mut self, address: u8) -> Self {
        self.device_address = address;
        self
    }

    /// Set the reconnect interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Enable or disable packet logging.
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Replace the exchange timings.
    pub fn with_timing(mut self, timing: ExchangeTiming) -> Self {
        self.timing = timing;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_TCP_PORT)),
            device_address: DEFAULT_DEVICE_ADDRESS,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
            packet_logging: false,
            timing: ExchangeTiming::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.endpoint.port(), DEFAULT_TCP_PORT);
        assert_eq!(config.device_address, 0x06);
        assert_eq!(config.reconnect_interval, Duration::from_millis(3000));
        assert_eq!(config.timing.first_byte_timeout, Duration::from_millis(2000));
        assert_eq!(config.timing.idle_gap, Duration::from_millis(100));
        assert!(config.nodelay);
        assert!(!config.packet_logging);
    }

    #[test]
    fn test_builder_pattern() {
        let timing = ExchangeTiming::new()
            .with_idle_gap(Duration::from_millis(50))
            .with_retry_pause(Duration::from_millis(10));
        let config = LinkConfig::default()
            .with_device_address(0x01)
            .with_packet_logging(true)
            .with_timing(timing);

        assert_eq!(config.device_address, 0x01);
        assert!(config.packet_logging);
        assert_eq!(config.timing.idle_gap, Duration::from_millis(50));
        assert_eq!(config.timing.retry_pause, Duration::from_millis(10));
        assert_eq!(config.timing.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn test_from_address() {
        let config = LinkConfig::from_address("10.0.0.7:502").unwrap();
        assert_eq!(config.endpoint.to_string(), "10.0.0.7:502");

        let config = LinkConfig::from_address("10.0.0.7").unwrap();
        assert_eq!(config.endpoint.port(), DEFAULT_TCP_PORT);

        assert!(matches!(
            LinkConfig::from_address("not-an-ip"),
            Err(LinkError::Configuration { .. })
        ));
    }
}
