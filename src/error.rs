//! Error types for the device link
//!
//! Every exchange with the controller reports failure through [`LinkError`].
//! Nothing in this crate panics on a bad frame or a silent peer: each kind of
//! failure maps to one variant, and callers decide whether to retry on the
//! next poll cycle.

use thiserror::Error;

/// Result type used throughout the crate
pub type LinkResult<T> = Result<T, LinkError>;

/// Failure kinds of the connection keeper, frame engine and device driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No live socket is available for the exchange
    #[error("Connection unavailable")]
    ConnectionUnavailable,

    /// The peer closed the stream
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// A read or write did not finish before its deadline
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    ReadTimeout {
        operation: String,
        timeout_ms: u64,
    },

    /// Reply shorter than the minimum the check needs
    #[error("Frame too short: {len} bytes (min {min})")]
    ShortFrame { len: usize, min: usize },

    /// Reply larger than the receive buffer
    #[error("Frame too large: {len} bytes (capacity {capacity})")]
    OversizeFrame { len: usize, capacity: usize },

    /// Trailing CRC does not match the computed one
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Reply carries another device address than the request
    #[error("Address mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    AddressMismatch { expected: u8, actual: u8 },

    /// Command frame rejected before any I/O
    #[error("Invalid request frame: {len} bytes (need 8)")]
    InvalidRequestFrame { len: usize },

    /// Device answered with an exception reply
    #[error("Device exception: function 0x{function:02X}, code 0x{code:02X}")]
    Exception { function: u8, code: u8 },

    /// Reply is well formed but does not answer the request
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Socket-level error
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Bad configuration value
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl LinkError {
    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        LinkError::ReadTimeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        LinkError::Protocol {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        LinkError::Io {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        LinkError::Configuration {
            message: message.into(),
        }
    }

    /// True for deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::ReadTimeout { .. })
    }

    /// True when the socket should be dropped and re-established
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionUnavailable | LinkError::ConnectionClosed | LinkError::Io { .. }
        )
    }

    /// True for errors found while checking a received frame
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            LinkError::ShortFrame { .. }
                | LinkError::OversizeFrame { .. }
                | LinkError::CrcMismatch { .. }
                | LinkError::AddressMismatch { .. }
        )
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => LinkError::ConnectionClosed,
            _ => LinkError::io(err.to_string()),
        }
    }
}
