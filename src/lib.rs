//! # JNGE Link - Device Communication for JNGE/GNFL Inverter Controllers
//!
//! Async client for the binary request/response protocol spoken by JNGE
//! GNFL battery-inverter controllers, carried over TCP by a serial-to-Wi-Fi
//! bridge (port 8899 by default).
//!
//! ## Features
//!
//! - **Connection keeping**: rate-limited reconnects, one socket per link
//! - **Two framing modes**: exact-length reads with deadline and retry, and
//!   idle-gap framing for replies of unknown length
//! - **Strict validation**: CRC16-Modbus and echoed device address on every reply
//! - **Safe decoding**: out-of-range register lookups degrade to zero and say so
//! - **Simulator**: in-process controller with fault injection for tests
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Reply |
//! |------|----------|-------|
//! | 0x12 | Read running block (0x1000, 36 regs) | 81 bytes |
//! | 0x16 | Read basic block (0x1024, 39 regs) | 87 bytes |
//! | 0x18 | Write single setting register | echo, 8 bytes |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jnge_link::{registers, ConnectionKeeper, GnflDevice, LinkConfig, LinkResult};
//!
//! #[tokio::main]
//! async fn main() -> LinkResult<()> {
//!     let config = LinkConfig::from_address("192.168.4.1:8899")?;
//!     let mut keeper = ConnectionKeeper::tcp(&config);
//!     let mut device = GnflDevice::new(&config);
//!
//!     loop {
//!         let report = device.poll_link(&mut keeper).await;
//!         if report.is_complete() {
//!             for param in registers::ALL.iter() {
//!                 if let Some(value) = device.parameter(param) {
//!                     println!("{} = {:.1} {}", param.name, value.value(), param.unit);
//!                 }
//!             }
//!         }
//!         tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     }
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error types and result handling
pub mod error;

/// Protocol constants
pub mod constants;

/// Link configuration
pub mod config;

/// Command frames and CRC16-Modbus
pub mod frame;

/// Register decoding
pub mod codec;

// ============================================================================
// Link layer
// ============================================================================

/// Connection keeping and reconnect rate limiting
pub mod keeper;

/// Request/response engine
pub mod engine;

// ============================================================================
// Device layer
// ============================================================================

/// Device models and their parameter blocks
pub mod profile;

/// Known registers
pub mod registers;

/// Cached parameter blocks
pub mod block;

/// GNFL device driver
pub mod device;

// ============================================================================
// Tooling
// ============================================================================

/// Simulated controller
pub mod simulator;

/// Log output for binaries
pub mod logging;

// ============================================================================
// Re-exports
// ============================================================================

pub use block::ParameterBlock;
pub use codec::{decode_raw, decode_scaled, Decoded};
pub use config::{ExchangeTiming, LinkConfig};
pub use device::{GnflDevice, PollReport};
pub use engine::{FrameEngine, LinkStats};
pub use error::{LinkError, LinkResult};
pub use frame::{crc16, CommandFrame};
pub use keeper::{ConnectionKeeper, Connector, TcpConnector};
pub use profile::{BlockSpec, DeviceProfile};
pub use registers::{BlockKind, Parameter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
