//! Protocol constants for the JNGE/GNFL controller link
//!
//! Frame sizes, function codes, register ranges and the default timings the
//! controller has been observed to need.

use std::time::Duration;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Fixed length of every command frame
/// Format: Address(1) + Function(1) + Start(2) + Value(2) + CRC(2) = 8 bytes
pub const COMMAND_FRAME_LEN: usize = 8;

/// Number of bytes covered by the command CRC
pub const COMMAND_BODY_LEN: usize = COMMAND_FRAME_LEN - CRC_LEN;

/// Length of the trailing CRC pair
pub const CRC_LEN: usize = 2;

/// Smallest frame the CRC check accepts (address + CRC)
pub const MIN_CRC_FRAME_LEN: usize = 3;

/// Smallest reply accepted by the idle-framed command path
///
/// An exception reply is the shortest valid answer:
/// Address(1) + Function(1) + Code(1) + CRC(2) = 5 bytes
pub const MIN_RESPONSE_LEN: usize = 5;

/// Capacity of the scratch buffer for idle-framed replies
pub const MAX_RESPONSE_LEN: usize = 128;

/// Bytes in front of the first register word in a block reply
///
/// Layout: Address(1) + Function(1) + ByteCount(1) + DeviceSerial(4) = 7 bytes
pub const BLOCK_HEADER_LEN: usize = 7;

// ============================================================================
// Function Codes
// ============================================================================

/// Read running parameter block
pub const FC_READ_RUNNING: u8 = 0x12;

/// Read basic (customer setting) parameter block
pub const FC_READ_BASIC: u8 = 0x16;

/// Write a single setting register
pub const FC_WRITE_REGISTER: u8 = 0x18;

/// Bit set in the function byte of an exception reply
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Register Blocks
// ============================================================================

/// First register of the running block
pub const RUNNING_START: u16 = 0x1000;

/// Registers in the running block
pub const RUNNING_COUNT: u16 = 0x24;

/// Reply length of the running block: 7 + 36 * 2 + 2
pub const RUNNING_REPLY_LEN: usize = 81;

/// First register of the basic block
pub const BASIC_START: u16 = 0x1024;

/// Registers in the basic block
pub const BASIC_COUNT: u16 = 0x27;

/// Reply length of the basic block: 7 + 39 * 2 + 2
pub const BASIC_REPLY_LEN: usize = 87;

// ============================================================================
// Addressing and Timing Defaults
// ============================================================================

/// Device address used by the controller out of the box
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x06;

/// TCP port of the serial-to-Wi-Fi bridge in front of the controller
pub const DEFAULT_TCP_PORT: u16 = 8899;

/// Minimum interval between two reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Deadline for a single TCP connect
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Wait for the first reply byte on the idle-framed path
pub const DEFAULT_FIRST_BYTE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Silence that ends an idle-framed reply
pub const DEFAULT_IDLE_GAP: Duration = Duration::from_millis(100);

/// Deadline for writing a command
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Pause between two exact-read attempts
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(5);

/// Deadline of one running-block read attempt
pub const RUNNING_READ_DEADLINE: Duration = Duration::from_millis(1200);

/// Deadline of one basic-block read attempt
pub const BASIC_READ_DEADLINE: Duration = Duration::from_millis(2000);

/// Attempts per block read
pub const BLOCK_READ_TRIES: usize = 2;
