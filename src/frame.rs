//! Command frames and CRC16-Modbus
//!
//! Every frame on the wire ends with a CRC16-Modbus (poly 0xA001 reflected,
//! init 0xFFFF, no final XOR) over all preceding bytes, low byte first.
//! Commands are always 8 bytes:
//!
//! ```text
//! [addr][func][startHi][startLo][valueHi][valueLo][crcLo][crcHi]
//! ```

use crc::{Crc, CRC_16_MODBUS};

use crate::constants::{
    COMMAND_BODY_LEN, COMMAND_FRAME_LEN, CRC_LEN, EXCEPTION_FLAG, MIN_CRC_FRAME_LEN,
};
use crate::error::{LinkError, LinkResult};

/// CRC calculator shared by all frames
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC16-Modbus of `data`.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Append the CRC of `frame` to it, low byte first.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Check the trailing CRC pair of a received frame.
pub fn check_crc(frame: &[u8]) -> LinkResult<()> {
    if frame.len() < MIN_CRC_FRAME_LEN {
        return Err(LinkError::ShortFrame {
            len: frame.len(),
            min: MIN_CRC_FRAME_LEN,
        });
    }

    let body_len = frame.len() - CRC_LEN;
    let expected = crc16(&frame[..body_len]);
    let actual = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);

    if expected != actual {
        return Err(LinkError::CrcMismatch { expected, actual });
    }
    Ok(())
}

/// Validate a reply: minimum length, CRC, then the echoed device address.
pub fn validate_response(frame: &[u8], expected_address: u8) -> LinkResult<()> {
    check_crc(frame)?;
    check_address(frame, expected_address)
}

/// Check that the first byte echoes the request's device address.
pub fn check_address(frame: &[u8], expected_address: u8) -> LinkResult<()> {
    match frame.first() {
        Some(&actual) if actual == expected_address => Ok(()),
        Some(&actual) => Err(LinkError::AddressMismatch {
            expected: expected_address,
            actual,
        }),
        None => Err(LinkError::ShortFrame {
            len: 0,
            min: MIN_CRC_FRAME_LEN,
        }),
    }
}

/// Exception reply details, if `frame` is one.
///
/// Returns `(function, code)` with the exception flag stripped from the function.
pub fn exception_of(frame: &[u8]) -> Option<(u8, u8)> {
    match frame {
        [_, function, code, ..] if function & EXCEPTION_FLAG != 0 => {
            Some((function & !EXCEPTION_FLAG, *code))
        }
        _ => None,
    }
}

/// Format raw bytes as a hex string for diagnostics.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed 8-byte command frame with its CRC always up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; COMMAND_FRAME_LEN]);

impl CommandFrame {
    /// Build a command for `address` and stamp its CRC.
    pub fn new(address: u8, function: u8, start: u16, value: u16) -> Self {
        let [start_hi, start_lo] = start.to_be_bytes();
        let [value_hi, value_lo] = value.to_be_bytes();
        let mut frame = Self([address, function, start_hi, start_lo, value_hi, value_lo, 0, 0]);
        frame.stamp_crc();
        frame
    }

    /// Wrap raw bytes as received or templated; the CRC is recomputed.
    pub fn from_bytes(bytes: [u8; COMMAND_FRAME_LEN]) -> Self {
        let mut frame = Self(bytes);
        frame.stamp_crc();
        frame
    }

    /// Replace the device address and recompute the CRC.
    pub fn restamp(&mut self, address: u8) {
        self.0[0] = address;
        self.stamp_crc();
    }

    /// Replace the value field and recompute the CRC.
    pub fn set_value(&mut self, value: u16) {
        self.0[4..6].copy_from_slice(&value.to_be_bytes());
        self.stamp_crc();
    }

    #[inline]
    fn stamp_crc(&mut self) {
        let crc = crc16(&self.0[..COMMAND_BODY_LEN]);
        self.0[COMMAND_BODY_LEN..].copy_from_slice(&crc.to_le_bytes());
    }

    /// Device address
    pub fn address(&self) -> u8 {
        self.0[0]
    }

    /// Function code
    pub fn function(&self) -> u8 {
        self.0[1]
    }

    /// Start register (or the target register of a write)
    pub fn start(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }

    /// Value field (register count for reads)
    pub fn value(&self) -> u16 {
        u16::from_be_bytes([self.0[4], self.0[5]])
    }

    /// CRC as stored in the frame
    pub fn crc(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; COMMAND_FRAME_LEN] {
        &self.0
    }

    /// Raw bytes, mutable. Callers that edit the frame own the CRC.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
