//! # Parameter Codec
//!
//! Decoding of register words out of a parameter block reply.
//!
//! A block reply starts with a 7-byte header, followed by one big-endian
//! 16-bit word per register. The word for `target` in a block starting at
//! register `start` lives at byte offset
//!
//! ```text
//! (target - start) * 2 + 7
//! ```
//!
//! Addressing outside the buffer is not a transport failure: the lookup
//! degrades to zero and says so through [`Decoded::OutOfRange`].

use crate::constants::BLOCK_HEADER_LEN;

/// Outcome of a register lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded<T> {
    /// Word found inside the block.
    Clean(T),
    /// Target address maps outside the buffer; the value degrades to zero.
    OutOfRange {
        /// Requested register address
        target: u16,
        /// Byte offset the address maps to (negative below the block start)
        offset: i64,
        /// Length of the buffer that was searched
        block_len: usize,
    },
}

impl<T: Copy + Default> Decoded<T> {
    /// The decoded value, or zero when out of range.
    #[inline]
    pub fn value(&self) -> T {
        match self {
            Decoded::Clean(v) => *v,
            Decoded::OutOfRange { .. } => T::default(),
        }
    }

    /// True when the value came from inside the block.
    #[inline]
    pub fn is_clean(&self) -> bool {
        matches!(self, Decoded::Clean(_))
    }

    /// Clean value as an `Option`.
    #[inline]
    pub fn ok(&self) -> Option<T> {
        match self {
            Decoded::Clean(v) => Some(*v),
            Decoded::OutOfRange { .. } => None,
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Clean(v) => Decoded::Clean(f(v)),
            Decoded::OutOfRange {
                target,
                offset,
                block_len,
            } => Decoded::OutOfRange {
                target,
                offset,
                block_len,
            },
        }
    }
}

/// Byte offset of the high byte of `target` in a block starting at `start`.
#[inline]
pub fn register_offset(start: u16, target: u16) -> i64 {
    (i64::from(target) - i64::from(start)) * 2 + BLOCK_HEADER_LEN as i64
}

/// Raw 16-bit word of `target` from a block starting at `start`.
///
/// # Example
///
/// ```rust
/// use jnge_link::codec::{decode_raw, Decoded};
///
/// let mut block = vec![0u8; 11];
/// block[7] = 0x01;
/// block[8] = 0x12;
/// assert_eq!(decode_raw(&block, 0x1000, 0x1000), Decoded::Clean(0x0112));
/// assert_eq!(decode_raw(&block, 0x1000, 0x0FFF).value(), 0);
/// ```
pub fn decode_raw(data: &[u8], start: u16, target: u16) -> Decoded<u16> {
    let offset = register_offset(start, target);
    let block_len = data.len();

    // Registers below the block start would alias the reply header
    if target < start || offset + 1 >= block_len as i64 {
        return Decoded::OutOfRange {
            target,
            offset,
            block_len,
        };
    }

    let hi = offset as usize;
    Decoded::Clean(u16::from_be_bytes([data[hi], data[hi + 1]]))
}

/// Word of `target` multiplied by `coefficient`.
pub fn decode_scaled(data: &[u8], start: u16, target: u16, coefficient: f32) -> Decoded<f32> {
    decode_raw(data, start, target).map(|word| f32::from(word) * coefficient)
}
