//! # Device Profile
//!
//! Static description of a controller model: which parameter blocks it has,
//! how to request them and how long to wait for them.
//!
//! | Block   | Function | Start  | Registers | Reply | Deadline | Tries |
//! |---------|----------|--------|-----------|-------|----------|-------|
//! | running | 0x12     | 0x1000 | 36        | 81 B  | 1200 ms  | 2     |
//! | basic   | 0x16     | 0x1024 | 39        | 87 B  | 2000 ms  | 2     |
//!
//! Settings are written one register at a time with function 0x18.

use std::time::Duration;

use crate::constants::{
    BASIC_COUNT, BASIC_READ_DEADLINE, BASIC_REPLY_LEN, BASIC_START, BLOCK_HEADER_LEN,
    BLOCK_READ_TRIES, CRC_LEN, FC_READ_BASIC, FC_READ_RUNNING, FC_WRITE_REGISTER, RUNNING_COUNT,
    RUNNING_READ_DEADLINE, RUNNING_REPLY_LEN, RUNNING_START,
};
use crate::frame::CommandFrame;

/// One contiguous register block read with a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    /// Name used in logs
    pub name: &'static str,
    /// Read function code
    pub function: u8,
    /// First register
    pub start: u16,
    /// Number of registers
    pub count: u16,
    /// Exact reply length
    pub reply_len: usize,
    /// Deadline of one read attempt
    pub deadline: Duration,
    /// Read attempts
    pub tries: usize,
}

impl BlockSpec {
    /// The GNFL running block.
    pub const fn running() -> Self {
        Self {
            name: "running",
            function: FC_READ_RUNNING,
            start: RUNNING_START,
            count: RUNNING_COUNT,
            reply_len: RUNNING_REPLY_LEN,
            deadline: RUNNING_READ_DEADLINE,
            tries: BLOCK_READ_TRIES,
        }
    }

    /// The GNFL basic block.
    pub const fn basic() -> Self {
        Self {
            name: "basic",
            function: FC_READ_BASIC,
            start: BASIC_START,
            count: BASIC_COUNT,
            reply_len: BASIC_REPLY_LEN,
            deadline: BASIC_READ_DEADLINE,
            tries: BLOCK_READ_TRIES,
        }
    }

    /// Read command stamped with `address`.
    pub fn command(&self, address: u8) -> CommandFrame {
        CommandFrame::new(address, self.function, self.start, self.count)
    }

    /// True if `register` lies inside this block.
    pub fn contains(&self, register: u16) -> bool {
        let end = u32::from(self.start) + u32::from(self.count);
        register >= self.start && u32::from(register) < end
    }

    /// Reply length implied by the register count.
    pub fn implied_reply_len(&self) -> usize {
        BLOCK_HEADER_LEN + usize::from(self.count) * 2 + CRC_LEN
    }

    /// Set the per-attempt deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set the number of read attempts.
    pub fn with_tries(mut self, tries: usize) -> Self {
        self.tries = tries;
        self
    }
}

/// Blocks and write function of one controller model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Model name used in logs
    pub model: &'static str,
    pub running: BlockSpec,
    pub basic: BlockSpec,
    /// Function code of a single-register write
    pub write_function: u8,
}

impl DeviceProfile {
    /// GNFL inverter/charger.
    pub const fn gnfl() -> Self {
        Self {
            model: "GNFL",
            running: BlockSpec::running(),
            basic: BlockSpec::basic(),
            write_function: FC_WRITE_REGISTER,
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::gnfl()
    }
}
