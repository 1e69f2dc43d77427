//! Cached parameter blocks
//!
//! A [`ParameterBlock`] holds the last reply of one block read together with
//! a validity flag. The flag drops as soon as a new read starts, so a failed
//! read never leaves stale values looking current.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::codec::{decode_raw, decode_scaled, Decoded};
use crate::engine::FrameEngine;
use crate::error::LinkResult;
use crate::frame::CommandFrame;
use crate::profile::BlockSpec;

/// Last reply of one block, readable only while valid.
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    spec: BlockSpec,
    command: CommandFrame,
    data: Vec<u8>,
    valid: bool,
}

impl ParameterBlock {
    /// Empty block for the device at `address`.
    pub fn new(spec: BlockSpec, address: u8) -> Self {
        Self {
            spec,
            command: spec.command(address),
            data: vec![0; spec.reply_len],
            valid: false,
        }
    }

    pub fn spec(&self) -> &BlockSpec {
        &self.spec
    }

    /// Read command sent for this block
    pub fn command(&self) -> &CommandFrame {
        &self.command
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Raw reply, if the last read succeeded
    pub fn bytes(&self) -> Option<&[u8]> {
        self.valid.then_some(self.data.as_slice())
    }

    /// Raw word of `register`, if the last read succeeded
    pub fn raw(&self, register: u16) -> Option<Decoded<u16>> {
        self.bytes()
            .map(|data| decode_raw(data, self.spec.start, register))
    }

    /// Scaled value of `register`, if the last read succeeded
    pub fn scaled(&self, register: u16, coefficient: f32) -> Option<Decoded<f32>> {
        self.bytes()
            .map(|data| decode_scaled(data, self.spec.start, register, coefficient))
    }

    /// Read the block over `stream`. The block is valid afterwards only on `Ok`.
    pub async fn read<S>(&mut self, engine: &mut FrameEngine, stream: &mut S) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.valid = false;

        let result = engine
            .request_exact(
                stream,
                self.command.as_bytes(),
                &mut self.data,
                self.spec.deadline,
                self.spec.tries,
            )
            .await;
        if let Err(e) = result {
            debug!("{} block read failed", self.spec.name);
            return Err(e);
        }

        debug!("{} block read: {} bytes", self.spec.name, self.data.len());
        self.valid = true;
        Ok(())
    }
}
