//! # GNFL Device Driver
//!
//! Polls the running and basic parameter blocks of a GNFL inverter/charger
//! and decodes named parameters from the cached replies.
//!
//! ```rust,no_run
//! use jnge_link::{ConnectionKeeper, GnflDevice, LinkConfig, registers};
//!
//! #[tokio::main]
//! async fn main() -> jnge_link::LinkResult<()> {
//!     let config = LinkConfig::from_address("192.168.4.1")?;
//!     let mut keeper = ConnectionKeeper::tcp(&config);
//!     let mut device = GnflDevice::new(&config);
//!
//!     let report = device.poll_link(&mut keeper).await;
//!     if report.is_complete() {
//!         let pv = device.parameter(&registers::PV_POWER);
//!         println!("PV power: {:?}", pv.map(|d| d.value()));
//!     }
//!     Ok(())
//! }
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::block::ParameterBlock;
use crate::codec::Decoded;
use crate::config::LinkConfig;
use crate::constants::COMMAND_BODY_LEN;
use crate::engine::{FrameEngine, LinkStats};
use crate::error::{LinkError, LinkResult};
use crate::frame::{exception_of, CommandFrame};
use crate::keeper::{ConnectionKeeper, Connector};
use crate::profile::DeviceProfile;
use crate::registers::{BlockKind, Parameter};

/// Outcome of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub running: LinkResult<()>,
    pub basic: LinkResult<()>,
}

impl PollReport {
    fn unavailable() -> Self {
        Self {
            running: Err(LinkError::ConnectionUnavailable),
            basic: Err(LinkError::ConnectionUnavailable),
        }
    }

    /// Both blocks were read
    pub fn is_complete(&self) -> bool {
        self.running.is_ok() && self.basic.is_ok()
    }

    /// Any failure that leaves the stream unusable
    pub fn needs_reconnect(&self) -> bool {
        [&self.running, &self.basic]
            .iter()
            .any(|r| matches!(r, Err(e) if e.needs_reconnect()))
    }
}

/// Driver for one GNFL controller.
#[derive(Debug, Clone)]
pub struct GnflDevice {
    engine: FrameEngine,
    profile: DeviceProfile,
    running: ParameterBlock,
    basic: ParameterBlock,
}

impl GnflDevice {
    /// Driver for the device described by `config`.
    pub fn new(config: &LinkConfig) -> Self {
        Self::with_profile(FrameEngine::from_config(config), DeviceProfile::gnfl())
    }

    /// Driver with a custom engine and profile.
    pub fn with_profile(engine: FrameEngine, profile: DeviceProfile) -> Self {
        let address = engine.device_address();
        Self {
            running: ParameterBlock::new(profile.running, address),
            basic: ParameterBlock::new(profile.basic, address),
            engine,
            profile,
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn engine(&self) -> &FrameEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FrameEngine {
        &mut self.engine
    }

    pub fn stats(&self) -> &LinkStats {
        self.engine.stats()
    }

    /// Last running block reply
    pub fn running(&self) -> &ParameterBlock {
        &self.running
    }

    /// Last basic block reply
    pub fn basic(&self) -> &ParameterBlock {
        &self.basic
    }

    /// Read the running block.
    pub async fn read_running_block<S>(&mut self, stream: &mut S) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.running.read(&mut self.engine, stream).await
    }

    /// Read the basic block.
    pub async fn read_basic_block<S>(&mut self, stream: &mut S) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.basic.read(&mut self.engine, stream).await
    }

    /// Read the running block, then the basic block.
    ///
    /// The basic block is skipped when the running read left the stream unusable.
    pub async fn poll<S>(&mut self, stream: &mut S) -> PollReport
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let running = self.read_running_block(stream).await;
        let basic = match &running {
            Err(e) if e.needs_reconnect() => {
                self.basic.invalidate();
                Err(e.clone())
            }
            _ => self.read_basic_block(stream).await,
        };
        PollReport { running, basic }
    }

    /// One poll cycle over a kept connection.
    ///
    /// Reconnects when allowed, polls both blocks and drops the socket after
    /// a failure that leaves it unusable.
    pub async fn poll_link<C: Connector>(
        &mut self,
        keeper: &mut ConnectionKeeper<C>,
    ) -> PollReport {
        if !keeper.maintain().await {
            self.running.invalidate();
            self.basic.invalidate();
            return PollReport::unavailable();
        }

        let report = match keeper.stream_mut() {
            Ok(stream) => self.poll(stream).await,
            Err(_) => PollReport::unavailable(),
        };

        if report.needs_reconnect() {
            warn!("Link to {} lost, dropping socket", keeper.endpoint());
            keeper.disconnect();
        }
        report
    }

    /// Scaled value of a known parameter from its cached block.
    ///
    /// `None` while the block is invalid.
    pub fn parameter(&self, parameter: &Parameter) -> Option<Decoded<f32>> {
        self.block(parameter.block)
            .scaled(parameter.address, parameter.coefficient)
    }

    /// Raw word of any register in a cached block.
    pub fn raw(&self, block: BlockKind, register: u16) -> Option<Decoded<u16>> {
        self.block(block).raw(register)
    }

    fn block(&self, kind: BlockKind) -> &ParameterBlock {
        match kind {
            BlockKind::Running => &self.running,
            BlockKind::Basic => &self.basic,
        }
    }

    /// Write one setting register.
    ///
    /// The device must echo register and value; an exception reply becomes
    /// [`LinkError::Exception`]. A successful write invalidates the cached
    /// block holding the register until it is read again.
    pub async fn write_register<S>(
        &mut self,
        stream: &mut S,
        register: u16,
        value: u16,
    ) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let address = self.engine.device_address();
        let mut frame = CommandFrame::new(address, self.profile.write_function, register, 0);

        let reply = self
            .engine
            .send_command(stream, frame.as_mut_slice(), address, value)
            .await?;
        let result = check_write_ack(reply, &frame);
        self.engine.note("write register", result)?;

        debug!("Wrote 0x{:04X} = {}", register, value);
        if self.running.spec().contains(register) {
            self.running.invalidate();
        }
        if self.basic.spec().contains(register) {
            self.basic.invalidate();
        }
        Ok(())
    }

    /// Write a setting parameter in its own unit.
    pub async fn write_parameter<S>(
        &mut self,
        stream: &mut S,
        parameter: &Parameter,
        value: f32,
    ) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !parameter.is_setting() {
            return Err(LinkError::configuration(format!(
                "{} is read-only",
                parameter.name
            )));
        }
        self.write_register(stream, parameter.address, parameter.to_raw(value))
            .await
    }
}

/// Check a write reply against the frame that was sent.
fn check_write_ack(reply: &[u8], sent: &CommandFrame) -> LinkResult<()> {
    if let Some((function, code)) = exception_of(reply) {
        return Err(LinkError::Exception { function, code });
    }
    let body = &sent.as_bytes()[..COMMAND_BODY_LEN];
    if reply.len() < COMMAND_BODY_LEN || reply[..COMMAND_BODY_LEN] != *body {
        return Err(LinkError::protocol(format!(
            "Write of 0x{:04X} not echoed",
            sent.start()
        )));
    }
    Ok(())
}
