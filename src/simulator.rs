//! # Device Simulator
//!
//! In-process stand-in for a GNFL controller behind its TCP bridge, for
//! development without hardware and for the integration tests.
//!
//! Replies are built from two captured controller replies with a handful of
//! registers patched from the simulator state:
//!
//! | Register | Source                                   |
//! |----------|------------------------------------------|
//! | 0x1001   | mains: 230.0 V when present, 0 when lost |
//! | 0x1006   | battery voltage (0.1 V)                  |
//! | 0x1020   | PV voltage: 90.0 V by day, 0 by night    |
//! | 0x1023   | PV power: 12000 W by day, 800 W by night |
//! | 0x1037   | inverter-on setpoint (writable)          |
//! | 0x1038   | inverter-off setpoint (writable)         |
//!
//! Requests arrive as 8-byte frames. Frames with a bad CRC and requests the
//! device does not know are dropped without a reply, as the controller does.
//! Faults can be injected to exercise the client's validation paths.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::codec::register_offset;
use crate::constants::{
    BASIC_COUNT, BASIC_START, COMMAND_FRAME_LEN, CRC_LEN, DEFAULT_DEVICE_ADDRESS, EXCEPTION_FLAG,
    FC_READ_BASIC, FC_READ_RUNNING, FC_WRITE_REGISTER, RUNNING_COUNT, RUNNING_START,
};
use crate::error::{LinkError, LinkResult};
use crate::frame::{append_crc, check_crc, format_hex, CommandFrame};
use crate::registers::{
    BATTERY_VOLTAGE, INVERTER_OFF_VOLTAGE, INVERTER_ON_VOLTAGE, MAINS_VOLTAGE, PV_POWER,
    PV_VOLTAGE,
};

/// Running block reply captured from a controller (address 0x06)
pub const STANDARD_RUNNING_REPLY: [u8; 81] = [
    0x06, 0x12, 0x4C, 0x11, 0x00, 0x03, 0xC7, 0x00, 0x00, 0x08, 0xFF, 0x08,
    0xFF, 0x00, 0x00, 0x00, 0x02, 0x00, 0x06, 0x01, 0x12, 0x00, 0xE7, 0x00,
    0x00, 0x00, 0x00, 0x13, 0x78, 0x00, 0x00, 0x00, 0x04, 0x9F, 0xF7, 0x00,
    0x00, 0x3A, 0xE7, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00,
    0xA1, 0x00, 0x00, 0x00, 0x01, 0x0C, 0x1C, 0x08, 0xFC, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03,
    0x6A, 0x00, 0x02, 0x00, 0x03, 0x00, 0x37, 0x00, 0x66,
];

/// Basic block reply captured from a controller (address 0x06)
pub const STANDARD_BASIC_REPLY: [u8; 87] = [
    0x06, 0x16, 0x52, 0x11, 0x00, 0x03, 0xC7, 0x01, 0x36, 0x01, 0x2A, 0x01,
    0x2C, 0x01, 0x20, 0x01, 0x08, 0x01, 0x14, 0x00, 0xCC, 0x01, 0x06, 0x00,
    0xD8, 0x00, 0x01, 0x00, 0x03, 0x00, 0x02, 0x00, 0x01, 0x00, 0x06, 0x9F,
    0xF7, 0x06, 0xF4, 0x07, 0x3A, 0x09, 0xC4, 0x0A, 0x3E, 0x01, 0x06, 0x00,
    0xE6, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0xF4, 0x00, 0xC8, 0x00,
    0x01, 0x17, 0x70, 0x00, 0xFA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x78, 0xD6,
];

/// Exception code for an unknown register
pub const ILLEGAL_DATA_ADDRESS: u8 = 0x02;

const DAY_PV_POWER_W: u16 = 12000;
const NIGHT_PV_POWER_W: u16 = 800;
const DAY_PV_VOLTAGE: u16 = 900;
const NIGHT_PV_VOLTAGE: u16 = 0;
const MAINS_PRESENT: u16 = 2300;
const MAINS_LOST: u16 = 0;
const DEFAULT_BATTERY: u16 = 274;
/// Defaults for a two-battery string
const DEFAULT_INVERTER_ON: u16 = 262;
const DEFAULT_INVERTER_OFF: u16 = 230;

/// Time of day as seen by the PV input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarMode {
    Day,
    Night,
}

/// Injected misbehaviour, applied to every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// Reply from a different device address, CRC still valid
    WrongAddress,
    /// Last CRC byte flipped
    CorruptCrc,
    /// No reply at all
    Silent,
}

/// Simulated controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimState {
    pub solar: SolarMode,
    pub mains_present: bool,
    /// Battery voltage, 0.1 V
    pub battery: u16,
    /// Inverter-on setpoint, 0.1 V
    pub inverter_on: u16,
    /// Inverter-off setpoint, 0.1 V
    pub inverter_off: u16,
    pub fault: Fault,
    /// Delay before each reply is sent
    pub reply_delay: Duration,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            solar: SolarMode::Day,
            mains_present: true,
            battery: DEFAULT_BATTERY,
            inverter_on: DEFAULT_INVERTER_ON,
            inverter_off: DEFAULT_INVERTER_OFF,
            fault: Fault::None,
            reply_delay: Duration::ZERO,
        }
    }
}

impl SimState {
    fn pv_power(&self) -> u16 {
        match self.solar {
            SolarMode::Day => DAY_PV_POWER_W,
            SolarMode::Night => NIGHT_PV_POWER_W,
        }
    }

    fn pv_voltage(&self) -> u16 {
        match self.solar {
            SolarMode::Day => DAY_PV_VOLTAGE,
            SolarMode::Night => NIGHT_PV_VOLTAGE,
        }
    }

    fn mains(&self) -> u16 {
        if self.mains_present {
            MAINS_PRESENT
        } else {
            MAINS_LOST
        }
    }

    /// One-line status for the console
    pub fn summary(&self) -> String {
        format!(
            "[{:?}] PV {:.1} V / {} W | mains {:.1} V | battery {:.1} V | on/off {}/{} | {:?}",
            self.solar,
            f32::from(self.pv_voltage()) * PV_VOLTAGE.coefficient,
            self.pv_power(),
            f32::from(self.mains()) * MAINS_VOLTAGE.coefficient,
            f32::from(self.battery) * BATTERY_VOLTAGE.coefficient,
            self.inverter_on,
            self.inverter_off,
            self.fault,
        )
    }
}

/// Shared, cloneable simulated controller.
#[derive(Debug, Clone)]
pub struct DeviceSimulator {
    address: u8,
    state: Arc<Mutex<SimState>>,
}

impl Default for DeviceSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_ADDRESS)
    }
}

impl DeviceSimulator {
    /// Simulator answering on `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Device address
    pub fn address(&self) -> u8 {
        self.address
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SimState {
        *self.lock()
    }

    pub fn set_solar_mode(&self, mode: SolarMode) {
        self.lock().solar = mode;
    }

    pub fn set_mains_present(&self, present: bool) {
        self.lock().mains_present = present;
    }

    /// Battery voltage in 0.1 V
    pub fn set_battery(&self, raw: u16) {
        self.lock().battery = raw;
    }

    pub fn set_inverter_on(&self, raw: u16) {
        self.lock().inverter_on = raw;
    }

    pub fn set_inverter_off(&self, raw: u16) {
        self.lock().inverter_off = raw;
    }

    pub fn set_fault(&self, fault: Fault) {
        self.lock().fault = fault;
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        self.lock().reply_delay = delay;
    }

    /// Running block reply for the current state.
    pub fn running_reply(&self) -> Vec<u8> {
        let state = self.state();
        let mut frame = self.template(&STANDARD_RUNNING_REPLY);
        let patches = [
            (PV_VOLTAGE.address, state.pv_voltage()),
            (PV_POWER.address, state.pv_power()),
            (BATTERY_VOLTAGE.address, state.battery),
            (MAINS_VOLTAGE.address, state.mains()),
        ];
        for (register, value) in patches {
            patch_register(&mut frame, RUNNING_START, RUNNING_COUNT, register, value);
        }
        append_crc(&mut frame);
        frame
    }

    /// Basic block reply for the current state.
    pub fn basic_reply(&self) -> Vec<u8> {
        let state = self.state();
        let mut frame = self.template(&STANDARD_BASIC_REPLY);
        let patches = [
            (INVERTER_ON_VOLTAGE.address, state.inverter_on),
            (INVERTER_OFF_VOLTAGE.address, state.inverter_off),
        ];
        for (register, value) in patches {
            patch_register(&mut frame, BASIC_START, BASIC_COUNT, register, value);
        }
        append_crc(&mut frame);
        frame
    }

    /// Captured reply without its CRC, re-addressed to this simulator
    fn template(&self, captured: &[u8]) -> Vec<u8> {
        let mut frame = captured[..captured.len() - CRC_LEN].to_vec();
        frame[0] = self.address;
        frame
    }

    /// Answer one 8-byte request, or `None` if the device stays silent.
    pub fn handle_request(&self, request: &[u8]) -> Option<Vec<u8>> {
        if request.len() != COMMAND_FRAME_LEN {
            debug!("Ignoring {} byte request", request.len());
            return None;
        }
        if let Err(e) = check_crc(request) {
            debug!("Dropping request: {}", e);
            return None;
        }

        let mut bytes = [0u8; COMMAND_FRAME_LEN];
        bytes.copy_from_slice(request);
        let command = CommandFrame::from_bytes(bytes);
        if command.address() != self.address {
            debug!("Request for device 0x{:02X} ignored", command.address());
            return None;
        }

        let reply = match (command.function(), command.start(), command.value()) {
            (FC_READ_RUNNING, RUNNING_START, RUNNING_COUNT) => self.running_reply(),
            (FC_READ_BASIC, BASIC_START, BASIC_COUNT) => self.basic_reply(),
            (FC_WRITE_REGISTER, register, value) => self.write_register(&command, register, value),
            _ => {
                debug!("Unknown request {}", format_hex(request));
                return None;
            }
        };

        self.apply_fault(reply)
    }

    fn write_register(&self, command: &CommandFrame, register: u16, value: u16) -> Vec<u8> {
        let mut state = self.lock();
        if register == INVERTER_ON_VOLTAGE.address {
            state.inverter_on = value;
        } else if register == INVERTER_OFF_VOLTAGE.address {
            state.inverter_off = value;
        } else {
            warn!("Write to unsupported register 0x{:04X}", register);
            let mut reply = vec![
                self.address,
                FC_WRITE_REGISTER | EXCEPTION_FLAG,
                ILLEGAL_DATA_ADDRESS,
            ];
            append_crc(&mut reply);
            return reply;
        }

        info!("Write 0x{:04X} = {}", register, value);
        let mut ack = command.as_bytes()[..COMMAND_FRAME_LEN - CRC_LEN].to_vec();
        append_crc(&mut ack);
        ack
    }

    fn apply_fault(&self, mut reply: Vec<u8>) -> Option<Vec<u8>> {
        match self.state().fault {
            Fault::None => Some(reply),
            Fault::WrongAddress => {
                reply.truncate(reply.len() - CRC_LEN);
                reply[0] = self.address.wrapping_add(1);
                append_crc(&mut reply);
                Some(reply)
            }
            Fault::CorruptCrc => {
                if let Some(last) = reply.last_mut() {
                    *last ^= 0xFF;
                }
                Some(reply)
            }
            Fault::Silent => None,
        }
    }

    /// Apply one console command and return the resulting status line.
    ///
    /// Commands: `day`, `night`, `acok`, `aclost`, `bat <u16>`,
    /// `seton <u16>`, `setoff <u16>`, `fault none|address|crc|silent`, `status`.
    pub fn apply_console_command(&self, line: &str) -> LinkResult<String> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("").to_ascii_lowercase();
        let argument = parts.next();

        let raw = || -> LinkResult<u16> {
            argument
                .and_then(|a| a.parse::<u16>().ok())
                .ok_or_else(|| {
                    LinkError::configuration(format!("{} needs a value 0..=65535", command))
                })
        };

        match command.as_str() {
            "day" => self.set_solar_mode(SolarMode::Day),
            "night" => self.set_solar_mode(SolarMode::Night),
            "acok" => self.set_mains_present(true),
            "aclost" => self.set_mains_present(false),
            "bat" => self.set_battery(raw()?),
            "seton" => self.set_inverter_on(raw()?),
            "setoff" => self.set_inverter_off(raw()?),
            "fault" => {
                let fault = match argument {
                    Some("none") => Fault::None,
                    Some("address") => Fault::WrongAddress,
                    Some("crc") => Fault::CorruptCrc,
                    Some("silent") => Fault::Silent,
                    _ => {
                        return Err(LinkError::configuration(
                            "fault needs none, address, crc or silent",
                        ))
                    }
                };
                self.set_fault(fault);
            }
            "status" | "s" => {}
            other => {
                return Err(LinkError::configuration(format!("Unknown command: {}", other)))
            }
        }

        Ok(self.state().summary())
    }

    /// Accept clients forever, one task per connection.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!("Simulator listening on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = listener.accept().await?;
            info!("Client connected: {}", peer);
            let simulator = self.clone();
            tokio::spawn(async move {
                if let Err(e) = simulator.serve_connection(stream).await {
                    debug!("Client {}: {}", peer, e);
                }
                info!("Client closed: {}", peer);
            });
        }
    }

    /// Serve one client until it disconnects.
    pub async fn serve_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        let mut pending: Vec<u8> = Vec::with_capacity(64);
        let mut chunk = [0u8; 256];

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            pending.extend_from_slice(&chunk[..n]);

            while pending.len() >= COMMAND_FRAME_LEN {
                let request: Vec<u8> = pending.drain(..COMMAND_FRAME_LEN).collect();
                debug!("REQ: {}", format_hex(&request));

                if let Some(reply) = self.handle_request(&request) {
                    let delay = self.state().reply_delay;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    stream.write_all(&reply).await?;
                }
            }
        }
    }
}

/// Overwrite the word of `register` in a block reply without CRC.
fn patch_register(frame: &mut [u8], start: u16, count: u16, register: u16, value: u16) {
    if register < start || register - start >= count {
        return;
    }
    let offset = register_offset(start, register) as usize;
    frame[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_raw;
    use crate::frame::{exception_of, validate_response};

    fn request(function: u8, start: u16, value: u16) -> Vec<u8> {
        CommandFrame::new(0x06, function, start, value).as_bytes().to_vec()
    }

    #[test]
    fn test_captured_replies_are_valid() {
        assert!(validate_response(&STANDARD_RUNNING_REPLY, 0x06).is_ok());
        assert!(validate_response(&STANDARD_BASIC_REPLY, 0x06).is_ok());
        assert_eq!(decode_raw(&STANDARD_RUNNING_REPLY, 0x1000, 0x1001).value(), 2303);
        assert_eq!(decode_raw(&STANDARD_BASIC_REPLY, 0x1024, 0x1037).value(), 262);
    }

    #[test]
    fn test_running_reply_reflects_state() {
        let sim = DeviceSimulator::default();
        let reply = sim.handle_request(&request(0x12, 0x1000, 0x24)).unwrap();

        assert_eq!(reply.len(), 81);
        assert!(validate_response(&reply, 0x06).is_ok());
        assert_eq!(decode_raw(&reply, 0x1000, 0x1020).value(), 900);
        assert_eq!(decode_raw(&reply, 0x1000, 0x1023).value(), 12000);
        assert_eq!(decode_raw(&reply, 0x1000, 0x1006).value(), 274);
        assert_eq!(decode_raw(&reply, 0x1000, 0x1001).value(), 2300);

        sim.set_solar_mode(SolarMode::Night);
        sim.set_mains_present(false);
        let reply = sim.running_reply();
        assert_eq!(decode_raw(&reply, 0x1000, 0x1020).value(), 0);
        assert_eq!(decode_raw(&reply, 0x1000, 0x1023).value(), 800);
        assert_eq!(decode_raw(&reply, 0x1000, 0x1001).value(), 0);
    }

    #[test]
    fn test_write_then_read_setpoint() {
        let sim = DeviceSimulator::default();
        let write = request(0x18, 0x1038, 220);

        let ack = sim.handle_request(&write).unwrap();
        assert_eq!(ack, write);
        assert_eq!(sim.state().inverter_off, 220);

        let basic = sim.handle_request(&request(0x16, 0x1024, 0x27)).unwrap();
        assert_eq!(basic.len(), 87);
        assert_eq!(decode_raw(&basic, 0x1024, 0x1038).value(), 220);
    }

    #[test]
    fn test_write_unknown_register_is_exception() {
        let sim = DeviceSimulator::default();
        let reply = sim.handle_request(&request(0x18, 0x1000, 1)).unwrap();

        assert_eq!(reply.len(), 5);
        assert!(validate_response(&reply, 0x06).is_ok());
        assert_eq!(exception_of(&reply), Some((0x18, ILLEGAL_DATA_ADDRESS)));
    }

    #[test]
    fn test_silently_drops_bad_requests() {
        let sim = DeviceSimulator::default();

        let mut bad_crc = request(0x12, 0x1000, 0x24);
        bad_crc[7] ^= 0x01;
        assert!(sim.handle_request(&bad_crc).is_none());

        let other_device = CommandFrame::new(0x07, 0x12, 0x1000, 0x24);
        assert!(sim.handle_request(other_device.as_bytes()).is_none());

        assert!(sim.handle_request(&request(0x12, 0x1000, 0x10)).is_none());
        assert!(sim.handle_request(&request(0x03, 0x0000, 0x01)).is_none());
    }

    #[test]
    fn test_faults() {
        let sim = DeviceSimulator::default();
        let read = request(0x12, 0x1000, 0x24);

        sim.set_fault(Fault::WrongAddress);
        let reply = sim.handle_request(&read).unwrap();
        assert!(check_crc(&reply).is_ok());
        assert_eq!(reply[0], 0x07);

        sim.set_fault(Fault::CorruptCrc);
        let reply = sim.handle_request(&read).unwrap();
        assert!(check_crc(&reply).is_err());

        sim.set_fault(Fault::Silent);
        assert!(sim.handle_request(&read).is_none());
    }

    #[test]
    fn test_console_commands() {
        let sim = DeviceSimulator::default();

        sim.apply_console_command("night").unwrap();
        sim.apply_console_command("bat 251").unwrap();
        sim.apply_console_command("seton 270").unwrap();
        sim.apply_console_command("fault crc").unwrap();

        let state = sim.state();
        assert_eq!(state.solar, SolarMode::Night);
        assert_eq!(state.battery, 251);
        assert_eq!(state.inverter_on, 270);
        assert_eq!(state.fault, Fault::CorruptCrc);

        assert!(sim.apply_console_command("bat").is_err());
        assert!(sim.apply_console_command("setoff 70000").is_err());
        assert!(sim.apply_console_command("reboot").is_err());
        assert!(sim.apply_console_command("status").unwrap().contains("Night"));
    }
}
