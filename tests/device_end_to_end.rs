use std::net::SocketAddr;
use std::time::Duration;

use jnge_link::frame::CommandFrame;
use jnge_link::registers::{
    BATTERY_VOLTAGE, INVERTER_OFF_VOLTAGE, INVERTER_ON_VOLTAGE, MAINS_VOLTAGE, PV_POWER,
    PV_VOLTAGE,
};
use jnge_link::simulator::{DeviceSimulator, Fault, SolarMode};
use jnge_link::{
    BlockSpec, ConnectionKeeper, DeviceProfile, FrameEngine, GnflDevice, LinkConfig, LinkError,
    TcpConnector,
};
use tokio::net::TcpListener;

const SHORT_DEADLINE: Duration = Duration::from_millis(200);

async fn start_simulator() -> (DeviceSimulator, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let simulator = DeviceSimulator::default();
    tokio::spawn(simulator.clone().serve(listener));
    (simulator, addr)
}

/// Device with short block deadlines so failure paths finish quickly
fn fast_device(config: &LinkConfig) -> GnflDevice {
    let profile = DeviceProfile {
        running: BlockSpec::running().with_deadline(SHORT_DEADLINE),
        basic: BlockSpec::basic().with_deadline(SHORT_DEADLINE),
        ..DeviceProfile::gnfl()
    };
    GnflDevice::with_profile(FrameEngine::from_config(config), profile)
}

async fn connect(addr: SocketAddr) -> (LinkConfig, ConnectionKeeper<TcpConnector>) {
    let config = LinkConfig::new(addr).with_reconnect_interval(Duration::from_millis(50));
    let mut keeper = ConnectionKeeper::tcp(&config);
    assert!(keeper.maintain().await);
    (config, keeper)
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 0.001,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[tokio::test]
async fn test_poll_decodes_simulated_day() {
    let (_sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = GnflDevice::new(&config);

    let report = device.poll_link(&mut keeper).await;
    assert!(report.is_complete(), "{:?}", report);

    assert_close(device.parameter(&PV_POWER).unwrap().value(), 12000.0);
    assert_close(device.parameter(&PV_VOLTAGE).unwrap().value(), 90.0);
    assert_close(device.parameter(&BATTERY_VOLTAGE).unwrap().value(), 27.4);
    assert_close(device.parameter(&MAINS_VOLTAGE).unwrap().value(), 230.0);
    assert_close(device.parameter(&INVERTER_ON_VOLTAGE).unwrap().value(), 26.2);
    assert_close(device.parameter(&INVERTER_OFF_VOLTAGE).unwrap().value(), 23.0);

    let stats = device.stats();
    assert_eq!(stats.requests_sent, 2);
    assert_eq!(stats.responses_received, 2);
    assert_eq!(stats.bytes_received, 81 + 87);
}

#[tokio::test]
async fn test_state_changes_show_on_next_poll() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = GnflDevice::new(&config);

    assert!(device.poll_link(&mut keeper).await.is_complete());

    sim.set_solar_mode(SolarMode::Night);
    sim.set_mains_present(false);
    sim.set_battery(251);

    assert!(device.poll_link(&mut keeper).await.is_complete());
    assert_close(device.parameter(&PV_POWER).unwrap().value(), 800.0);
    assert_close(device.parameter(&PV_VOLTAGE).unwrap().value(), 0.0);
    assert_close(device.parameter(&MAINS_VOLTAGE).unwrap().value(), 0.0);
    assert_close(device.parameter(&BATTERY_VOLTAGE).unwrap().value(), 25.1);
}

#[tokio::test]
async fn test_write_setting_round_trip() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = GnflDevice::new(&config);

    let stream = keeper.stream_mut().unwrap();
    device
        .write_parameter(stream, &INVERTER_OFF_VOLTAGE, 22.0)
        .await
        .unwrap();
    assert_eq!(sim.state().inverter_off, 220);

    assert!(device.poll_link(&mut keeper).await.is_complete());
    assert_close(device.parameter(&INVERTER_OFF_VOLTAGE).unwrap().value(), 22.0);
}

#[tokio::test]
async fn test_write_unknown_register_reports_exception() {
    let (_sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = GnflDevice::new(&config);

    let stream = keeper.stream_mut().unwrap();
    let result = device.write_register(stream, 0x1000, 5).await;

    assert_eq!(
        result,
        Err(LinkError::Exception {
            function: 0x18,
            code: 0x02
        })
    );
    assert!(keeper.is_connected());
}

#[tokio::test]
async fn test_send_command_with_template_frame() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut engine = FrameEngine::from_config(&config);

    // Template carries placeholder address and value; both are patched in
    let mut frame = *CommandFrame::new(0xFF, 0x18, 0x1037, 0).as_bytes();
    let stream = keeper.stream_mut().unwrap();
    let reply = engine
        .send_command(stream, &mut frame, 0x06, 255)
        .await
        .unwrap()
        .to_vec();

    let expected = CommandFrame::new(0x06, 0x18, 0x1037, 255);
    assert_eq!(reply, expected.as_bytes());
    assert_eq!(frame, *expected.as_bytes());
    assert_eq!(engine.last_response(), expected.as_bytes());
    assert_eq!(sim.state().inverter_on, 255);
}

#[tokio::test]
async fn test_wrong_address_invalidates_blocks() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = fast_device(&config);

    assert!(device.poll_link(&mut keeper).await.is_complete());

    sim.set_fault(Fault::WrongAddress);
    let report = device.poll_link(&mut keeper).await;

    assert!(matches!(
        report.running,
        Err(LinkError::AddressMismatch {
            expected: 0x06,
            actual: 0x07
        })
    ));
    assert!(matches!(report.basic, Err(LinkError::AddressMismatch { .. })));
    assert!(!device.running().is_valid());
    assert!(device.parameter(&PV_POWER).is_none());
    // A bad frame is not a broken link
    assert!(keeper.is_connected());

    sim.set_fault(Fault::None);
    assert!(device.poll_link(&mut keeper).await.is_complete());
}

#[tokio::test]
async fn test_corrupt_crc_is_rejected() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = fast_device(&config);

    sim.set_fault(Fault::CorruptCrc);
    let report = device.poll_link(&mut keeper).await;

    assert!(matches!(report.running, Err(LinkError::CrcMismatch { .. })));
    assert!(matches!(report.basic, Err(LinkError::CrcMismatch { .. })));
    assert!(device.parameter(&INVERTER_ON_VOLTAGE).is_none());
}

#[tokio::test]
async fn test_silent_device_times_out_then_recovers() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = fast_device(&config);

    assert!(device.poll_link(&mut keeper).await.is_complete());

    sim.set_fault(Fault::Silent);
    let report = device.poll_link(&mut keeper).await;
    assert!(report.running.as_ref().unwrap_err().is_timeout());
    assert!(report.basic.as_ref().unwrap_err().is_timeout());
    assert!(!device.basic().is_valid());
    assert!(keeper.is_connected());
    assert_eq!(device.stats().timeouts, 4);

    sim.set_fault(Fault::None);
    assert!(device.poll_link(&mut keeper).await.is_complete());
}

#[tokio::test]
async fn test_late_reply_is_flushed_before_next_command() {
    let (sim, addr) = start_simulator().await;
    let (config, mut keeper) = connect(addr).await;
    let mut device = fast_device(&config);

    // The reply arrives after both 200 ms attempts have given up
    sim.set_reply_delay(Duration::from_millis(500));
    let stream = keeper.stream_mut().unwrap();
    assert!(device.read_running_block(stream).await.is_err());

    sim.set_reply_delay(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stream = keeper.stream_mut().unwrap();
    device.read_basic_block(stream).await.unwrap();
    assert!(device.stats().bytes_flushed > 0);
    assert_close(device.parameter(&INVERTER_ON_VOLTAGE).unwrap().value(), 26.2);
}
