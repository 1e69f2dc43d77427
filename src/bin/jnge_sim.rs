//! GNFL controller simulator
//!
//! Listens like the controller's TCP bridge and answers block reads and
//! setting writes. State can be changed from stdin while it runs.
//!
//! Usage: cargo run --bin jnge_sim [bind_address] [day|night]
//! Example: cargo run --bin jnge_sim 0.0.0.0:8899 night
//!
//! Console: day | night | acok | aclost | bat <u16> | seton <u16> |
//!          setoff <u16> | fault none|address|crc|silent | status

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

use jnge_link::simulator::{DeviceSimulator, SolarMode};
use jnge_link::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info")?;

    let mut args = std::env::args().skip(1);
    let bind = args.next().unwrap_or_else(|| "0.0.0.0:8899".to_string());
    let mode = match args.next().as_deref() {
        Some("night") => SolarMode::Night,
        _ => SolarMode::Day,
    };

    let simulator = DeviceSimulator::default();
    simulator.set_solar_mode(mode);

    let listener = TcpListener::bind(&bind).await?;
    info!("{}", simulator.state().summary());

    let console = simulator.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match console.apply_console_command(&line) {
                Ok(status) => info!("{}", status),
                Err(e) => warn!("{}", e),
            }
        }
    });

    simulator.serve(listener).await?;
    Ok(())
}
