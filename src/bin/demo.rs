//! JNGE Link Demo
//!
//! Polls a GNFL controller and prints the known parameters every cycle.
//!
//! Usage: cargo run --bin demo [bridge_address] [cycles] [interval_ms]
//! Example: cargo run --bin demo 192.168.4.1:8899 10 2000
//!
//! Start `jnge_sim` first to try it without hardware.

use std::time::Duration;

use jnge_link::{logging, registers, ConnectionKeeper, GnflDevice, LinkConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info")?;

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1:8899".to_string());
    let cycles: u32 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5);
    let interval_ms: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(2000);
    let interval = Duration::from_millis(interval_ms);

    println!("🔋 JNGE Link v{} Demo", jnge_link::VERSION);
    println!("=========================");

    let config = LinkConfig::from_address(&address)?.with_packet_logging(true);
    let mut keeper = ConnectionKeeper::tcp(&config);
    let mut device = GnflDevice::new(&config);

    println!("  Bridge: {}  device: 0x{:02X}", config.endpoint, config.device_address);

    for cycle in 1..=cycles {
        println!("\n📡 Cycle {}/{}", cycle, cycles);

        let report = device.poll_link(&mut keeper).await;
        if let Err(e) = &report.running {
            println!("  ⚠️  Running block: {}", e);
        }
        if let Err(e) = &report.basic {
            println!("  ⚠️  Basic block: {}", e);
        }

        for param in registers::ALL.iter() {
            match device.parameter(param) {
                Some(value) if value.is_clean() => {
                    println!("  {:<22} {:>8.1} {}", param.name, value.value(), param.unit)
                }
                Some(_) => println!("  {:<22} out of block", param.name),
                None => println!("  {:<22} --", param.name),
            }
        }

        if cycle < cycles {
            tokio::time::sleep(interval).await;
        }
    }

    let stats = device.stats();
    println!("\n📊 Statistics:");
    println!("    Requests: {}, Responses: {}", stats.requests_sent, stats.responses_received);
    println!("    Errors: {}, Timeouts: {}", stats.errors, stats.timeouts);
    println!(
        "    Bytes sent: {}, received: {}, flushed: {}",
        stats.bytes_sent, stats.bytes_received, stats.bytes_flushed
    );
    println!("    Connect attempts: {}", keeper.attempts());

    println!("\n🎉 Demo completed!");
    Ok(())
}
