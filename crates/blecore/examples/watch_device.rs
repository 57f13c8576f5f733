//! Example: Watching a Connected Device
//!
//! Connects to a device, prints its connection status, battery level,
//! device information and RSSI as they arrive, and disconnects on Ctrl-C.
//!
//! Run with: `cargo run --example watch_device -- AA:BB:CC:DD:EE:FF`

use std::sync::Arc;

use futures::StreamExt;

use blecore::{BleConfig, BleCore, BtleplugRadio};

static BLE: BleCore = BleCore::new();

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(address) = std::env::args().nth(1) else {
        eprintln!("Usage: watch_device <ADDRESS>");
        std::process::exit(2);
    };

    let radio = Arc::new(BtleplugRadio::new().await?);
    let client = BLE.initialize(radio, BleConfig::default().rssi_poll_ms(2000))?;

    let mut status = client.connection_status();
    let mut battery = client.battery();
    let mut firmware = client.firmware_revision();
    let mut manufacturer = client.device_manufacturer();
    let mut rssi = client.rssi();

    client.connect(&address).await;

    loop {
        tokio::select! {
            Some(s) = status.next() => {
                println!("Status: {s}");
                if s.is_disconnected() {
                    break;
                }
            }
            Some(level) = battery.next() => println!("Battery: {level}%"),
            Some(version) = firmware.next() => println!("Firmware: {version}"),
            Some(name) = manufacturer.next() => println!("Manufacturer: {name}"),
            Some(value) = rssi.next() => println!("RSSI: {value} dBm"),
            _ = tokio::signal::ctrl_c() => {
                println!("Disconnecting...");
                client.disconnect().await?;
                break;
            }
        }
    }

    Ok(())
}
