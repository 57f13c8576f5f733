//! Example: Scanning for BLE Devices
//!
//! This example scans for nearby connectable devices for ten seconds and
//! prints each snapshot as it changes.
//!
//! Run with: `cargo run --example scan_devices`

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::time::timeout;

use blecore::{BleClient, BleConfig, BtleplugRadio, ScanResult};

fn print_device(device: &ScanResult) {
    let name = device.device.name.as_deref().unwrap_or("Unknown");
    let rssi = device
        .data
        .rssi
        .map(|r| format!("{} dBm", r))
        .unwrap_or_else(|| "N/A".to_string());
    println!("  {:<24} {}  {}", name, device.address(), rssi);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let radio = Arc::new(BtleplugRadio::new().await?);
    let client = BleClient::new(radio, BleConfig::default(), Handle::current())?;

    println!("Scanning for BLE devices...");
    println!();

    let mut scan = client.scan();
    let mut latest = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, scan.next()).await {
            Ok(Some(snapshot)) => latest = snapshot?,
            Ok(None) | Err(_) => break,
        }
    }
    client.stop_scan();

    if latest.is_empty() {
        println!("No devices found.");
        println!();
        println!("Make sure:");
        println!("  - The device is powered on and advertising");
        println!("  - Bluetooth is enabled on this computer");
    } else {
        println!("Found {} device(s):", latest.len());
        println!();
        for device in &latest {
            print_device(device);
        }
    }

    Ok(())
}
