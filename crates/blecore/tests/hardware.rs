//! Hardware tests for blecore
//!
//! These tests require a Bluetooth adapter and a powered-on peripheral, and
//! should be run with:
//! ```text
//! BLECORE_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package blecore --test hardware -- --ignored --nocapture
//! ```
//!
//! `BLECORE_DEVICE` is the address (or, on macOS, the peripheral UUID) of
//! the device to connect to. The scan test does not need it.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::time::timeout;

use blecore::{BleClient, BleConfig, BtleplugRadio, ConnectionStatus};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn get_device() -> Option<String> {
    env::var("BLECORE_DEVICE").ok()
}

async fn hardware_client() -> BleClient {
    let radio = BtleplugRadio::new()
        .await
        .expect("no Bluetooth adapter available");
    BleClient::new(Arc::new(radio), BleConfig::default(), Handle::current())
        .expect("default config is valid")
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_finds_devices() {
    let client = hardware_client().await;
    let mut scan = client.scan();

    let snapshot = timeout(BLE_TIMEOUT, scan.next())
        .await
        .expect("no device advertised within 30 seconds")
        .expect("scan ended without a snapshot")
        .expect("scan failed");

    assert!(!snapshot.is_empty());
    for device in &snapshot {
        println!(
            "  {} ({}) {:?} dBm",
            device.device.name.as_deref().unwrap_or("Unknown"),
            device.address(),
            device.data.rssi
        );
    }
    client.stop_scan();
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_read_profile() {
    let Some(address) = get_device() else {
        println!("BLECORE_DEVICE not set, skipping");
        return;
    };
    let client = hardware_client().await;
    let mut status = client.connection_status();

    client.connect(&address).await;
    assert_eq!(status.next().await, Some(ConnectionStatus::Connecting));
    let connected = status.next().await.expect("status stream ended");
    assert!(connected.is_connected(), "connection failed: {connected}");

    let mut rssi = client.rssi();
    match timeout(BLE_TIMEOUT, rssi.next()).await {
        Ok(Some(value)) => println!("RSSI: {value} dBm"),
        _ => println!("No RSSI reading"),
    }
    let mut manufacturer = client.device_manufacturer();
    if let Ok(Some(name)) = timeout(Duration::from_secs(10), manufacturer.next()).await {
        println!("Manufacturer: {name}");
    }

    client.disconnect().await.expect("disconnect task panicked");
    assert_eq!(
        client.current_status(),
        Some(ConnectionStatus::disconnected("Manual disconnect", true))
    );
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_without_prior_scan() {
    let Some(address) = get_device() else {
        println!("BLECORE_DEVICE not set, skipping");
        return;
    };
    // A fresh adapter has no cached peripherals, so connect must find the
    // device on its own.
    let radio = BtleplugRadio::new()
        .await
        .expect("no Bluetooth adapter available");
    let client = BleClient::new(Arc::new(radio), BleConfig::default(), Handle::current())
        .expect("default config is valid");

    client.connect_with_timeout(&address, BLE_TIMEOUT).await;
    let status = client.current_status().expect("no status emitted");
    assert!(status.is_connected(), "connection failed: {status}");

    client.disconnect().await.expect("disconnect task panicked");
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_unknown_device_fails() {
    let client = hardware_client().await;
    client
        .connect_with_timeout("00:11:22:33:44:55", Duration::from_secs(5))
        .await;

    let status = client.current_status().expect("no status emitted");
    assert!(status.is_disconnected());
}
