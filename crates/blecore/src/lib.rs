//! BLE connection lifecycle engine.
//!
//! This crate hides Bluetooth Low Energy scan, connect and notification
//! plumbing behind a small set of observable streams. It manages a single
//! active connection, cancels every background task spawned for that
//! connection when it is torn down, and publishes a handful of standard
//! profile readings.
//!
//! # Features
//!
//! - **Scanning**: deduplicated, insertion-ordered device snapshots
//! - **Connection lifecycle**: `Connecting → Connected → Disconnecting → Disconnected`
//!   on a replay-of-latest stream
//! - **Characteristic streams**: raw notifications for any `(service, characteristic)` pair
//! - **Standard profiles**: battery level, firmware revision, manufacturer name, RSSI
//! - **Deterministic teardown**: every task is registered under a connection epoch
//!   and cancelled together
//! - **Pluggable radio**: the [`Radio`] / [`Link`] traits, with a btleplug backend
//!   and a mock for tests
//!
//! # Platform Differences
//!
//! - **macOS**: devices are identified by a CoreBluetooth UUID rather than a MAC
//!   address. The UUID is stable per device per Mac.
//! - **Linux/Windows**: devices are identified by their MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use blecore::{BleConfig, BleCore, BtleplugRadio};
//!
//! static BLE: BleCore = BleCore::new();
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = Arc::new(BtleplugRadio::new().await?);
//!     let client = BLE.initialize(radio, BleConfig::default())?;
//!
//!     // Pick the first device that shows up
//!     let mut scan = client.scan();
//!     let Some(Ok(devices)) = scan.next().await else {
//!         return Ok(());
//!     };
//!     client.stop_scan();
//!
//!     let mut battery = client.battery();
//!     client.connect(devices[0].address()).await;
//!     if let Some(level) = battery.next().await {
//!         println!("Battery: {level}%");
//!     }
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod latest;
pub mod mock;
pub mod observe;
pub mod profile;
pub mod radio;
pub mod registry;
pub mod scan;

// Core exports
pub use btle::{BtleplugLink, BtleplugRadio, get_adapter};
pub use client::BleClient;
pub use config::{BleConfig, DEFAULT_CONNECT_TIMEOUT, SERVICE_DISCOVERY_TIMEOUT};
pub use context::BleCore;
pub use error::{DeviceNotFoundReason, Error, Result};
pub use latest::{Latest, LatestStream};
pub use observe::CharacteristicObserver;
pub use radio::{GattCharacteristic, GattService, Link, LinkState, Radio};
pub use registry::{Epoch, TaskKind, TaskRegistry};
pub use scan::{DeviceTable, ScanAggregator, ScanSnapshot, ScanStream};

pub use mock::{MockLink, MockLinkBuilder, MockRadio};

// Re-export from blecore-types
pub use blecore_types::uuid as uuids;
pub use blecore_types::{
    AdvertisementData, ConnectionStatus, DeviceIdentity, ScanResult, decode_battery_level,
    decode_string,
};
