//! Platform-agnostic types for the blecore connection engine.
//!
//! This crate holds the data model shared between the engine
//! (`blecore`) and anything that consumes its streams, without pulling in
//! a BLE stack or an async runtime.
//!
//! # Features
//!
//! - Connection lifecycle status
//! - Scan result structures
//! - Standard Bluetooth SIG UUID constants
//! - Pure decoders for standard characteristics
//!
//! # Example
//!
//! ```
//! use blecore_types::{ConnectionStatus, decode_battery_level};
//!
//! let status = ConnectionStatus::connected("AA:BB:CC:DD:EE:FF");
//! assert!(status.is_connected());
//! assert_eq!(decode_battery_level(&[0x55]), Some(85));
//! ```

pub mod decode;
pub mod types;
pub mod uuid;

pub use decode::{decode_battery_level, decode_string};
pub use types::{AdvertisementData, ConnectionStatus, DeviceIdentity, ScanResult};
pub use uuid as uuids;
