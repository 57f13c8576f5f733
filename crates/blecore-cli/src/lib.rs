//! Command-line interface for the blecore BLE connection engine.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby connectable devices |
//! | `connect` | Connect and watch status, battery, RSSI and device info |
//! | `notify` | Hex-dump notifications from any characteristic |
//! | `config` | Manage CLI configuration |
//!
//! # Output Formats
//!
//! - **Text** (default): Human-readable output
//! - **JSON**: one JSON document for `scan`, one JSON object per line for
//!   `connect` and `notify`
//!
//! Logs go to stderr, so stdout stays machine-readable.
//!
//! # Configuration
//!
//! The CLI stores configuration in `~/.config/blecore/config.toml` (or
//! platform equivalent), overridable with `--config` or `BLECORE_CONFIG`:
//!
//! - `device`: Default device address
//! - `format`: Default output format
//! - `timeout`: Connection timeout in seconds
//! - `rssi_interval`: RSSI poll interval in milliseconds (0 disables)
//!
//! # Environment Variables
//!
//! - `BLECORE_DEVICE`: Default device address (overridden by `--device`)
//! - `BLECORE_CONFIG`: Config file location
//! - `RUST_LOG`: Log filter when neither `-v` nor `-q` is given
//!
//! # Examples
//!
//! ```bash
//! blecore scan --timeout 5
//! blecore connect --device AA:BB:CC:DD:EE:FF --duration 60 --format json
//! blecore notify --device AA:BB:CC:DD:EE:FF --service 180f --characteristic 2a19
//! blecore config set device AA:BB:CC:DD:EE:FF
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod util;

// Re-export the engine for convenience
pub use blecore;
