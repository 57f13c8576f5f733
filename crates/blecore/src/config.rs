//! Client configuration.
//!
//! [`BleConfig`] is fixed at construction time. It can be built in code with
//! the builder-style setters or deserialized from a config file.
//!
//! ```
//! use blecore::BleConfig;
//! use blecore::uuids::BATTERY_SERVICE;
//!
//! let config = BleConfig::default()
//!     .scan_filter(BATTERY_SERVICE)
//!     .rssi_poll_ms(2_000)
//!     .logging_enabled(false);
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default RSSI polling interval in milliseconds.
pub const DEFAULT_RSSI_POLL_MS: i64 = 1_500;

/// Default connection timeout used by [`BleClient::connect`](crate::BleClient::connect).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// How long to wait for a service to appear after connecting.
pub const SERVICE_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Upper bound on closing a link during teardown.
pub const LINK_CLOSE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default buffer size for stream channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Immutable configuration for a [`BleClient`](crate::BleClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Service UUIDs to filter scanning by. Empty scans for everything.
    pub scan_filters: BTreeSet<Uuid>,
    /// Reserved. Accepted and stored but no reconnection logic consumes it.
    pub auto_reconnect: bool,
    /// Emit per-device and per-reading diagnostics.
    pub logging_enabled: bool,
    /// RSSI polling interval in milliseconds. Zero or negative disables polling.
    pub rssi_poll_ms: i64,
    /// Buffer size for scan snapshot channels.
    pub channel_capacity: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_filters: BTreeSet::new(),
            auto_reconnect: false,
            logging_enabled: true,
            rssi_poll_ms: DEFAULT_RSSI_POLL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BleConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service UUID to the scan filter set.
    #[must_use]
    pub fn scan_filter(mut self, service: Uuid) -> Self {
        self.scan_filters.insert(service);
        self
    }

    /// Replace the scan filter set.
    #[must_use]
    pub fn scan_filters(mut self, services: impl IntoIterator<Item = Uuid>) -> Self {
        self.scan_filters = services.into_iter().collect();
        self
    }

    /// Set the reserved auto-reconnect flag.
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Enable or disable diagnostic logging.
    #[must_use]
    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Set the RSSI polling interval in milliseconds.
    #[must_use]
    pub fn rssi_poll_ms(mut self, ms: i64) -> Self {
        self.rssi_poll_ms = ms;
        self
    }

    /// Set the channel buffer size.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// The RSSI polling interval, or `None` when polling is disabled.
    pub fn rssi_poll_interval(&self) -> Option<Duration> {
        u64::try_from(self.rssi_poll_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Scan filters as a list, in UUID order.
    pub fn scan_filter_list(&self) -> Vec<Uuid> {
        self.scan_filters.iter().copied().collect()
    }

    /// Validate the configuration.
    ///
    /// Checks that:
    /// - `channel_capacity` is > 0
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::invalid_config("channel_capacity must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blecore_types::uuids::{BATTERY_SERVICE, DEVICE_INFO_SERVICE};

    #[test]
    fn test_config_default() {
        let config = BleConfig::default();
        assert!(config.scan_filters.is_empty());
        assert!(!config.auto_reconnect);
        assert!(config.logging_enabled);
        assert_eq!(config.rssi_poll_ms, 1_500);
        assert_eq!(config.rssi_poll_interval(), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn test_rssi_polling_disabled() {
        assert_eq!(BleConfig::default().rssi_poll_ms(0).rssi_poll_interval(), None);
        assert_eq!(BleConfig::default().rssi_poll_ms(-5).rssi_poll_interval(), None);
    }

    #[test]
    fn test_scan_filters_are_a_set() {
        let config = BleConfig::default()
            .scan_filter(BATTERY_SERVICE)
            .scan_filter(DEVICE_INFO_SERVICE)
            .scan_filter(BATTERY_SERVICE);
        assert_eq!(config.scan_filters.len(), 2);
        assert_eq!(
            config.scan_filter_list(),
            vec![DEVICE_INFO_SERVICE, BATTERY_SERVICE]
        );
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let err = BleConfig::default().channel_capacity(0).validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: BleConfig = serde_json::from_str(r#"{"rssi_poll_ms": 0}"#).unwrap();
        assert_eq!(config.rssi_poll_ms, 0);
        assert!(config.logging_enabled);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }
}
