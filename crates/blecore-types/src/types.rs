//! Core data types shared by the connection engine and its consumers.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle status of the single active connection.
///
/// Exactly one status is current at any time. The connection engine
/// publishes these on a replay-of-latest stream, so late subscribers
/// immediately receive the most recent value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum ConnectionStatus {
    /// A link is being opened.
    Connecting,
    /// The link is up and services have been discovered.
    Connected {
        /// Address of the connected device.
        address: String,
    },
    /// The link is being torn down.
    Disconnecting,
    /// No link is active.
    Disconnected {
        /// Human-readable reason, if known.
        reason: Option<String>,
        /// Whether the disconnection was caused by an error condition.
        was_error: bool,
    },
}

impl ConnectionStatus {
    /// Build a `Connected` status.
    pub fn connected(address: impl Into<String>) -> Self {
        Self::Connected {
            address: address.into(),
        }
    }

    /// Build a `Disconnected` status with a reason.
    pub fn disconnected(reason: impl Into<String>, was_error: bool) -> Self {
        Self::Disconnected {
            reason: Some(reason.into()),
            was_error,
        }
    }

    /// Whether this status represents an established link.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Whether this is the terminal `Disconnected` state.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Address of the connected device, if connected.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Connected { address } => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { address } => write!(f, "Connected ({address})"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected {
                reason: Some(reason),
                ..
            } => write!(f, "Disconnected ({reason})"),
            Self::Disconnected { reason: None, .. } => write!(f, "Disconnected"),
        }
    }
}

/// Stable identity of an advertising device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Stable address string (MAC address, or platform identifier on macOS).
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl DeviceIdentity {
    /// Create an identity without a name.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Create an identity with a name.
    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }
}

/// Advertisement payload details relevant to connection decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdvertisementData {
    /// Whether the device accepts connections.
    pub connectable: bool,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

/// A single scan observation: who advertised and what they advertised.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanResult {
    /// The advertising device.
    pub device: DeviceIdentity,
    /// The most recent advertisement data for the device.
    pub data: AdvertisementData,
}

impl ScanResult {
    /// Create a scan result.
    pub fn new(device: DeviceIdentity, data: AdvertisementData) -> Self {
        Self { device, data }
    }

    /// Address of the advertising device.
    pub fn address(&self) -> &str {
        &self.device.address
    }

    /// Whether the advertisement was marked connectable.
    pub fn is_connectable(&self) -> bool {
        self.data.connectable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        let connected = ConnectionStatus::connected("AA:BB:CC:DD:EE:FF");
        assert!(connected.is_connected());
        assert_eq!(connected.address(), Some("AA:BB:CC:DD:EE:FF"));

        let disconnected = ConnectionStatus::disconnected("Manual disconnect", true);
        assert!(disconnected.is_disconnected());
        assert_eq!(disconnected.address(), None);
        assert!(!ConnectionStatus::Connecting.is_connected());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "Connecting");
        assert_eq!(
            ConnectionStatus::connected("AA:BB").to_string(),
            "Connected (AA:BB)"
        );
        assert_eq!(
            ConnectionStatus::disconnected("Connection timeout", true).to_string(),
            "Disconnected (Connection timeout)"
        );
        let bare = ConnectionStatus::Disconnected {
            reason: None,
            was_error: false,
        };
        assert_eq!(bare.to_string(), "Disconnected");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_status_serializes_with_tag() {
        let json = serde_json::to_value(ConnectionStatus::connected("AA:BB")).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["address"], "AA:BB");

        let json =
            serde_json::to_value(ConnectionStatus::disconnected("Connection timeout", true))
                .unwrap();
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["was_error"], true);
    }

    #[test]
    fn test_scan_result_accessors() {
        let result = ScanResult::new(
            DeviceIdentity::with_name("AA:BB", "Sensor"),
            AdvertisementData {
                connectable: true,
                rssi: Some(-60),
            },
        );
        assert_eq!(result.address(), "AA:BB");
        assert!(result.is_connectable());
        assert_eq!(result.device.name.as_deref(), Some("Sensor"));
    }
}
