//! Error types for blecore.
//!
//! Most runtime conditions in the connection engine never reach the caller:
//! timeouts, missing services and failed best-effort reads are absorbed
//! locally and surface as a terminal [`ConnectionStatus`] or as a stream
//! that ends without emitting. The errors in this module are what remains:
//! failures returned by the radio seam (which the engine logs and absorbs)
//! and programmer-misuse conditions that are returned immediately.
//!
//! # Where errors surface
//!
//! | Error | Surfaces as | Handled by |
//! |-------|-------------|------------|
//! | [`Error::Timeout`] (connect) | `Disconnected("Connection timeout")` | connection state machine |
//! | [`Error::Timeout`] (discovery) | empty characteristic stream | characteristic observer |
//! | [`Error::ServiceNotFound`] | empty stream, warning logged | characteristic observer |
//! | [`Error::CharacteristicNotFound`] | empty stream, warning logged | characteristic observer |
//! | [`Error::Bluetooth`] on read | warning logged, value skipped | profile reader, RSSI poller |
//! | [`Error::Bluetooth`] on close | debug log | teardown |
//! | [`Error::NotInitialized`] | `Err` from [`BleCore::client`] | caller |
//! | [`Error::NoRuntime`] | `Err` from [`BleCore::initialize`] | caller |
//! | [`Error::InvalidConfig`] | `Err` from [`BleCore::initialize`] | caller |
//!
//! A scan that cannot start (adapter missing, radio off) is delivered as the
//! final `Err` item of the scan stream.
//!
//! [`ConnectionStatus`]: blecore_types::ConnectionStatus
//! [`BleCore::client`]: crate::BleCore::client
//! [`BleCore::initialize`]: crate::BleCore::initialize

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the connection engine and its radio backends.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found on the adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while no link is active.
    #[error("Not connected to device")]
    NotConnected,

    /// The link was closed while the operation was in flight.
    #[error("Link closed")]
    LinkClosed,

    /// Required GATT service not present on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The service UUID that was not found.
        uuid: Uuid,
    },

    /// Required GATT characteristic not present in its service.
    #[error("Characteristic not found: {uuid} (in service {service})")]
    CharacteristicNotFound {
        /// The characteristic UUID that was not found.
        uuid: Uuid,
        /// The service that was searched.
        service: Uuid,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The client was used before [`BleCore::initialize`](crate::BleCore::initialize).
    #[error("BleCore not initialized - call initialize() first")]
    NotInitialized,

    /// Initialisation happened outside of a Tokio runtime.
    #[error("No Tokio runtime available - initialize from within a runtime or pass a handle")]
    NoRuntime,

    /// Radio backend failure that does not map onto a more specific variant.
    #[error("{0}")]
    Other(String),
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified address not known to the adapter.
    NotFound { address: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { address } => write!(f, "device '{}' not found", address),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific address.
    pub fn device_not_found(address: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            address: address.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error indicates programmer misuse rather than a runtime
    /// condition.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::NoRuntime | Self::InvalidConfig(_)
        )
    }
}

/// Result type alias using blecore's Error type.
pub type Result<T> = std::result::Result<T, Error>;
