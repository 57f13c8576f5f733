//! Trait abstractions over the BLE radio stack.
//!
//! The connection engine never talks to a platform stack directly. It drives a
//! [`Radio`] (scan, open links) and the [`Link`]s it opens (service
//! discovery, reads, notifications, signal strength). The btleplug backend in
//! [`crate::btle`] and the test doubles in [`crate::mock`] both implement
//! these traits.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::watch;
use uuid::Uuid;

use blecore_types::ScanResult;

use crate::error::Result;

/// A GATT characteristic, identified by its own UUID and its service's UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    /// UUID of the service that owns this characteristic.
    pub service_uuid: Uuid,
    /// UUID of the characteristic.
    pub uuid: Uuid,
}

/// A discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// UUID of the service.
    pub uuid: Uuid,
    /// Characteristics exposed by the service.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Build a service from a list of characteristic UUIDs.
    pub fn new(uuid: Uuid, characteristics: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            uuid,
            characteristics: characteristics
                .into_iter()
                .map(|c| GattCharacteristic {
                    service_uuid: uuid,
                    uuid: c,
                })
                .collect(),
        }
    }

    /// Look up a characteristic of this service by UUID.
    pub fn find_characteristic(&self, uuid: Uuid) -> Option<GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid).copied()
    }
}

/// Low-level state of a single link, as reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// The radio: discovers devices and opens links to them.
///
/// Implementations must be usable behind `Arc<dyn Radio>`.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Start scanning, filtered to devices advertising any of `filters`
    /// (all devices when empty).
    ///
    /// Returns an error if the scan cannot start. Errors on the returned
    /// stream end the scan. Dropping the stream stops scanning.
    async fn scan(&self, filters: &[Uuid]) -> Result<BoxStream<'static, Result<ScanResult>>>;

    /// Open a link to the device with the given address.
    ///
    /// Not bounded by any timeout; callers wrap this in their own.
    async fn open_link(&self, address: &str) -> Result<Arc<dyn Link>>;
}

/// An open link to a single device.
#[async_trait]
pub trait Link: Send + Sync {
    /// Address of the remote device.
    fn address(&self) -> &str;

    /// Run service discovery. Results are published on [`services`](Self::services).
    async fn discover_services(&self) -> Result<()>;

    /// Observable list of discovered services. Empty until discovery completes.
    fn services(&self) -> watch::Receiver<Vec<GattService>>;

    /// Find a discovered service by UUID in the current snapshot.
    fn find_service(&self, uuid: Uuid) -> Option<GattService> {
        self.services().borrow().iter().find(|s| s.uuid == uuid).cloned()
    }

    /// Read a characteristic value.
    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Bytes>;

    /// Subscribe to notifications on a characteristic.
    ///
    /// The stream ends when the link closes. Dropping it unsubscribes.
    async fn subscribe(&self, characteristic: &GattCharacteristic)
    -> Result<BoxStream<'static, Bytes>>;

    /// Read the current signal strength in dBm.
    async fn read_rssi(&self) -> Result<i16>;

    /// Stream of low-level link state changes, starting with the current state.
    async fn connection_states(&self) -> Result<BoxStream<'static, LinkState>>;

    /// Close the link. Closing an already-closed link succeeds.
    async fn close(&self) -> Result<()>;
}
