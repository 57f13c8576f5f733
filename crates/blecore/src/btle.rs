//! Radio backend built on [`btleplug`].
//!
//! [`BtleplugRadio`] wraps the first available adapter. Scans are driven by
//! the adapter's [`CentralEvent`] stream, and links wrap a connected
//! [`Peripheral`].
//!
//! btleplug does not report whether an advertisement is connectable, so
//! every discovered device is reported as connectable.
//!
//! On macOS the stack hides MAC addresses (they read as
//! `00:00:00:00:00:00`); devices are then identified by their peripheral id.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::future::ready;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blecore_types::{AdvertisementData, DeviceIdentity, ScanResult};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::radio::{GattCharacteristic, GattService, Link, LinkState, Radio};

const UNKNOWN_ADDRESS: &str = "00:00:00:00:00:00";

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// MAC address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Stable address string for a peripheral: its MAC address, or its
/// peripheral id where the MAC is hidden.
pub fn device_address(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == UNKNOWN_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether `candidate` names the same device as `wanted`.
///
/// Case-insensitive; colons in MAC addresses are optional.
pub fn address_matches(candidate: &str, wanted: &str) -> bool {
    if candidate.is_empty() || candidate == UNKNOWN_ADDRESS {
        return false;
    }
    let normalize = |s: &str| s.replace(':', "").to_lowercase();
    normalize(candidate) == normalize(wanted)
}

fn scan_result(peripheral: &Peripheral, properties: PeripheralProperties) -> ScanResult {
    let address = device_address(&properties.address.to_string(), &peripheral.id());
    ScanResult::new(
        DeviceIdentity {
            address,
            name: properties.local_name,
        },
        AdvertisementData {
            connectable: true,
            rssi: properties.rssi,
        },
    )
}

/// Runs `F` when dropped.
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// A [`Radio`] backed by a btleplug adapter.
#[derive(Debug, Clone)]
pub struct BtleplugRadio {
    adapter: Adapter,
}

impl BtleplugRadio {
    /// Use the first available adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self::from_adapter(get_adapter().await?))
    }

    /// Use a specific adapter.
    pub fn from_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn find_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral_matches(&peripheral, address).await {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Scan until a peripheral matching `address` is discovered.
    ///
    /// Runs until the device shows up or the adapter's event stream ends.
    /// Callers bound it with their connect timeout; dropping the future
    /// stops the scan.
    async fn scan_for_peripheral(&self, address: &str) -> Result<Peripheral> {
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!("Device {} not known yet, scanning for it", address);
        let _stop = stop_scan_on_drop(self.adapter.clone());

        // Covers a device that was discovered between the cache lookup and
        // the start of the scan.
        if let Some(peripheral) = self.find_peripheral(address).await? {
            return Ok(peripheral);
        }

        let adapter = self.adapter.clone();
        let discovered = events.filter_map(|event| {
            ready(match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
                _ => None,
            })
        });
        first_match(discovered, |id| {
            let adapter = adapter.clone();
            async move {
                let peripheral = adapter.peripheral(&id).await.ok()?;
                if peripheral_matches(&peripheral, address).await {
                    Some(peripheral)
                } else {
                    None
                }
            }
        })
        .await
        .ok_or_else(|| Error::device_not_found(address))
    }
}

async fn peripheral_matches(peripheral: &Peripheral, address: &str) -> bool {
    let id = format_peripheral_id(&peripheral.id());
    if address_matches(&id, address) {
        debug!("Matched by peripheral ID: {}", id);
        return true;
    }
    if let Ok(Some(properties)) = peripheral.properties().await
        && address_matches(&properties.address.to_string(), address)
    {
        debug!("Matched by address: {}", properties.address);
        return true;
    }
    false
}

/// The first item of `candidates` for which `check` yields a value.
async fn first_match<S, T, F, Fut>(candidates: S, check: F) -> Option<T>
where
    S: Stream,
    F: FnMut(S::Item) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut found = std::pin::pin!(candidates.filter_map(check));
    found.next().await
}

fn stop_scan_on_drop(adapter: Adapter) -> OnDrop<impl FnOnce()> {
    OnDrop::new(move || {
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("Failed to stop scan: {}", e);
                }
            });
        }
    })
}

#[async_trait]
impl Radio for BtleplugRadio {
    async fn scan(&self, filters: &[Uuid]) -> Result<BoxStream<'static, Result<ScanResult>>> {
        let events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter {
                services: filters.to_vec(),
            })
            .await?;
        info!(filters = filters.len(), "Started BLE scan");

        let stop = stop_scan_on_drop(self.adapter.clone());

        let adapter = self.adapter.clone();
        let results = events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => return None,
                    };
                    let peripheral = match adapter.peripheral(&id).await {
                        Ok(peripheral) => peripheral,
                        Err(e) => {
                            debug!("Discovered peripheral vanished: {}", e);
                            return None;
                        }
                    };
                    let properties = peripheral.properties().await.ok().flatten()?;
                    Some(Ok(scan_result(&peripheral, properties)))
                }
            })
            .map(move |result| {
                let _stop = &stop;
                result
            });
        Ok(results.boxed())
    }

    async fn open_link(&self, address: &str) -> Result<Arc<dyn Link>> {
        let peripheral = match self.find_peripheral(address).await? {
            Some(peripheral) => {
                debug!("Found {} among known peripherals", address);
                peripheral
            }
            None => self.scan_for_peripheral(address).await?,
        };

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        info!("Link opened to {}", address);
        Ok(Arc::new(BtleplugLink::new(
            self.adapter.clone(),
            peripheral,
            address.to_string(),
        )))
    }
}

/// A [`Link`] over a connected btleplug peripheral.
#[derive(Debug)]
pub struct BtleplugLink {
    adapter: Adapter,
    peripheral: Peripheral,
    address: String,
    services: watch::Sender<Vec<GattService>>,
}

impl BtleplugLink {
    fn new(adapter: Adapter, peripheral: Peripheral, address: String) -> Self {
        Self {
            adapter,
            peripheral,
            address,
            services: watch::Sender::new(Vec::new()),
        }
    }

    fn characteristic(&self, target: &GattCharacteristic) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == target.uuid && c.service_uuid == target.service_uuid)
            .ok_or(Error::CharacteristicNotFound {
                uuid: target.uuid,
                service: target.service_uuid,
            })
    }
}

#[async_trait]
impl Link for BtleplugLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn discover_services(&self) -> Result<()> {
        self.peripheral.discover_services().await?;
        let services: Vec<GattService> = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(|c| GattCharacteristic {
                        service_uuid: c.service_uuid,
                        uuid: c.uuid,
                    })
                    .collect(),
            })
            .collect();
        debug!(count = services.len(), "Discovered services");
        self.services.send_replace(services);
        Ok(())
    }

    fn services(&self) -> watch::Receiver<Vec<GattService>> {
        self.services.subscribe()
    }

    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Bytes> {
        let target = self.characteristic(characteristic)?;
        Ok(Bytes::from(self.peripheral.read(&target).await?))
    }

    async fn subscribe(
        &self,
        characteristic: &GattCharacteristic,
    ) -> Result<BoxStream<'static, Bytes>> {
        let target = self.characteristic(characteristic)?;
        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&target).await?;

        let uuid = target.uuid;
        let peripheral = self.peripheral.clone();
        let unsubscribe = OnDrop::new(move || {
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = peripheral.unsubscribe(&target).await {
                        debug!("Failed to unsubscribe from {}: {}", target.uuid, e);
                    }
                });
            }
        });

        Ok(notifications
            .filter_map(move |n| ready((n.uuid == uuid).then(|| Bytes::from(n.value))))
            .map(move |value| {
                let _unsubscribe = &unsubscribe;
                value
            })
            .boxed())
    }

    async fn read_rssi(&self) -> Result<i16> {
        self.peripheral
            .properties()
            .await?
            .and_then(|p| p.rssi)
            .ok_or_else(|| Error::Other("RSSI not available".to_string()))
    }

    async fn connection_states(&self) -> Result<BoxStream<'static, LinkState>> {
        let events = self.adapter.events().await?;
        let initial = if self.peripheral.is_connected().await? {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        };
        let id = self.peripheral.id();
        let changes = events.filter_map(move |event| {
            ready(match event {
                CentralEvent::DeviceConnected(peer) if peer == id => Some(LinkState::Connected),
                CentralEvent::DeviceDisconnected(peer) if peer == id => {
                    Some(LinkState::Disconnected)
                }
                _ => None,
            })
        });
        Ok(stream::once(ready(initial)).chain(changes).boxed())
    }

    async fn close(&self) -> Result<()> {
        match self.peripheral.is_connected().await {
            Ok(false) => return Ok(()),
            Ok(true) => {}
            Err(e) => warn!("Could not query connection state before close: {}", e),
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
