//! Mock radio implementation for testing.
//!
//! This module provides a [`MockRadio`] and [`MockLink`] pair that implement
//! the [`Radio`] and [`Link`] traits without requiring BLE hardware.
//!
//! # Features
//!
//! - **Scripted scans**: push advertisements into a running scan with [`MockRadio::advertise`]
//! - **Failure injection**: make scans, connects, discovery or RSSI reads fail
//! - **Latency simulation**: delay connects and service discovery
//! - **Remote events**: change the link state or push notifications from the "device"

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream, WatchStream};
use uuid::Uuid;

use blecore_types::{AdvertisementData, DeviceIdentity, ScanResult};

use crate::error::{Error, Result};
use crate::radio::{GattCharacteristic, GattService, Link, LinkState, Radio};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A mock radio holding a set of [`MockLink`]s by address.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use blecore::mock::{MockLink, MockRadio};
/// use blecore::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
///
/// let link = Arc::new(
///     MockLink::builder("AA:BB:CC:DD:EE:FF")
///         .service(BATTERY_SERVICE, [BATTERY_LEVEL])
///         .build(),
/// );
/// let radio = MockRadio::new().with_link(link);
/// assert_eq!(radio.open_count(), 0);
/// ```
pub struct MockRadio {
    links: Mutex<HashMap<String, Arc<MockLink>>>,
    scan_tx: Mutex<Option<mpsc::UnboundedSender<Result<ScanResult>>>>,
    scans: watch::Sender<u32>,
    scan_should_fail: AtomicBool,
    connect_should_fail: AtomicBool,
    connect_latency_ms: AtomicU64,
    open_count: AtomicU32,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRadio")
            .field("links", &lock(&self.links).len())
            .field("open_count", &self.open_count())
            .finish()
    }
}

impl MockRadio {
    /// Create a radio with no devices.
    pub fn new() -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
            scan_tx: Mutex::new(None),
            scans: watch::Sender::new(0),
            scan_should_fail: AtomicBool::new(false),
            connect_should_fail: AtomicBool::new(false),
            connect_latency_ms: AtomicU64::new(0),
            open_count: AtomicU32::new(0),
        }
    }

    /// Register a device that [`open_link`](Radio::open_link) can reach.
    #[must_use]
    pub fn with_link(self, link: Arc<MockLink>) -> Self {
        self.add_link(link);
        self
    }

    /// Register a device after construction.
    pub fn add_link(&self, link: Arc<MockLink>) {
        lock(&self.links).insert(link.address.clone(), link);
    }

    /// Deliver an advertisement to the scan in progress.
    ///
    /// Returns `false` if no scan is running.
    pub fn advertise(&self, result: ScanResult) -> bool {
        lock(&self.scan_tx)
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(result)).is_ok())
    }

    /// Convenience wrapper around [`advertise`](Self::advertise).
    pub fn advertise_device(&self, address: &str, name: Option<&str>, rssi: i16) -> bool {
        let device = match name {
            Some(name) => DeviceIdentity::with_name(address, name),
            None => DeviceIdentity::new(address),
        };
        self.advertise(ScanResult::new(
            device,
            AdvertisementData {
                connectable: true,
                rssi: Some(rssi),
            },
        ))
    }

    /// Fail the scan in progress with `error`, ending it.
    pub fn fail_scan(&self, error: Error) -> bool {
        lock(&self.scan_tx)
            .take()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Wait until at least `count` scans have been started.
    pub async fn wait_for_scans(&self, count: u32) {
        let mut rx = self.scans.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }

    /// Number of scans started so far.
    pub fn scan_count(&self) -> u32 {
        *self.scans.borrow()
    }

    /// Whether the most recent scan's consumer is still listening.
    pub fn is_scanning(&self) -> bool {
        lock(&self.scan_tx).as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Make scans fail to start.
    pub fn set_scan_should_fail(&self, fail: bool) {
        self.scan_should_fail.store(fail, Ordering::Relaxed);
    }

    /// Make link opening fail.
    pub fn set_connect_should_fail(&self, fail: bool) {
        self.connect_should_fail.store(fail, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(millis(latency), Ordering::Relaxed);
    }

    /// Number of links successfully opened.
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn scan(&self, _filters: &[Uuid]) -> Result<BoxStream<'static, Result<ScanResult>>> {
        if self.scan_should_fail.load(Ordering::Relaxed) {
            return Err(Error::Other("Mock scan failure".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.scan_tx) = Some(tx);
        self.scans.send_modify(|started| *started += 1);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn open_link(&self, address: &str) -> Result<Arc<dyn Link>> {
        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.connect_should_fail.load(Ordering::Relaxed) {
            return Err(Error::Other("Mock connect failure".to_string()));
        }
        let link = lock(&self.links)
            .get(address)
            .cloned()
            .ok_or_else(|| Error::device_not_found(address))?;
        link.reopen();
        self.open_count.fetch_add(1, Ordering::Relaxed);
        Ok(link as Arc<dyn Link>)
    }
}

/// A mock link to a single device.
pub struct MockLink {
    address: String,
    declared: Vec<GattService>,
    services: watch::Sender<Vec<GattService>>,
    state: watch::Sender<LinkState>,
    notifiers: Mutex<HashMap<Uuid, broadcast::Sender<Bytes>>>,
    values: Mutex<HashMap<Uuid, Bytes>>,
    rssi: AtomicI16,
    rssi_failures: AtomicU32,
    rssi_reads: AtomicU32,
    discovery_should_fail: AtomicBool,
    discovery_latency_ms: AtomicU64,
    close_should_fail: AtomicBool,
    close_count: AtomicU32,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("address", &self.address)
            .field("state", &*self.state.borrow())
            .field("close_count", &self.close_count())
            .finish()
    }
}

impl MockLink {
    /// Start building a link for `address`.
    pub fn builder(address: impl Into<String>) -> MockLinkBuilder {
        MockLinkBuilder::new(address)
    }

    /// Current low-level state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Whether the link is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == LinkState::Disconnected
    }

    /// Simulate a state change reported by the device or the stack.
    ///
    /// Moving to [`LinkState::Disconnected`] ends every subscription.
    pub fn set_state(&self, state: LinkState) {
        self.state.send_replace(state);
        if state == LinkState::Disconnected {
            lock(&self.notifiers).clear();
        }
    }

    /// Push a notification to subscribers of `characteristic`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn notify(&self, characteristic: Uuid, value: impl AsRef<[u8]>) -> usize {
        lock(&self.notifiers)
            .get(&characteristic)
            .and_then(|tx| tx.send(Bytes::copy_from_slice(value.as_ref())).ok())
            .unwrap_or(0)
    }

    /// Number of live subscriptions on `characteristic`.
    pub fn subscriber_count(&self, characteristic: Uuid) -> usize {
        lock(&self.notifiers)
            .get(&characteristic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Wait until something subscribes to `characteristic`.
    pub async fn wait_for_subscribers(&self, characteristic: Uuid) {
        while self.subscriber_count(characteristic) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Set the value returned by reads of `characteristic`.
    pub fn set_value(&self, characteristic: Uuid, value: impl AsRef<[u8]>) {
        lock(&self.values).insert(characteristic, Bytes::copy_from_slice(value.as_ref()));
    }

    /// Set the reported signal strength.
    pub fn set_rssi(&self, rssi: i16) {
        self.rssi.store(rssi, Ordering::Relaxed);
    }

    /// Fail the next `count` RSSI reads, then succeed.
    pub fn set_rssi_failures(&self, count: u32) {
        self.rssi_failures.store(count, Ordering::Relaxed);
    }

    /// Number of successful RSSI reads.
    pub fn rssi_reads(&self) -> u32 {
        self.rssi_reads.load(Ordering::Relaxed)
    }

    /// Make service discovery fail.
    pub fn set_discovery_should_fail(&self, fail: bool) {
        self.discovery_should_fail.store(fail, Ordering::Relaxed);
    }

    /// Delay service discovery.
    pub fn set_discovery_latency(&self, latency: Duration) {
        self.discovery_latency_ms
            .store(millis(latency), Ordering::Relaxed);
    }

    /// Make `close` return an error (the link still closes).
    pub fn set_close_should_fail(&self, fail: bool) {
        self.close_should_fail.store(fail, Ordering::Relaxed);
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::Relaxed)
    }

    fn reopen(&self) {
        self.services.send_replace(Vec::new());
        self.state.send_replace(LinkState::Connected);
    }

    fn declared_characteristic(&self, characteristic: &GattCharacteristic) -> Result<()> {
        let service = self
            .declared
            .iter()
            .find(|s| s.uuid == characteristic.service_uuid)
            .ok_or(Error::ServiceNotFound {
                uuid: characteristic.service_uuid,
            })?;
        service
            .find_characteristic(characteristic.uuid)
            .map(|_| ())
            .ok_or(Error::CharacteristicNotFound {
                uuid: characteristic.uuid,
                service: characteristic.service_uuid,
            })
    }
}

#[async_trait]
impl Link for MockLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn discover_services(&self) -> Result<()> {
        let latency = self.discovery_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.discovery_should_fail.load(Ordering::Relaxed) {
            return Err(Error::Other("Mock discovery failure".to_string()));
        }
        self.services.send_replace(self.declared.clone());
        Ok(())
    }

    fn services(&self) -> watch::Receiver<Vec<GattService>> {
        self.services.subscribe()
    }

    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Bytes> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        self.declared_characteristic(characteristic)?;
        lock(&self.values)
            .get(&characteristic.uuid)
            .cloned()
            .ok_or_else(|| Error::Other(format!("No value for {}", characteristic.uuid)))
    }

    async fn subscribe(
        &self,
        characteristic: &GattCharacteristic,
    ) -> Result<BoxStream<'static, Bytes>> {
        if self.is_closed() {
            return Err(Error::LinkClosed);
        }
        self.declared_characteristic(characteristic)?;
        let rx = lock(&self.notifiers)
            .entry(characteristic.uuid)
            .or_insert_with(|| broadcast::channel(16).0)
            .subscribe();
        Ok(BroadcastStream::new(rx)
            .filter_map(|item| futures::future::ready(item.ok()))
            .boxed())
    }

    async fn read_rssi(&self) -> Result<i16> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        let remaining = self.rssi_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.rssi_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(Error::Other("Mock RSSI failure".to_string()));
        }
        self.rssi_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.rssi.load(Ordering::Relaxed))
    }

    async fn connection_states(&self) -> Result<BoxStream<'static, LinkState>> {
        Ok(WatchStream::new(self.state.subscribe()).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::Relaxed);
        if !self.is_closed() {
            self.set_state(LinkState::Disconnected);
        }
        if self.close_should_fail.load(Ordering::Relaxed) {
            return Err(Error::Other("Mock close failure".to_string()));
        }
        Ok(())
    }
}

/// Builder for creating [`MockLink`]s with custom services and values.
#[derive(Debug, Clone)]
pub struct MockLinkBuilder {
    address: String,
    services: Vec<GattService>,
    values: HashMap<Uuid, Bytes>,
    rssi: i16,
}

impl MockLinkBuilder {
    /// Create a builder with no services and an RSSI of -60 dBm.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            services: Vec::new(),
            values: HashMap::new(),
            rssi: -60,
        }
    }

    /// Declare a service and its characteristics.
    #[must_use]
    pub fn service(mut self, uuid: Uuid, characteristics: impl IntoIterator<Item = Uuid>) -> Self {
        self.services.push(GattService::new(uuid, characteristics));
        self
    }

    /// Set the value returned by reads of `characteristic`.
    #[must_use]
    pub fn value(mut self, characteristic: Uuid, value: impl AsRef<[u8]>) -> Self {
        self.values
            .insert(characteristic, Bytes::copy_from_slice(value.as_ref()));
        self
    }

    /// Set the reported signal strength.
    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Build the link. It starts connected with no services discovered.
    #[must_use]
    pub fn build(self) -> MockLink {
        MockLink {
            address: self.address,
            declared: self.services,
            services: watch::Sender::new(Vec::new()),
            state: watch::Sender::new(LinkState::Connected),
            notifiers: Mutex::new(HashMap::new()),
            values: Mutex::new(self.values),
            rssi: AtomicI16::new(self.rssi),
            rssi_failures: AtomicU32::new(0),
            rssi_reads: AtomicU32::new(0),
            discovery_should_fail: AtomicBool::new(false),
            discovery_latency_ms: AtomicU64::new(0),
            close_should_fail: AtomicBool::new(false),
            close_count: AtomicU32::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blecore_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE, FIRMWARE_REVISION};

    fn link() -> MockLink {
        MockLink::builder("AA:BB:CC:DD:EE:FF")
            .service(BATTERY_SERVICE, [BATTERY_LEVEL])
            .service(DEVICE_INFO_SERVICE, [FIRMWARE_REVISION])
            .value(FIRMWARE_REVISION, b"1.2.3")
            .rssi(-42)
            .build()
    }

    #[tokio::test]
    async fn test_discovery_publishes_services() {
        let link = link();
        assert!(link.services().borrow().is_empty());
        link.discover_services().await.unwrap();
        assert!(link.find_service(BATTERY_SERVICE).is_some());
        assert!(link.find_service(DEVICE_INFO_SERVICE).is_some());
    }

    #[tokio::test]
    async fn test_read_value() {
        let link = link();
        let ch = GattCharacteristic {
            service_uuid: DEVICE_INFO_SERVICE,
            uuid: FIRMWARE_REVISION,
        };
        assert_eq!(link.read(&ch).await.unwrap(), Bytes::from_static(b"1.2.3"));

        let missing = GattCharacteristic {
            service_uuid: DEVICE_INFO_SERVICE,
            uuid: BATTERY_LEVEL,
        };
        assert!(matches!(
            link.read(&missing).await,
            Err(Error::CharacteristicNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rssi_transient_failures() {
        let link = link();
        link.set_rssi_failures(2);
        assert!(link.read_rssi().await.is_err());
        assert!(link.read_rssi().await.is_err());
        assert_eq!(link.read_rssi().await.unwrap(), -42);
        assert_eq!(link.rssi_reads(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_subscriptions() {
        let link = link();
        let ch = GattCharacteristic {
            service_uuid: BATTERY_SERVICE,
            uuid: BATTERY_LEVEL,
        };
        let mut notifications = link.subscribe(&ch).await.unwrap();
        assert_eq!(link.notify(BATTERY_LEVEL, [7]), 1);
        assert_eq!(notifications.next().await, Some(Bytes::from_static(&[7])));

        link.close().await.unwrap();
        link.close().await.unwrap();
        assert_eq!(link.close_count(), 2);
        assert!(link.is_closed());
        assert_eq!(notifications.next().await, None);
        assert!(matches!(link.subscribe(&ch).await, Err(Error::LinkClosed)));
    }

    #[tokio::test]
    async fn test_connection_states_start_with_current() {
        let link = link();
        let mut states = link.connection_states().await.unwrap();
        assert_eq!(states.next().await, Some(LinkState::Connected));
        link.set_state(LinkState::Disconnected);
        assert_eq!(states.next().await, Some(LinkState::Disconnected));
    }

    #[tokio::test]
    async fn test_radio_open_and_scan() {
        let radio = MockRadio::new().with_link(Arc::new(link()));
        assert!(radio.open_link("AA:BB:CC:DD:EE:FF").await.is_ok());
        assert!(matches!(
            radio.open_link("11:22:33:44:55:66").await,
            Err(Error::DeviceNotFound(_))
        ));
        assert_eq!(radio.open_count(), 1);

        assert!(!radio.advertise_device("AA:BB:CC:DD:EE:FF", None, -50));
        let mut scan = radio.scan(&[]).await.unwrap();
        assert!(radio.advertise_device("AA:BB:CC:DD:EE:FF", Some("Sensor"), -50));
        let first = scan.next().await.unwrap().unwrap();
        assert_eq!(first.device.name.as_deref(), Some("Sensor"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_latency() {
        let radio = MockRadio::new().with_link(Arc::new(link()));
        radio.set_connect_latency(Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        radio.open_link("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
