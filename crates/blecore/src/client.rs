//! The connection state machine.
//!
//! A [`BleClient`] owns at most one active link. Status moves through
//! `Connecting → Connected(address) → Disconnecting → Disconnected(reason)`
//! and is published on a replay-of-latest stream. Every background task
//! spawned for a connection is registered in the client's [`TaskRegistry`]
//! under that connection's epoch, and teardown cancels all of them before the
//! link is closed.
//!
//! Connection attempts and teardowns are serialized: a `connect` waits for a
//! running `disconnect` (and vice versa) before touching the link.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use blecore::{BleClient, BleConfig, BtleplugRadio};
//!
//! let radio = Arc::new(BtleplugRadio::new().await?);
//! let client = BleClient::new(radio, BleConfig::default(), Handle::current())?;
//!
//! let mut status = client.connection_status();
//! client.connect("AA:BB:CC:DD:EE:FF").await;
//! while let Some(status) = status.next().await {
//!     println!("{status}");
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blecore_types::ConnectionStatus;

use crate::config::{
    BleConfig, DEFAULT_CONNECT_TIMEOUT, LINK_CLOSE_TIMEOUT, SERVICE_DISCOVERY_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::latest::{Latest, LatestStream};
use crate::observe::CharacteristicObserver;
use crate::profile::{ProfileReader, ProfileStreams};
use crate::radio::{Link, LinkState, Radio};
use crate::registry::{Epoch, TaskKind, TaskRegistry};
use crate::scan::{ScanAggregator, ScanStream};

/// The single live link and the epoch its tasks were spawned in.
struct ActiveLink {
    address: String,
    link: Arc<dyn Link>,
    epoch: Epoch,
    cancel: CancellationToken,
}

struct ClientInner {
    radio: Arc<dyn Radio>,
    config: BleConfig,
    runtime: Handle,
    scanner: Arc<ScanAggregator>,
    observer: CharacteristicObserver,
    registry: Arc<TaskRegistry>,
    profile: ProfileReader,
    streams: Arc<ProfileStreams>,
    status: Arc<Latest<ConnectionStatus>>,
    /// Serializes connect and teardown.
    lifecycle: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveLink>>,
}

/// BLE client: scanning, a single managed connection, and its data streams.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct BleClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for BleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleClient")
            .field("config", &self.inner.config)
            .field("status", &self.inner.status.current())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl BleClient {
    /// Create a client that spawns its background work on `runtime`.
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(radio: Arc<dyn Radio>, config: BleConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(TaskRegistry::new(runtime.clone()));
        let streams = Arc::new(ProfileStreams::default());
        let observer = CharacteristicObserver::new(config.logging_enabled);
        let scanner = Arc::new(ScanAggregator::new(
            Arc::clone(&radio),
            runtime.clone(),
            config.scan_filter_list(),
            config.channel_capacity,
            config.logging_enabled,
        ));
        let profile = ProfileReader::new(
            Arc::clone(&registry),
            Arc::clone(&streams),
            observer.clone(),
            config.rssi_poll_interval(),
            config.logging_enabled,
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                radio,
                runtime,
                scanner,
                observer,
                registry,
                profile,
                streams,
                status: Arc::new(Latest::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                active: Mutex::new(None),
                config,
            }),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &BleConfig {
        &self.inner.config
    }

    /// Start a scan using the configured service filters.
    ///
    /// The scan is lazy and begins when the stream is first polled; starting
    /// it cancels any scan already in progress.
    pub fn scan(&self) -> ScanStream {
        self.inner.scanner.scan()
    }

    /// Stop the scan in progress, if any.
    pub fn stop_scan(&self) {
        self.inner.scanner.stop();
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.inner.scanner.is_scanning()
    }

    /// Connect to `address` with the default 10 second timeout.
    ///
    /// See [`connect_with_timeout`](Self::connect_with_timeout).
    pub async fn connect(&self, address: &str) {
        self.connect_with_timeout(address, DEFAULT_CONNECT_TIMEOUT)
            .await;
    }

    /// Connect to `address`, giving up after `connect_timeout`.
    ///
    /// Any existing connection is torn down first. The outcome is reported
    /// only through [`connection_status`](Self::connection_status): the
    /// attempt ends in either `Connected(address)` or
    /// `Disconnected(reason, was_error = true)`.
    ///
    /// The attempt runs on the client's runtime, so dropping the returned
    /// future does not abandon a half-open link.
    pub async fn connect_with_timeout(&self, address: &str, connect_timeout: Duration) {
        let inner = Arc::clone(&self.inner);
        let address = address.to_string();
        let attempt = self
            .inner
            .runtime
            .spawn(async move { inner.connect(address, connect_timeout).await });
        if let Err(e) = attempt.await {
            warn!("Connection attempt aborted: {}", e);
        }
    }

    /// Disconnect and tear everything down.
    ///
    /// Fire-and-forget: the work runs on the client's runtime and completion
    /// is observable through [`connection_status`](Self::connection_status).
    /// The returned handle may be awaited or dropped.
    ///
    /// When already disconnected this only makes sure nothing is left
    /// running; no status is emitted.
    pub fn disconnect(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.disconnect().await })
    }

    /// Connection status, replaying the current status to new subscribers.
    pub fn connection_status(&self) -> LatestStream<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// The current connection status, if any has been emitted.
    pub fn current_status(&self) -> Option<ConnectionStatus> {
        self.inner.status.current()
    }

    /// Address of the active link, if any.
    pub fn connected_address(&self) -> Option<String> {
        self.inner.lock_active().as_ref().map(|a| a.address.clone())
    }

    /// Raw notifications from `characteristic` of `service` on the active link.
    ///
    /// Ends empty if there is no link, or if the characteristic does not
    /// show up within the service discovery timeout. Ends when the link is
    /// torn down. Dropping the stream unsubscribes.
    pub fn observe_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> BoxStream<'static, Bytes> {
        let active = self
            .inner
            .lock_active()
            .as_ref()
            .map(|a| (Arc::clone(&a.link), a.cancel.clone()));
        match active {
            Some((link, cancel)) => self
                .inner
                .observer
                .observe(Some(link), service, characteristic, cancel),
            None => {
                if self.inner.config.logging_enabled {
                    warn!(%service, %characteristic, "Not connected, nothing to observe");
                }
                futures::stream::empty().boxed()
            }
        }
    }

    /// Signal strength readings in dBm.
    pub fn rssi(&self) -> LatestStream<i16> {
        self.inner.streams.rssi.subscribe()
    }

    /// Battery level readings in percent.
    pub fn battery(&self) -> LatestStream<u8> {
        self.inner.streams.battery.subscribe()
    }

    /// Firmware revision string from Device Information.
    pub fn firmware_revision(&self) -> LatestStream<String> {
        self.inner.streams.firmware_revision.subscribe()
    }

    /// Manufacturer name from Device Information.
    pub fn device_manufacturer(&self) -> LatestStream<String> {
        self.inner.streams.manufacturer.subscribe()
    }

    /// Last published signal strength, if any.
    pub fn current_rssi(&self) -> Option<i16> {
        self.inner.streams.rssi.current()
    }

    /// Last published battery level, if any.
    pub fn current_battery(&self) -> Option<u8> {
        self.inner.streams.battery.current()
    }

    /// Last published firmware revision, if any.
    pub fn current_firmware_revision(&self) -> Option<String> {
        self.inner.streams.firmware_revision.current()
    }

    /// Last published manufacturer name, if any.
    pub fn current_device_manufacturer(&self) -> Option<String> {
        self.inner.streams.manufacturer.current()
    }

    /// Kinds of background tasks currently running for the connection.
    pub fn active_tasks(&self) -> Vec<TaskKind> {
        self.inner.registry.kinds()
    }
}

impl ClientInner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, reason: String) {
        self.status
            .publish(ConnectionStatus::disconnected(reason, true));
    }

    #[tracing::instrument(level = "info", skip_all, fields(address = %address, timeout_secs = connect_timeout.as_secs_f64()))]
    async fn connect(&self, address: String, connect_timeout: Duration) {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;

        self.status.publish(ConnectionStatus::Connecting);
        info!("Connecting to {}", address);

        let link = match timeout(connect_timeout, self.radio.open_link(&address)).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", address, e);
                self.fail(format!("Connection failed: {e}"));
                return;
            }
            Err(_) => {
                warn!("Connection to {} timed out after {:?}", address, connect_timeout);
                self.fail("Connection timeout".to_string());
                return;
            }
        };

        let discovered = match timeout(SERVICE_DISCOVERY_TIMEOUT, link.discover_services()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("service discovery", SERVICE_DISCOVERY_TIMEOUT)),
        };
        if let Err(e) = discovered {
            warn!("Service discovery on {} failed: {}", address, e);
            close_link(link.as_ref()).await;
            self.fail(format!("Service discovery failed: {e}"));
            return;
        }

        let (epoch, cancel) = self.registry.current();
        *self.lock_active() = Some(ActiveLink {
            address: address.clone(),
            link: Arc::clone(&link),
            epoch,
            cancel,
        });
        self.status.publish(ConnectionStatus::connected(address.as_str()));
        info!(%epoch, "Connected to {}", address);

        self.spawn_state_observer(epoch, address, Arc::clone(&link));
        self.profile.start(epoch, link);
    }

    async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let has_link = self.lock_active().is_some();
        let already_disconnected = self
            .status
            .current()
            .is_none_or(|status| status.is_disconnected());

        if !has_link || already_disconnected {
            debug!("Already disconnected, cleaning up");
            self.teardown().await;
            return;
        }

        self.status.publish(ConnectionStatus::Disconnecting);
        self.teardown().await;
        self.status
            .publish(ConnectionStatus::disconnected("Manual disconnect", true));
        info!("Disconnected");
    }

    /// Cancel the scan and every registered task, then close the link.
    ///
    /// Idempotent. Must be called with the lifecycle lock held.
    #[tracing::instrument(level = "debug", skip_all)]
    async fn teardown(&self) {
        self.scanner.stop();
        let epoch = self.registry.cancel_all();
        self.streams.clear();

        let active = self.lock_active().take();
        if let Some(active) = active {
            debug!(address = %active.address, old_epoch = %active.epoch, %epoch, "Closing link");
            close_link(active.link.as_ref()).await;
        }
    }

    fn spawn_state_observer(&self, epoch: Epoch, address: String, link: Arc<dyn Link>) {
        let registry = Arc::clone(&self.registry);
        let status = Arc::clone(&self.status);

        self.registry
            .replace(epoch, TaskKind::StateObserver, move |_| async move {
                let mut states = match link.connection_states().await {
                    Ok(states) => states,
                    Err(e) => {
                        warn!("Cannot observe link state: {}", e);
                        return;
                    }
                };
                while let Some(state) = states.next().await {
                    let mapped = match state {
                        LinkState::Connecting => ConnectionStatus::Connecting,
                        LinkState::Connected => ConnectionStatus::connected(address.as_str()),
                        LinkState::Disconnecting => ConnectionStatus::Disconnecting,
                        LinkState::Disconnected => {
                            ConnectionStatus::disconnected("Disconnected", true)
                        }
                    };
                    let current = registry.emit_if_current(epoch, || {
                        if status.publish_if_changed(mapped.clone()) {
                            debug!(?state, "Link state changed");
                        }
                    });
                    if !current {
                        break;
                    }
                }
            });
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.scanner.stop();
        self.registry.cancel_all();
        let active = self.lock_active().take();
        if let Some(active) = active {
            // Best-effort close in the background.
            self.runtime.spawn(async move {
                close_link(active.link.as_ref()).await;
            });
        }
    }
}

/// Close a link, bounded by [`LINK_CLOSE_TIMEOUT`]. Failures are swallowed.
async fn close_link(link: &dyn Link) {
    match timeout(LINK_CLOSE_TIMEOUT, link.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Ignoring error while closing link: {}", e),
        Err(_) => debug!("Closing link timed out after {:?}", LINK_CLOSE_TIMEOUT),
    }
}
