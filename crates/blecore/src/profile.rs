//! Standard profile readings.
//!
//! After every successful connection the [`ProfileReader`] starts three
//! background tasks in the connection's epoch:
//!
//! - a Battery Level (0x180F / 0x2A19) notification subscription,
//! - a one-shot read of firmware revision (0x2A26) and manufacturer name
//!   (0x2A29) from Device Information (0x180A),
//! - RSSI polling, if enabled.
//!
//! Every failure here is logged and dropped. None of it affects the
//! connection status. Values are published through
//! [`TaskRegistry::emit_if_current`], so nothing from a torn-down connection
//! reaches the streams.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use blecore_types::uuids::{
    BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE, FIRMWARE_REVISION, MANUFACTURER_NAME,
};
use blecore_types::{decode_battery_level, decode_string};

use crate::latest::Latest;
use crate::observe::{CharacteristicObserver, wait_for_service};
use crate::radio::Link;
use crate::registry::{Epoch, TaskKind, TaskRegistry};

/// Replay-of-latest streams fed by the profile reader.
#[derive(Debug, Default)]
pub struct ProfileStreams {
    pub rssi: Latest<i16>,
    pub battery: Latest<u8>,
    pub firmware_revision: Latest<String>,
    pub manufacturer: Latest<String>,
}

impl ProfileStreams {
    /// Forget every stored reading so a new connection starts clean.
    pub fn clear(&self) {
        self.rssi.clear();
        self.battery.clear();
        self.firmware_revision.clear();
        self.manufacturer.clear();
    }
}

/// Spawns the standard profile tasks for a connection.
#[derive(Debug, Clone)]
pub struct ProfileReader {
    registry: Arc<TaskRegistry>,
    streams: Arc<ProfileStreams>,
    observer: CharacteristicObserver,
    rssi_interval: Option<Duration>,
    logging_enabled: bool,
}

impl ProfileReader {
    pub fn new(
        registry: Arc<TaskRegistry>,
        streams: Arc<ProfileStreams>,
        observer: CharacteristicObserver,
        rssi_interval: Option<Duration>,
        logging_enabled: bool,
    ) -> Self {
        Self {
            registry,
            streams,
            observer,
            rssi_interval,
            logging_enabled,
        }
    }

    /// Start every profile task for `link` in `epoch`.
    pub fn start(&self, epoch: Epoch, link: Arc<dyn Link>) {
        self.spawn_battery(epoch, Arc::clone(&link));
        self.spawn_device_info(epoch, Arc::clone(&link));
        self.spawn_rssi_poll(epoch, link);
    }

    fn spawn_battery(&self, epoch: Epoch, link: Arc<dyn Link>) -> bool {
        let registry = Arc::clone(&self.registry);
        let streams = Arc::clone(&self.streams);
        let observer = self.observer.clone();
        let logging_enabled = self.logging_enabled;

        self.registry
            .spawn(epoch, TaskKind::BatterySubscription, move |token| async move {
                let mut notifications =
                    observer.observe(Some(link), BATTERY_SERVICE, BATTERY_LEVEL, token);
                while let Some(raw) = notifications.next().await {
                    let Some(level) = decode_battery_level(&raw) else {
                        continue;
                    };
                    if logging_enabled {
                        debug!(level, "Battery level");
                    }
                    if !registry.emit_if_current(epoch, || streams.battery.publish(level)) {
                        break;
                    }
                }
            })
    }

    fn spawn_device_info(&self, epoch: Epoch, link: Arc<dyn Link>) -> bool {
        let registry = Arc::clone(&self.registry);
        let streams = Arc::clone(&self.streams);
        let wait = self.observer.discovery_timeout();
        let logging_enabled = self.logging_enabled;

        self.registry
            .spawn(epoch, TaskKind::DeviceInfo, move |_| async move {
                let service = match wait_for_service(link.as_ref(), DEVICE_INFO_SERVICE, wait).await {
                    Ok(service) => service,
                    Err(e) => {
                        if logging_enabled {
                            warn!("Device Information Service not available: {}", e);
                        }
                        return;
                    }
                };

                let fields = [
                    (FIRMWARE_REVISION, &streams.firmware_revision),
                    (MANUFACTURER_NAME, &streams.manufacturer),
                ];
                for (uuid, sink) in fields {
                    let Some(characteristic) = service.find_characteristic(uuid) else {
                        debug!(%uuid, "Device information characteristic not present");
                        continue;
                    };
                    match link.read(&characteristic).await {
                        Ok(raw) => {
                            let text = decode_string(&raw);
                            registry.emit_if_current(epoch, || sink.publish(text));
                        }
                        Err(e) => {
                            if logging_enabled {
                                warn!(%uuid, "Failed to read device info: {}", e);
                            }
                        }
                    }
                }
            })
    }

    fn spawn_rssi_poll(&self, epoch: Epoch, link: Arc<dyn Link>) -> bool {
        let Some(interval) = self.rssi_interval else {
            return false;
        };
        let registry = Arc::clone(&self.registry);
        let streams = Arc::clone(&self.streams);
        let logging_enabled = self.logging_enabled;

        self.registry.spawn(epoch, TaskKind::RssiPoll, move |_| async move {
            loop {
                match link.read_rssi().await {
                    Ok(rssi) => {
                        if logging_enabled {
                            debug!(rssi, "RSSI");
                        }
                        if !registry.emit_if_current(epoch, || streams.rssi.publish(rssi)) {
                            break;
                        }
                    }
                    Err(e) => {
                        if logging_enabled {
                            warn!("Failed to read RSSI: {}", e);
                        }
                    }
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}
