//! Characteristic observation.
//!
//! [`CharacteristicObserver::observe`] turns a `(service, characteristic)`
//! pair on a link into a stream of raw notification payloads. It waits for
//! the service to show up in the link's discovered services for at most
//! [`SERVICE_DISCOVERY_TIMEOUT`]. If the service or characteristic never
//! appears the stream ends without emitting and a warning is logged.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SERVICE_DISCOVERY_TIMEOUT;
use crate::error::{Error, Result};
use crate::radio::{GattCharacteristic, GattService, Link};

/// Wait until `service` is among the link's discovered services.
///
/// Returns [`Error::Timeout`] if it does not appear within `wait`, and
/// [`Error::LinkClosed`] if the link stops publishing services.
pub async fn wait_for_service(link: &dyn Link, service: Uuid, wait: Duration) -> Result<GattService> {
    let mut services = link.services();
    let found = timeout(wait, services.wait_for(|list| list.iter().any(|s| s.uuid == service)))
        .await
        .map_err(|_| Error::timeout("service discovery", wait))?
        .map_err(|_| Error::LinkClosed)?
        .iter()
        .find(|s| s.uuid == service)
        .cloned();
    found.ok_or(Error::ServiceNotFound { uuid: service })
}

/// Wait for `service`, then look up `characteristic` in it.
pub async fn resolve_characteristic(
    link: &dyn Link,
    service: Uuid,
    characteristic: Uuid,
    wait: Duration,
) -> Result<GattCharacteristic> {
    let found = wait_for_service(link, service, wait).await?;
    found
        .find_characteristic(characteristic)
        .ok_or(Error::CharacteristicNotFound {
            uuid: characteristic,
            service,
        })
}

/// Builds notification streams for characteristics on a link.
#[derive(Debug, Clone)]
pub struct CharacteristicObserver {
    discovery_timeout: Duration,
    logging_enabled: bool,
}

impl Default for CharacteristicObserver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CharacteristicObserver {
    /// Create an observer using the standard discovery timeout.
    pub fn new(logging_enabled: bool) -> Self {
        Self {
            discovery_timeout: SERVICE_DISCOVERY_TIMEOUT,
            logging_enabled,
        }
    }

    /// The discovery timeout in use.
    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    /// Observe notifications on `characteristic` of `service`.
    ///
    /// The stream is lazy and ends when `cancel` fires, when the link closes,
    /// or immediately (empty) if there is no link or the characteristic
    /// cannot be resolved. Dropping the stream unsubscribes.
    pub fn observe(
        &self,
        link: Option<Arc<dyn Link>>,
        service: Uuid,
        characteristic: Uuid,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Bytes> {
        let Some(link) = link else {
            debug!(%service, %characteristic, "No active link, characteristic stream is empty");
            return stream::empty().boxed();
        };
        let wait = self.discovery_timeout;
        let logging_enabled = self.logging_enabled;

        stream::once(async move {
            let resolved = resolve_characteristic(link.as_ref(), service, characteristic, wait).await;
            let target = match resolved {
                Ok(target) => target,
                Err(e) => {
                    if logging_enabled {
                        warn!(%service, %characteristic, "Cannot observe characteristic: {}", e);
                    }
                    return None;
                }
            };
            match link.subscribe(&target).await {
                Ok(notifications) => Some(notifications),
                Err(e) => {
                    warn!(%characteristic, "Failed to subscribe: {}", e);
                    None
                }
            }
        })
        .filter_map(futures::future::ready)
        .flatten()
        .take_until(cancel.cancelled_owned())
        .boxed()
    }
}
