//! Notify command implementation.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Result, bail};
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use blecore::{BleClient, ConnectionStatus};

use crate::cli::OutputFormat;
use crate::format::{Notification, format_notification};
use crate::util::write_line;

#[derive(Debug, Clone)]
pub struct NotifyArgs {
    pub address: String,
    pub timeout: Duration,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub count: Option<usize>,
    pub format: OutputFormat,
}

/// Connect, then hex-dump notifications from one characteristic until
/// `count` have arrived, `stop` resolves, or the stream ends.
///
/// Returns the number of notifications printed.
pub async fn cmd_notify(
    client: &BleClient,
    args: &NotifyArgs,
    out: &mut dyn Write,
    stop: impl Future<Output = ()>,
) -> Result<usize> {
    client
        .connect_with_timeout(&args.address, args.timeout)
        .await;
    match client.current_status() {
        Some(ConnectionStatus::Connected { .. }) => {}
        Some(ConnectionStatus::Disconnected {
            reason: Some(reason),
            ..
        }) => bail!("{}", reason),
        other => bail!("Not connected ({:?})", other),
    }
    info!(service = %args.service, characteristic = %args.characteristic, "Subscribing");

    let mut notifications = client.observe_characteristic(args.service, args.characteristic);
    tokio::pin!(stop);
    let mut received = 0;

    loop {
        if args.count.is_some_and(|count| received >= count) {
            break;
        }
        let value = tokio::select! {
            value = notifications.next() => value,
            _ = &mut stop => break,
        };
        let Some(value) = value else {
            if received == 0 && client.current_status().is_some_and(|s| s.is_connected()) {
                client.disconnect().await?;
                bail!(
                    "Characteristic {} not available on service {}",
                    args.characteristic,
                    args.service
                );
            }
            warn!("Notification stream ended");
            break;
        };
        received += 1;
        let notification = Notification {
            index: received,
            service: args.service,
            characteristic: args.characteristic,
            len: value.len(),
            value: &value,
        };
        write_line(out, &format_notification(&notification, args.format)?)?;
    }

    client.disconnect().await?;
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use blecore::uuids::{BATTERY_LEVEL, BATTERY_SERVICE, FIRMWARE_REVISION};
    use blecore::{BleConfig, MockLink, MockRadio, Radio};
    use tokio::runtime::Handle;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn setup() -> (BleClient, Arc<MockRadio>, Arc<MockLink>) {
        let link = Arc::new(
            MockLink::builder(ADDRESS)
                .service(BATTERY_SERVICE, [BATTERY_LEVEL])
                .build(),
        );
        let radio = Arc::new(MockRadio::new().with_link(Arc::clone(&link)));
        let client = BleClient::new(
            Arc::clone(&radio) as Arc<dyn Radio>,
            BleConfig::default().logging_enabled(false).rssi_poll_ms(0),
            Handle::current(),
        )
        .unwrap();
        (client, radio, link)
    }

    fn args(characteristic: Uuid, count: Option<usize>) -> NotifyArgs {
        NotifyArgs {
            address: ADDRESS.to_string(),
            timeout: Duration::from_secs(5),
            service: BATTERY_SERVICE,
            characteristic,
            count,
            format: OutputFormat::Text,
        }
    }

    #[tokio::test]
    async fn test_notify_stops_after_count() {
        let (client, _radio, link) = setup();

        let feeder = {
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                // The battery profile task subscribes too.
                while link.subscriber_count(BATTERY_LEVEL) < 2 {
                    tokio::task::yield_now().await;
                }
                link.notify(BATTERY_LEVEL, [0x10u8]);
                link.notify(BATTERY_LEVEL, [0x20u8, 0x21]);
                link.notify(BATTERY_LEVEL, [0x30u8]);
            })
        };

        let mut out = Vec::new();
        let received = cmd_notify(
            &client,
            &args(BATTERY_LEVEL, Some(2)),
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap();
        feeder.await.unwrap();

        assert_eq!(received, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[1] 10 (1 bytes)\n[2] 20 21 (2 bytes)\n"
        );
        assert!(link.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_missing_characteristic() {
        let (client, _radio, link) = setup();

        let mut out = Vec::new();
        let err = cmd_notify(
            &client,
            &args(FIRMWARE_REVISION, None),
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not available"));
        assert!(out.is_empty());
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_notify_connect_failure() {
        let (client, radio, _link) = setup();
        radio.set_connect_should_fail(true);

        let mut out = Vec::new();
        let err = cmd_notify(
            &client,
            &args(BATTERY_LEVEL, None),
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("Connection failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_until_stopped() {
        let (client, _radio, _link) = setup();

        let mut out = Vec::new();
        let received = cmd_notify(
            &client,
            &args(BATTERY_LEVEL, None),
            &mut out,
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_eq!(received, 0);
    }
}
