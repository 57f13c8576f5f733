//! Connect command implementation.
//!
//! Connects to one device and prints every status change and standard
//! profile reading until stopped.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Result, bail};
use futures::{FutureExt, StreamExt};
use tracing::debug;

use blecore::{BleClient, ConnectionStatus};

use crate::cli::OutputFormat;
use crate::format::{WatchEvent, format_event};
use crate::util::write_line;

#[derive(Debug, Clone)]
pub struct ConnectArgs {
    pub address: String,
    pub timeout: Duration,
    pub format: OutputFormat,
}

/// Watch a device until `stop` resolves.
///
/// Returns an error if the connection fails or the device drops the link.
/// When `stop` resolves the client disconnects and the final status lines
/// are printed.
pub async fn cmd_connect(
    client: &BleClient,
    args: &ConnectArgs,
    out: &mut dyn Write,
    stop: impl Future<Output = ()>,
) -> Result<()> {
    let mut status = client.connection_status();
    let mut battery = client.battery();
    let mut rssi = client.rssi();
    let mut firmware = client.firmware_revision();
    let mut manufacturer = client.device_manufacturer();

    let emit = |out: &mut dyn Write, event: WatchEvent| -> Result<()> {
        write_line(out, &format_event(&event, args.format)?)
    };

    let connecting = client.connect_with_timeout(&args.address, args.timeout);
    tokio::pin!(connecting);
    tokio::pin!(stop);
    let mut attempt_done = false;
    let mut seen_connecting = false;

    loop {
        tokio::select! {
            _ = &mut connecting, if !attempt_done => {
                attempt_done = true;
                debug!("Connection attempt finished");
            }
            Some(s) = status.next() => {
                // Ignore a stale status replayed from before this attempt.
                if !seen_connecting && s != ConnectionStatus::Connecting {
                    continue;
                }
                seen_connecting = true;
                emit(out, WatchEvent::Status(s.clone()))?;
                if let ConnectionStatus::Disconnected { reason, .. } = s {
                    bail!("{}", reason.unwrap_or_else(|| "Disconnected".to_string()));
                }
            }
            Some(level) = battery.next() => emit(out, WatchEvent::Battery(level))?,
            Some(value) = rssi.next() => emit(out, WatchEvent::Rssi(value))?,
            Some(version) = firmware.next() => emit(out, WatchEvent::Firmware(version))?,
            Some(name) = manufacturer.next() => emit(out, WatchEvent::Manufacturer(name))?,
            _ = &mut stop => break,
        }
    }

    // The attempt may still be in flight; finishing it first keeps the
    // disconnect from racing a half-open link.
    if !attempt_done {
        connecting.await;
    }
    client.disconnect().await?;
    while let Some(Some(s)) = status.next().now_or_never() {
        if seen_connecting {
            emit(out, WatchEvent::Status(s))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use blecore::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
    use blecore::{BleConfig, MockLink, MockRadio, Radio};
    use tokio::runtime::Handle;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn setup() -> (BleClient, Arc<MockRadio>, Arc<MockLink>) {
        let link = Arc::new(
            MockLink::builder(ADDRESS)
                .service(BATTERY_SERVICE, [BATTERY_LEVEL])
                .rssi(-55)
                .build(),
        );
        let radio = Arc::new(MockRadio::new().with_link(Arc::clone(&link)));
        let client = BleClient::new(
            Arc::clone(&radio) as Arc<dyn Radio>,
            BleConfig::default().logging_enabled(false).rssi_poll_ms(1000),
            Handle::current(),
        )
        .unwrap();
        (client, radio, link)
    }

    fn args(format: OutputFormat) -> ConnectArgs {
        ConnectArgs {
            address: ADDRESS.to_string(),
            timeout: Duration::from_secs(5),
            format,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_prints_events_until_stopped() {
        let (client, _radio, link) = setup();

        let notifier = {
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                link.wait_for_subscribers(BATTERY_LEVEL).await;
                link.notify(BATTERY_LEVEL, [64u8]);
            })
        };

        let mut out = Vec::new();
        cmd_connect(
            &client,
            &args(OutputFormat::Text),
            &mut out,
            tokio::time::sleep(Duration::from_secs(3)),
        )
        .await
        .unwrap();
        notifier.await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"Status: Connecting"));
        assert!(lines.contains(&"Status: Connected (AA:BB:CC:DD:EE:FF)"));
        assert!(lines.contains(&"Battery: 64%"));
        assert!(lines.contains(&"RSSI: -55 dBm"));
        assert_eq!(lines.last(), Some(&"Status: Disconnected (Manual disconnect)"));
        assert!(link.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_error() {
        let (client, radio, _link) = setup();
        radio.set_connect_should_fail(true);

        let mut out = Vec::new();
        let err = cmd_connect(
            &client,
            &args(OutputFormat::Json),
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("Connection failed"));

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["value"]["status"], "connecting");
        assert_eq!(lines[1]["value"]["status"], "disconnected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_disconnect_is_error() {
        let (client, _radio, link) = setup();

        let dropper = {
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                link.wait_for_subscribers(BATTERY_LEVEL).await;
                link.set_state(blecore::LinkState::Disconnected);
            })
        };

        let mut out = Vec::new();
        let err = cmd_connect(
            &client,
            &args(OutputFormat::Text),
            &mut out,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        dropper.await.unwrap();
        assert_eq!(err.to_string(), "Disconnected");
    }
}
