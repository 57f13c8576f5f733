//! Scan command implementation.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::info;

use blecore::{BleClient, ScanResult};

use crate::cli::OutputFormat;
use crate::format::{format_scan_json, format_scan_text};

/// Scan for `duration` and print the final snapshot.
pub async fn cmd_scan(
    client: &BleClient,
    duration: Duration,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    let devices = collect_scan(client, duration).await?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices)?,
        OutputFormat::Text => format_scan_text(&devices),
    };
    out.write_all(content.as_bytes())?;
    out.flush()?;
    Ok(())
}

async fn collect_scan(client: &BleClient, duration: Duration) -> Result<Vec<ScanResult>> {
    let deadline = Instant::now() + duration;
    let mut scan = client.scan();
    let mut devices = Vec::new();

    while let Ok(Some(snapshot)) = timeout_at(deadline, scan.next()).await {
        devices = snapshot.context("Failed to scan for devices")?;
        info!(devices = devices.len(), "Scan updated");
    }
    client.stop_scan();
    Ok(devices)
}
