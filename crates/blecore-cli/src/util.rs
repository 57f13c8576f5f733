//! Utility functions for CLI operations.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tokio::runtime::Handle;
use uuid::Uuid;

use blecore::uuids::standard_uuid;
use blecore::{BleClient, BleConfig, BtleplugRadio};

/// Get device identifier, with helpful error message.
pub fn require_device(device: Option<String>) -> Result<String> {
    device.ok_or_else(|| {
        anyhow!(
            "No device specified. Use --device <ADDRESS>, set BLECORE_DEVICE, or run \
             'blecore config set device <ADDRESS>'.\n\
             Run 'blecore scan' to find nearby devices."
        )
    })
}

/// Parse a UUID given either as a 16-bit short code (`180f`, `0x2A19`) or in
/// full hyphenated form.
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    let trimmed = value.trim();
    let short = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if short.len() == 4 {
        let code = u16::from_str_radix(short, 16)
            .with_context(|| format!("Invalid 16-bit UUID: {}", value))?;
        return Ok(standard_uuid(code));
    }
    if trimmed.len() < 32 {
        bail!("Invalid UUID '{}': expected 4 hex digits or a full UUID", value);
    }
    Uuid::parse_str(trimmed).with_context(|| format!("Invalid UUID: {}", value))
}

/// Create a client on the first Bluetooth adapter.
pub async fn hardware_client(config: BleConfig) -> Result<BleClient> {
    let radio = BtleplugRadio::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    BleClient::new(Arc::new(radio), config, Handle::current()).context("Invalid configuration")
}

/// Open the output sink: the file at `output`, or stdout.
pub fn open_output(output: Option<&PathBuf>) -> Result<Box<dyn Write + Send>> {
    Ok(match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout()),
    })
}

/// Write one line and flush, so streaming output shows up immediately.
pub fn write_line(out: &mut dyn Write, line: &str) -> Result<()> {
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blecore::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};

    #[test]
    fn test_require_device_with_some() {
        let result = require_device(Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(result.unwrap(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_require_device_with_none() {
        let err = require_device(None).unwrap_err();
        assert!(err.to_string().contains("No device specified"));
    }

    #[test]
    fn test_parse_short_uuid() {
        assert_eq!(parse_uuid("180f").unwrap(), BATTERY_SERVICE);
        assert_eq!(parse_uuid("0x2A19").unwrap(), BATTERY_LEVEL);
    }

    #[test]
    fn test_parse_full_uuid() {
        assert_eq!(
            parse_uuid("00002a19-0000-1000-8000-00805f9b34fb").unwrap(),
            BATTERY_LEVEL
        );
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(parse_uuid("zzzz").is_err());
        assert!(parse_uuid("18").is_err());
        assert!(parse_uuid("").is_err());
    }

    #[test]
    fn test_write_line_to_buffer() {
        let mut buf = Vec::new();
        write_line(&mut buf, "hello").unwrap();
        assert_eq!(buf, b"hello\n");
    }
}
