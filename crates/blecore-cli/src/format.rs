//! Output formatting for scan results, watch events and notifications.

use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

use blecore::{ConnectionStatus, ScanResult};

use crate::cli::OutputFormat;

/// One line of `connect` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum WatchEvent {
    Status(ConnectionStatus),
    Battery(u8),
    Rssi(i16),
    Firmware(String),
    Manufacturer(String),
}

/// One line of `notify` output.
#[derive(Debug, Clone, Serialize)]
pub struct Notification<'a> {
    pub index: usize,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub len: usize,
    #[serde(serialize_with = "as_hex")]
    pub value: &'a [u8],
}

fn as_hex<S: serde::Serializer>(value: &&[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(value))
}

/// Space-separated upper-case hex, e.g. `57 01 FF`.
pub fn hex_bytes(value: &[u8]) -> String {
    value
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_scan_text(devices: &[ScanResult]) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }

    let mut out = format!("Found {} device(s):\n\n", devices.len());
    out.push_str(&format!("  {:<24} {:<38} {:>8}\n", "NAME", "ADDRESS", "RSSI"));
    for device in devices {
        let name = device.device.name.as_deref().unwrap_or("Unknown");
        let rssi = device
            .data
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        out.push_str(&format!(
            "  {:<24} {:<38} {:>8}\n",
            name,
            device.address(),
            rssi
        ));
    }
    out
}

pub fn format_scan_json(devices: &[ScanResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(devices)? + "\n")
}

pub fn format_event(event: &WatchEvent, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(event)?,
        OutputFormat::Text => match event {
            WatchEvent::Status(status) => format!("Status: {}", status),
            WatchEvent::Battery(level) => format!("Battery: {}%", level),
            WatchEvent::Rssi(rssi) => format!("RSSI: {} dBm", rssi),
            WatchEvent::Firmware(version) => format!("Firmware: {}", version),
            WatchEvent::Manufacturer(name) => format!("Manufacturer: {}", name),
        },
    })
}

pub fn format_notification(notification: &Notification<'_>, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(notification)?,
        OutputFormat::Text => format!(
            "[{}] {} ({} bytes)",
            notification.index,
            hex_bytes(notification.value),
            notification.len
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blecore::{AdvertisementData, DeviceIdentity};
    use blecore::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x57, 0x01, 0xFF]), "57 01 FF");
        assert_eq!(hex_bytes(&[]), "");
    }

    #[test]
    fn test_scan_text_lists_devices() {
        let devices = vec![
            ScanResult::new(
                DeviceIdentity::with_name("AA:BB:CC:DD:EE:FF", "Thermo"),
                AdvertisementData {
                    connectable: true,
                    rssi: Some(-61),
                },
            ),
            ScanResult::new(
                DeviceIdentity::new("11:22:33:44:55:66"),
                AdvertisementData {
                    connectable: true,
                    rssi: None,
                },
            ),
        ];
        let text = format_scan_text(&devices);
        assert!(text.starts_with("Found 2 device(s)"));
        assert!(text.contains("Thermo"));
        assert!(text.contains("-61 dBm"));
        assert!(text.contains("Unknown"));
        assert!(text.contains("N/A"));
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[]), "No devices found.\n");
    }

    #[test]
    fn test_event_json_shape() {
        let line = format_event(&WatchEvent::Battery(87), OutputFormat::Json).unwrap();
        assert_eq!(line, r#"{"event":"battery","value":87}"#);

        let line = format_event(
            &WatchEvent::Status(ConnectionStatus::Connecting),
            OutputFormat::Json,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "status");
        assert_eq!(value["value"]["status"], "connecting");
    }

    #[test]
    fn test_event_text() {
        assert_eq!(
            format_event(&WatchEvent::Rssi(-70), OutputFormat::Text).unwrap(),
            "RSSI: -70 dBm"
        );
    }

    #[test]
    fn test_notification_formats() {
        let notification = Notification {
            index: 1,
            service: BATTERY_SERVICE,
            characteristic: BATTERY_LEVEL,
            len: 2,
            value: &[0x0A, 0xFF],
        };
        assert_eq!(
            format_notification(&notification, OutputFormat::Text).unwrap(),
            "[1] 0A FF (2 bytes)"
        );
        let json = format_notification(&notification, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["value"], "0aff");
        assert_eq!(value["len"], 2);
        assert_eq!(
            value["characteristic"],
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }
}
