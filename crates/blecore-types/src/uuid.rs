//! Bluetooth SIG assigned UUIDs used by the standard profile reader.
//!
//! All standard 16-bit identifiers live inside the Bluetooth base UUID
//! `0000xxxx-0000-1000-8000-00805f9b34fb`; [`standard_uuid`] expands a short
//! code into its full 128-bit form.

use uuid::Uuid;

const BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// The Bluetooth base UUID with a zeroed 16-bit slot.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(BASE);

/// Expand a 16-bit SIG-assigned code into a full UUID.
///
/// # Examples
///
/// ```
/// use blecore_types::uuid::{standard_uuid, BATTERY_SERVICE};
///
/// assert_eq!(standard_uuid(0x180F), BATTERY_SERVICE);
/// ```
#[must_use]
pub const fn standard_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BASE | ((short as u128) << 96))
}

/// Return the 16-bit short code if `uuid` lives inside the Bluetooth base UUID.
#[must_use]
pub fn short_code(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let base_mask = !(0xFFFF_FFFF_u128 << 96);
    if value & base_mask != BASE || value >> 112 != 0 {
        return None;
    }
    Some((value >> 96) as u16)
}

// --- Standard BLE Service UUIDs ---

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = standard_uuid(0x180A);

/// Battery service.
pub const BATTERY_SERVICE: Uuid = standard_uuid(0x180F);

// --- Device Information Characteristic UUIDs ---

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = standard_uuid(0x2A26);

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = standard_uuid(0x2A29);

// --- Battery Characteristic UUIDs ---

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = standard_uuid(0x2A19);

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::uuid;

    #[test]
    fn test_battery_uuids() {
        assert_eq!(
            BATTERY_SERVICE.to_string(),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_device_info_uuids() {
        assert_eq!(
            DEVICE_INFO_SERVICE.to_string(),
            "0000180a-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            FIRMWARE_REVISION.to_string(),
            "00002a26-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            MANUFACTURER_NAME.to_string(),
            "00002a29-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_short_code_round_trip() {
        assert_eq!(short_code(&BATTERY_LEVEL), Some(0x2A19));
        assert_eq!(short_code(&standard_uuid(0xFFFF)), Some(0xFFFF));
    }

    #[test]
    fn test_short_code_rejects_vendor_uuids() {
        let vendor = uuid!("f0cd1400-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(short_code(&vendor), None);

        // 32-bit SIG codes are not short codes.
        let wide = uuid!("12345678-0000-1000-8000-00805f9b34fb");
        assert_eq!(short_code(&wide), None);
    }
}
