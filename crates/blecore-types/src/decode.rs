//! Pure decoders for standard characteristic payloads.

/// Decode a Battery Level (0x2A19) payload.
///
/// The first byte is read as unsigned and clamped to `0..=100`.
/// Returns `None` for an empty payload.
///
/// # Examples
///
/// ```
/// use blecore_types::decode_battery_level;
///
/// assert_eq!(decode_battery_level(&[0x00]), Some(0));
/// assert_eq!(decode_battery_level(&[0xC8]), Some(100));
/// assert_eq!(decode_battery_level(&[]), None);
/// ```
#[must_use]
pub fn decode_battery_level(value: &[u8]) -> Option<u8> {
    value.first().map(|level| (*level).min(100))
}

/// Decode a UTF-8 string characteristic such as firmware revision or
/// manufacturer name.
///
/// Invalid sequences are replaced rather than rejected, and trailing NUL
/// padding is stripped.
#[must_use]
pub fn decode_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_battery_zero() {
        assert_eq!(decode_battery_level(&[0]), Some(0));
    }

    #[test]
    fn test_battery_clamped() {
        assert_eq!(decode_battery_level(&[200]), Some(100));
        assert_eq!(decode_battery_level(&[0xFF]), Some(100));
    }

    #[test]
    fn test_battery_ignores_trailing_bytes() {
        assert_eq!(decode_battery_level(&[57, 0xFF, 0x01]), Some(57));
    }

    #[test]
    fn test_battery_empty() {
        assert_eq!(decode_battery_level(&[]), None);
    }

    #[test]
    fn test_string_plain() {
        assert_eq!(decode_string(b"1.4.2"), "1.4.2");
    }

    #[test]
    fn test_string_strips_nul_padding() {
        assert_eq!(decode_string(b"Acme\0\0\0"), "Acme");
    }

    #[test]
    fn test_string_lossy() {
        assert_eq!(decode_string(&[b'v', 0xFF, b'1']), "v\u{FFFD}1");
    }

    proptest! {
        #[test]
        fn battery_level_is_always_a_percentage(bytes in proptest::collection::vec(any::<u8>(), 1..8)) {
            let level = decode_battery_level(&bytes).unwrap();
            prop_assert!(level <= 100);
            prop_assert_eq!(level, bytes[0].min(100));
        }
    }
}
