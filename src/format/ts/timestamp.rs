use super::types::{PTS_HZ, TIMESTAMP_SIZE};
use crate::utils::{rb16, rb8};
use std::time::Duration;

/// Decodes a 33-bit PTS/DTS from its 5-byte PES header encoding.
///
/// Layout: `pppp xxx1 | xxxx xxxx xxxx xxx1 | xxxx xxxx xxxx xxx1`, where the
/// leading nibble is the `0010`/`0011`/`0001` marker and each group ends with a
/// marker bit. Marker bits are not validated. Returns `None` if fewer than five
/// bytes are given.
pub fn parse_timestamp(data: &[u8]) -> Option<u64> {
    if data.len() < TIMESTAMP_SIZE {
        return None;
    }
    let high = (rb8(data) as u64 & 0x0E) << 29;
    let mid = ((rb16(&data[1..]) >> 1) as u64) << 15;
    let low = (rb16(&data[3..]) >> 1) as u64;
    Some(high | mid | low)
}

/// Converts 90 kHz timestamp ticks to a duration.
pub fn pts_to_duration(pts: u64) -> Duration {
    let secs = pts / PTS_HZ;
    let nanos = (pts % PTS_HZ) * 1_000_000_000 / PTS_HZ;
    Duration::new(secs, nanos as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_one_second() {
        // marker 0010, pts = 90000
        let data = [0x21, 0x00, 0x05, 0xBF, 0x21];
        assert_eq!(parse_timestamp(&data), Some(90_000));
        assert_eq!(pts_to_duration(90_000), Duration::from_secs(1));
    }

    #[test]
    fn test_bit_32_and_bit_0() {
        let data = [0x29, 0x00, 0x01, 0x00, 0x03];
        assert_eq!(parse_timestamp(&data), Some(0x1_0000_0001));
    }

    #[test]
    fn test_all_bits_set() {
        let data = [0x2F, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(parse_timestamp(&data), Some(0x1_FFFF_FFFF));
    }

    #[test]
    fn test_marker_nibble_ignored() {
        // same value with the PTS+DTS (0011) and DTS (0001) markers
        assert_eq!(parse_timestamp(&[0x31, 0x00, 0x05, 0xBF, 0x21]), Some(90_000));
        assert_eq!(parse_timestamp(&[0x11, 0x00, 0x05, 0xBF, 0x21]), Some(90_000));
    }

    #[test]
    fn test_duration_of_large_tick_counts() {
        assert_eq!(pts_to_duration(0x1_FFFF_FFFF), Duration::new(95443, 717_677_777));
        assert_eq!(pts_to_duration(u64::MAX / PTS_HZ * PTS_HZ).as_secs(), u64::MAX / PTS_HZ);
        assert_eq!(pts_to_duration(45_000), Duration::from_millis(500));
    }

    #[test]
    fn test_short_input() {
        assert_eq!(parse_timestamp(&[0x21, 0x00, 0x05, 0xBF]), None);
    }
}
