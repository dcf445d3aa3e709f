//! Big-endian field readers for fixed-layout binary headers.
//!
//! All readers take a byte window starting at the field and read from its
//! front. Callers are responsible for checking the window length first; the
//! readers index directly and panic on a short slice.

/// Reads an unsigned 8-bit value.
#[inline]
pub fn rb8(data: &[u8]) -> u8 {
    data[0]
}

/// Reads an unsigned big-endian 16-bit value.
#[inline]
pub fn rb16(data: &[u8]) -> u16 {
    ((data[0] as u16) << 8) | data[1] as u16
}

/// Reads a signed 8-bit value.
#[inline]
pub fn ri8(data: &[u8]) -> i8 {
    data[0] as i8
}

/// Reads a signed big-endian 16-bit value.
#[inline]
pub fn ri16(data: &[u8]) -> i16 {
    rb16(data) as i16
}

/// Reads a 13-bit packet identifier stored in the low bits of a 16-bit field.
#[inline]
pub fn read_pid(data: &[u8]) -> u16 {
    rb16(data) & 0x1FFF
}

/// Reads a 12-bit length stored in the low bits of a 16-bit field.
#[inline]
pub fn read_length12(data: &[u8]) -> usize {
    (rb16(data) & 0x0FFF) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_unsigned_readers() {
        let data = [0xAB, 0xCD, 0xEF];
        assert_eq!(rb8(&data), 0xAB);
        assert_eq!(rb16(&data), 0xABCD);
        assert_eq!(rb16(&data[1..]), 0xCDEF);
    }

    #[test]
    fn test_signed_readers() {
        assert_eq!(ri8(&[0xFF]), -1);
        assert_eq!(ri8(&[0x7F]), 127);
        assert_eq!(ri16(&[0x80, 0x00]), i16::MIN);
        assert_eq!(ri16(&[0x00, 0x01]), 1);
        assert_eq!(ri16(&[0xFF, 0xFE]), -2);
    }

    #[test]
    fn test_masked_fields() {
        // reserved bits set, as they are on the wire
        assert_eq!(read_pid(&[0xE1, 0x00]), 0x0100);
        assert_eq!(read_pid(&[0xFF, 0xFF]), 0x1FFF);
        assert_eq!(read_length12(&[0xF0, 0x11]), 0x011);
        assert_eq!(read_length12(&[0xB0, 0x0D]), 13);
    }

    #[quickcheck]
    fn prop_rb16_matches_from_be_bytes(a: u8, b: u8) -> bool {
        rb16(&[a, b]) == u16::from_be_bytes([a, b]) && ri16(&[a, b]) == i16::from_be_bytes([a, b])
    }

    #[quickcheck]
    fn prop_pid_fits_13_bits(a: u8, b: u8) -> bool {
        read_pid(&[a, b]) <= 0x1FFF && read_pid(&[a, b]) & 0xFF == b as u16
    }
}
