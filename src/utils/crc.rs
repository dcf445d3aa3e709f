/// CRC32 implementation for MPEG-2 TS PSI sections
/// Based on ITU-T H.222.0 / ISO/IEC 13818-1
/// Polynomial: x32 + x26 + x23 + x22 + x16 + x12 + x11 + x10 + x8 + x7 + x5 + x4 + x2 + x + 1
/// Initial value: 0xFFFFFFFF, no reflection, no final xor

const CRC32_MPEG2: u32 = 0x04C11DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if (crc & 0x80000000) != 0 {
                (crc << 1) ^ CRC32_MPEG2
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Calculates the MPEG-2 CRC32 of `data`.
///
/// # Examples
///
/// ```
/// use tsdemux::utils::crc32_mpeg2;
///
/// let checksum = crc32_mpeg2(&[0x01, 0x02, 0x03]);
/// assert_ne!(checksum, 0);
/// ```
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFF;
    for &byte in data {
        let index = ((crc >> 24) ^ (byte as u32)) & 0xFF;
        crc = (crc << 8) ^ TABLE[index as usize];
    }
    crc
}

/// Checks a complete PSI section whose last four bytes are its CRC_32.
///
/// Running the CRC over the whole section, checksum included, yields zero
/// when the section is intact.
pub fn verify_section(section: &[u8]) -> bool {
    section.len() >= 4 && crc32_mpeg2(section) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // CRC-32/MPEG-2 check value
        assert_eq!(crc32_mpeg2(b"123456789"), 0x0376E6E7);
    }

    #[test]
    fn test_verify_section() {
        // PAT: one program (1 -> 0x1000)
        let mut section = vec![
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00,
        ];
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        assert!(verify_section(&section));

        section[9] ^= 0x01;
        assert!(!verify_section(&section));
        assert!(!verify_section(&[0x00, 0x01]));
    }
}
