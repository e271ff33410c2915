//! The CRC32 variant used by OGG pages.
//!
//! Polynomial `0x04c11db7`, not reflected, initial value `0`, no final XOR.

const POLYNOMIAL: u32 = 0x04c1_1db7;

static TABLE: [u32; 256] = build_table();

#[allow(clippy::as_conversions)]
const fn build_table() -> [u32; 256] {
    let mut table = [0_u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut r = (index as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ POLYNOMIAL
            } else {
                r << 1
            };
            bit += 1;
        }
        table[index] = r;
        index += 1;
    }
    table
}

/// Continues a running checksum over `data`.
///
/// Used to checksum a page whose header and body live in separate slices.
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &byte| {
        let index = crc.to_be_bytes()[0] ^ byte;
        (crc << 8) ^ TABLE[usize::from(index)]
    })
}

/// Calculates the checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_table() {
        assert_eq!(TABLE[0], 0);
        assert_eq!(TABLE[1], POLYNOMIAL);
        assert_eq!(TABLE[255], 0xb1f7_40b4);
    }

    #[test]
    fn test_known_value() {
        // Unreflected CRC-32/MPEG-2 without the initial inversion.
        assert_eq!(crc32(b"123456789"), 0x89a1_897f);
    }

    #[test]
    fn test_update_is_split_invariant() {
        let data = b"OggS but split in the middle of nowhere";
        let whole = crc32(data);
        for split in 0..data.len() {
            let (a, b) = data.split_at(split);
            assert_eq!(crc32_update(crc32(a), b), whole);
        }
    }
}
