//! Checksums used to key the texture cache.
//!
//! `texture_crc` is not a real CRC. It is a cheap 32-bit accumulator over pairs of TMEM
//! words, weighted by the column index and folded once per row by the row index. It must
//! stay bit exact, cache keys depend on it.

use super::TMEM_SIZE;

/// Hash `height` rows of `width` 64-bit words of TMEM starting at byte `start`, with rows
/// `stride` bytes apart. TMEM addresses wrap at 4KiB.
pub fn texture_crc(tmem: &[u8; TMEM_SIZE], start: usize, width: u32, height: u32, stride: usize) -> u32 {
    let word = |offset: usize| -> u32 {
        let o = offset & (TMEM_SIZE - 1) & !3;
        u32::from_be_bytes([tmem[o], tmem[o + 1], tmem[o + 2], tmem[o + 3]])
    };

    let mut crc: u32 = 0;
    let mut row_start = start;

    for h in (1..=height).rev() {
        let mut offset = row_start;
        for i in (1..=width).rev() {
            let w0 = word(offset);
            let w1 = word(offset + 4);
            let t = (i as u64) * (w1.wrapping_add(w0).wrapping_add(crc) as u64);
            crc = ((t >> 32) as u32).wrapping_add(t as u32);
            offset += 8;
        }

        let t = (h as u64) * (crc as u64);
        crc = ((t >> 32) as u32).wrapping_add(h.wrapping_mul(crc));
        row_start += stride;
    }

    crc
}

const fn make_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if (c & 1) != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

static CRC32_TABLE: [u32; 256] = make_crc32_table();

/// Reflected CRC-32 (0xEDB88320) without the final inversion, continuing from `crc`.
/// Palette banks are hashed with a seed of 0xFFFFFFFF.
pub fn crc32(mut crc: u32, bytes: &[u8]) -> u32 {
    for b in bytes {
        crc = CRC32_TABLE[((crc ^ *b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc
}

/// CRC of 16-bit palette entries, hashed as big endian bytes
pub fn crc32_u16(crc: u32, entries: &[u16]) -> u32 {
    entries.iter().fold(crc, |crc, e| crc32(crc, &e.to_be_bytes()))
}

/// CRC of 32-bit values, hashed as big endian bytes
pub fn crc32_u32(crc: u32, values: &[u32]) -> u32 {
    values.iter().fold(crc, |crc, v| crc32(crc, &v.to_be_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        // standard check input, without the final xor
        assert_eq!(crc32(0xFFFF_FFFF, b"123456789"), !0xCBF4_3926u32);
        assert_eq!(crc32(0xFFFF_FFFF, &[]), 0xFFFF_FFFF);
    }

    #[test]
    fn test_crc32_helpers_are_big_endian() {
        assert_eq!(crc32_u16(0xFFFF_FFFF, &[0x1234]), crc32(0xFFFF_FFFF, &[0x12, 0x34]));
        assert_eq!(crc32_u32(0, &[0xDEAD_BEEF]), crc32(0, &[0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[test]
    fn test_texture_crc_empty_is_zero() {
        let tmem = [0u8; TMEM_SIZE];
        assert_eq!(texture_crc(&tmem, 0, 0, 4, 8), 0);
        assert_eq!(texture_crc(&tmem, 0, 4, 0, 8), 0);
        assert_eq!(texture_crc(&tmem, 0, 4, 4, 32), 0);
    }

    #[test]
    fn test_texture_crc_pinned() {
        let mut tmem = [0u8; TMEM_SIZE];
        for (i, b) in tmem.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }

        assert_eq!(texture_crc(&tmem, 0, 1, 1, 8), CRC_1X1);
        assert_eq!(texture_crc(&tmem, 0, 4, 4, 32), CRC_4X4);
        assert_eq!(texture_crc(&tmem, 0x100, 8, 16, 64), CRC_8X16_AT_100);
        // rows past the end of TMEM wrap to the start
        assert_eq!(texture_crc(&tmem, 0xFE0, 4, 2, 32), CRC_WRAPPED);
    }

    #[test]
    fn test_texture_crc_sees_every_word() {
        let mut tmem = [0u8; TMEM_SIZE];
        let before = texture_crc(&tmem, 0, 4, 4, 32);
        tmem[3 * 32 + 3 * 8 + 7] = 1;
        assert_ne!(texture_crc(&tmem, 0, 4, 4, 32), before);
        // outside the footprint
        tmem[4 * 32] = 1;
        let with_last = texture_crc(&tmem, 0, 4, 4, 32);
        tmem[4 * 32] = 0;
        assert_eq!(texture_crc(&tmem, 0, 4, 4, 32), with_last);
    }

    const CRC_1X1: u32 = 0x2230_3E4C;
    const CRC_4X4: u32 = 0x1A03_8935;
    const CRC_8X16_AT_100: u32 = 0x3B29_28BB;
    const CRC_WRAPPED: u32 = 0x480E_D24F;
}
