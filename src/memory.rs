#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::*;

/// A flat, word addressed block of console memory (RDRAM or DMEM). Words are stored in
/// native u32 form and interpreted big endian, the way the console sees them.
#[derive(Clone)]
pub struct Memory {
    words: Vec<u32>,
    // byte address mask, size - 1
    mask: u32,
}

impl Memory {
    /// `size` is rounded up to a power of two so that addresses can be masked
    pub fn new(size: usize) -> Memory {
        let size = size.max(4).next_power_of_two();
        Memory {
            words: vec![0u32; size >> 2],
            mask : (size - 1) as u32,
        }
    }

    /// Build memory from a big endian byte dump
    pub fn from_bytes(bytes: &[u8]) -> Memory {
        let mut mem = Memory::new(bytes.len());
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            mem.words[i] = u32::from_be_bytes(word);
        }
        debug!(target: "MEM", "loaded {} bytes, mask=${:08X}", bytes.len(), mem.mask);
        mem
    }

    pub fn len(&self) -> usize {
        self.words.len() << 2
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// BMASK
    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn write_block(&mut self, offset: usize, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.write_u8(*b, offset + i);
        }
    }
}

impl Addressable for Memory {
    #[inline(always)]
    fn read_u32(&self, offset: usize) -> u32 {
        self.words[((offset as u32 & self.mask) >> 2) as usize]
    }

    #[inline(always)]
    fn write_u32(&mut self, value: u32, offset: usize) {
        let index = ((offset as u32 & self.mask) >> 2) as usize;
        self.words[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_big_endian_access() {
        let mut mem = Memory::new(64);
        mem.write_u32(0x1122_3344, 8);
        assert_eq!(mem.read_u16(8), 0x1122);
        assert_eq!(mem.read_u16(10), 0x3344);
        assert_eq!(mem.read_u8(9), 0x22);
        assert_eq!(mem.read_u8(11), 0x44);

        mem.write_u16(0xBEEF, 10);
        assert_eq!(mem.read_u32(8), 0x1122_BEEF);
        mem.write_u8(0x99, 8);
        assert_eq!(mem.read_u32(8), 0x9922_BEEF);
    }

    #[test]
    fn test_memory_wraps_with_mask() {
        let mut mem = Memory::new(60);
        assert_eq!(mem.len(), 64);
        assert_eq!(mem.mask(), 63);
        mem.write_u32(0xCAFE_F00D, 64 + 4);
        assert_eq!(mem.read_u32(4), 0xCAFE_F00D);
    }

    #[test]
    fn test_memory_from_bytes() {
        let mem = Memory::from_bytes(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]);
        assert_eq!(mem.read_u32(0), 0xDEAD_BEEF);
        assert_eq!(mem.read_u32(4), 0x0102_0000);
        assert_eq!(mem.read_block(1, 3), vec![0xAD, 0xBE, 0xEF]);
    }
}
