//! Tile descriptors, the texture image pointer and everything that moves data into TMEM.

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::Addressable;
use crate::backend::Backend;
use crate::texcache::{crc, TMEM_SIZE};
use crate::ucode::Microcode;

use super::{Rdp, UPDATE_TEXTURE};

const FORMAT_NAMES: [&str; 8] = ["RGBA", "YUV", "CI", "IA", "I", "?", "?", "?"];
const SIZE_NAMES: [&str; 4] = ["4b", "8b", "16b", "32b"];

/// One of the eight tile descriptors
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Tile {
    pub format  : u8,
    pub size    : u8,
    // row pitch in 64-bit words
    pub line    : u32,
    // TMEM address in 64-bit words
    pub t_mem   : u32,
    pub palette : u8,

    pub clamp_s : bool,
    pub mirror_s: bool,
    pub mask_s  : u8,
    pub shift_s : u8,
    pub clamp_t : bool,
    pub mirror_t: bool,
    pub mask_t  : u8,
    pub shift_t : u8,

    // integer texel coordinates from the last tile size or load
    pub ul_s    : u32,
    pub ul_t    : u32,
    pub lr_s    : u32,
    pub lr_t    : u32,

    // 10.2 fixed point coordinates as floats
    pub f_ul_s  : f32,
    pub f_ul_t  : f32,
    pub f_lr_s  : f32,
    pub f_lr_t  : f32,

    // size the texture cache settled on for this tile
    pub width   : u32,
    pub height  : u32,
}

/// Where the next load takes its texels from
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TextureImage {
    pub format: u8,
    pub size  : u8,
    pub width : u32,
    pub addr  : u32,
    // 0 = last load was a block load, 1 = a tile load
    pub set_by: u8,
}

// Diddy Kong Racing offsets its texture image pointer by a table of 16-bit values
#[derive(Copy, Clone, Debug, Default)]
pub(super) struct TexShift {
    pub table: u32,
    pub shift: u32,
    pub count: u32,
}

impl TexShift {
    pub fn clear(&mut self) {
        *self = TexShift::default();
    }
}

impl<B: Backend> Rdp<B> {
    pub(super) fn handle_settextureimage(&mut self) { // G_SETTIMG
        self.timg.format = ((self.cmd0 >> 21) & 0x07) as u8;
        self.timg.size   = ((self.cmd0 >> 19) & 0x03) as u8;
        self.timg.width  = (self.cmd0 & 0x0FFF) + 1;
        self.timg.addr   = self.segoffset(self.cmd1);

        if self.texshift.table != 0 {
            if self.timg.format == 0 {
                let shift = self.rdram.read_u16((self.texshift.table + self.texshift.count * 2) as usize) as u32;
                self.texshift.shift = shift;
                self.timg.addr = self.timg.addr.wrapping_add(shift);
            } else {
                self.texshift.clear();
            }
        }

        self.update |= UPDATE_TEXTURE;

        trace!(target: "RDP", "{} gsDPSetTextureImage(G_IM_FMT_{}, G_IM_SIZ_{}, {}, 0x{:08X})", self.command_prefix,
               FORMAT_NAMES[self.timg.format as usize], SIZE_NAMES[self.timg.size as usize], self.timg.width, self.timg.addr);

        self.copy_self_before_texture_read();
    }

    pub(super) fn handle_settile(&mut self) { // G_SETTILE
        let t = ((self.cmd1 >> 24) & 0x07) as usize;
        self.last_tile = t;

        let tile = &mut self.tiles[t];
        tile.format   = ((self.cmd0 >> 21) & 0x07) as u8;
        tile.size     = ((self.cmd0 >> 19) & 0x03) as u8;
        tile.line     = (self.cmd0 >> 9) & 0x01FF;
        tile.t_mem    = self.cmd0 & 0x01FF;
        tile.palette  = ((self.cmd1 >> 20) & 0x0F) as u8;
        tile.clamp_t  = (self.cmd1 & 0x0008_0000) != 0;
        tile.mirror_t = (self.cmd1 & 0x0004_0000) != 0;
        tile.mask_t   = ((self.cmd1 >> 14) & 0x0F) as u8;
        tile.shift_t  = ((self.cmd1 >> 10) & 0x0F) as u8;
        tile.clamp_s  = (self.cmd1 & 0x0000_0200) != 0;
        tile.mirror_s = (self.cmd1 & 0x0000_0100) != 0;
        tile.mask_s   = ((self.cmd1 >> 4) & 0x0F) as u8;
        tile.shift_s  = (self.cmd1 & 0x0F) as u8;

        self.update |= UPDATE_TEXTURE;

        let tile = &self.tiles[t];
        trace!(target: "RDP", "{} gsDPSetTile(G_IM_FMT_{}, G_IM_SIZ_{}, {}, 0x{:03X}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
               self.command_prefix, FORMAT_NAMES[tile.format as usize], SIZE_NAMES[tile.size as usize], tile.line,
               tile.t_mem, t, tile.palette, tile.clamp_t as u8 | ((tile.mirror_t as u8) << 1), tile.mask_t, tile.shift_t,
               tile.clamp_s as u8 | ((tile.mirror_s as u8) << 1), tile.mask_s, tile.shift_s, self.cmd1);
    }

    pub(super) fn handle_settilesize(&mut self) { // G_SETTILESIZE
        let t = ((self.cmd1 >> 24) & 0x07) as usize;
        self.last_tile_size = t;

        let tile = &mut self.tiles[t];
        tile.f_ul_s = ((self.cmd0 >> 12) & 0x0FFF) as f32 / 4.0;
        tile.f_ul_t = (self.cmd0 & 0x0FFF) as f32 / 4.0;
        tile.f_lr_s = ((self.cmd1 >> 12) & 0x0FFF) as f32 / 4.0;
        tile.f_lr_t = (self.cmd1 & 0x0FFF) as f32 / 4.0;

        let ul_s = (self.cmd0 >> 14) & 0x03FF;
        let ul_t = (self.cmd0 >> 2) & 0x03FF;
        let lr_s = (self.cmd1 >> 14) & 0x03FF;
        let lr_t = (self.cmd1 >> 2) & 0x03FF;

        tile.ul_s = ul_s;
        tile.ul_t = ul_t;
        // coordinates wrap at 10 bits
        tile.lr_s = if lr_s < ul_s { lr_s + 0x400 } else { lr_s };
        tile.lr_t = if lr_t < ul_t { lr_t + 0x400 } else { lr_t };

        // a zero sized tile gets its size from the next loadtile
        if lr_s == 0 && ul_s == 0 {
            self.wrong_tile = Some(t);
        } else if self.wrong_tile == Some(t) {
            self.wrong_tile = None;
        }

        self.update |= UPDATE_TEXTURE;

        trace!(target: "RDP", "{} gsDPSetTileSize({}, {}, {}, {}, {})", self.command_prefix, t,
               self.cmd0 >> 12 & 0x0FFF, self.cmd0 & 0x0FFF, self.cmd1 >> 12 & 0x0FFF, self.cmd1 & 0x0FFF);
    }

    pub(super) fn handle_loadtlut(&mut self) { // G_LOADTLUT
        let t = ((self.cmd1 >> 24) & 0x07) as usize;
        let start = self.tiles[t].t_mem.wrapping_sub(256);
        let mut count = ((self.cmd1 >> 14) & 0x03FF) + 1;

        trace!(target: "RDP", "{} gsDPLoadTLUTCmd({}, {})", self.command_prefix, t, count - 1);

        // TLUT lives in the upper half of TMEM
        if start >= 256 {
            debug!(target: "RDP", "loadtlut to TMEM 0x{:03X} ignored", self.tiles[t].t_mem);
            return;
        }

        let bmask = self.rdram.mask();
        let addr = self.timg.addr & bmask;
        if addr + count * 2 > bmask {
            count = (bmask - addr) >> 1;
        }
        if start + count > 256 {
            count = 256 - start;
        }

        for i in 0..count {
            self.palette[(start + i) as usize] = self.rdram.read_u16((addr + i * 2) as usize);
        }

        let first_bank = (start >> 4) as usize;
        let banks = ((count >> 4) as usize).max(1);
        for bank in first_bank..(first_bank + banks).min(16) {
            self.pal_8_crc[bank] = crc::crc32_u16(0xFFFF_FFFF, &self.palette[bank * 16..bank * 16 + 16]);
        }
        self.pal_256_crc = crc::crc32_u32(0xFFFF_FFFF, &self.pal_8_crc);

        self.timg.addr = self.timg.addr.wrapping_add(count << 1);
        self.update |= UPDATE_TEXTURE;
    }

    pub(super) fn handle_loadblock(&mut self) { // G_LOADBLOCK
        let t = ((self.cmd1 >> 24) & 0x07) as usize;
        let dxt = self.cmd1 & 0x0FFF;
        let mut lr_s = (self.cmd1 >> 14) & 0x03FF;

        trace!(target: "RDP", "{} gsDPLoadBlock({}, {}, {}, {}, {})", self.command_prefix, t,
               (self.cmd0 >> 14) & 0x03FF, (self.cmd0 >> 2) & 0x03FF, lr_s, dxt);

        if self.fb.skip_drawing {
            trace!(target: "RDP", "loadblock skipped");
            return;
        }

        if self.texshift.table != 0 && self.microcode == Microcode::DiddyKong {
            if self.texshift.shift % ((lr_s + 1) << 3) != 0 {
                self.timg.addr = self.timg.addr.wrapping_sub(self.texshift.shift);
                self.texshift.clear();
            } else {
                self.texshift.count += 1;
            }
        }

        let t_mem = self.tiles[t].t_mem;
        self.texture_addr[(t_mem & 0x01FF) as usize] = self.timg.addr;

        let bmask = self.rdram.mask();
        let addr = self.segoffset(self.timg.addr) & bmask;

        // lr_s counts 64-bit words here
        let mut ul_s = (self.cmd0 >> 14) & 0x03FF;
        let ul_t = (self.cmd0 >> 2) & 0x03FF;

        self.tiles[t].ul_s = ul_s;
        self.tiles[t].ul_t = ul_t;
        // coordinates wrap at 10 bits
        self.tiles[t].lr_s = if lr_s < ul_s { lr_s + 0x400 } else { lr_s };
        self.timg.set_by = 0;

        if ul_s >= 512 {
            lr_s = 1;
            ul_s = 511;
        }
        if ul_s + lr_s > 512 {
            lr_s = 512 - ul_s;
        }
        if addr + (lr_s << 3) > bmask + 1 {
            lr_s = (bmask - addr) >> 3;
        }

        let size = self.tiles[t].size;
        let off = self.timg.addr.wrapping_add(ul_s << size >> 1);
        let mut cnt = (lr_s + 1).saturating_sub(ul_s);
        if size == 3 {
            cnt <<= 1;
        }

        if self.timg.size == 3 {
            self.load_block_32b(t, ul_s, ul_t, lr_s, dxt);
        } else {
            let start = (t_mem as usize) << 3;
            for q in 0..cnt as usize {
                let dst = start + q * 8;
                if dst + 8 > TMEM_SIZE {
                    break;
                }

                // dxt steps a line counter, odd lines are stored word swapped
                let swap = if q > 0 && (((q as u32).wrapping_mul(dxt) >> 11) & 1) != 0 { 4 } else { 0 };
                let src = off as usize + q * 8;
                for b in 0..8 {
                    self.tmem[dst + (b ^ swap)] = self.rdram.read_u8(src + b);
                }
            }
        }

        self.timg.addr = self.timg.addr.wrapping_add(cnt << 3);
        self.tiles[t].lr_t = ul_t + (dxt.wrapping_mul(cnt) >> 11);

        self.update |= UPDATE_TEXTURE;
    }

    // 32-bit texels are split: red and green go to the low half of TMEM, blue and alpha to
    // the high half
    fn write_texel_32(&mut self, halfword: u32, odd: bool, c: u32) {
        let index = ((halfword ^ if odd { 2 } else { 0 }) & 0x03FF) as usize * 2;
        self.tmem[index..index + 2].copy_from_slice(&((c >> 16) as u16).to_be_bytes());
        self.tmem[index + 0x800..index + 0x802].copy_from_slice(&(c as u16).to_be_bytes());
    }

    fn load_block_32b(&mut self, t: usize, ul_s: u32, ul_t: u32, lr_s: u32, dxt: u32) {
        let tb = self.tiles[t].t_mem << 2;
        let mut width = (lr_s + 1).saturating_sub(ul_s);
        if (width & 1) != 0 {
            width += 1;
        }

        let base = (self.timg.addr >> 2) + ul_t * self.timg.width + ul_s;
        let mut j = 0u32;
        for i in (0..width).step_by(2) {
            let odd = dxt != 0 && ((j >> 11) & 1) != 0;
            for k in 0..2 {
                let c = self.rdram.read_u32(((base + i + k) << 2) as usize);
                self.write_texel_32(tb + i + k, odd, c);
            }
            j = j.wrapping_add(dxt);
        }
    }

    pub(super) fn handle_loadtile(&mut self) { // G_LOADTILE
        let t = ((self.cmd1 >> 24) & 0x07) as usize;
        let ul_s = (self.cmd0 >> 14) & 0x03FF;
        let ul_t = (self.cmd0 >> 2) & 0x03FF;
        let lr_s = (self.cmd1 >> 14) & 0x03FF;
        let lr_t = (self.cmd1 >> 2) & 0x03FF;

        trace!(target: "RDP", "{} gsDPLoadTile({}, {}, {}, {}, {})", self.command_prefix, t, ul_s, ul_t, lr_s, lr_t);

        if self.fb.skip_drawing {
            trace!(target: "RDP", "loadtile skipped");
            return;
        }

        self.timg.set_by = 1;
        let t_mem = self.tiles[t].t_mem;
        self.texture_addr[(t_mem & 0x01FF) as usize] = self.timg.addr;

        if lr_s < ul_s || lr_t < ul_t {
            return;
        }

        if let Some(w) = self.wrong_tile {
            let tile_size = self.tiles[t].size;
            let wrong = &mut self.tiles[w];
            wrong.lr_s = if tile_size > wrong.size {
                lr_s << (tile_size - wrong.size)
            } else {
                lr_s >> (wrong.size - tile_size)
            };
            wrong.lr_t = lr_t;
            wrong.mask_s = 0;
            wrong.mask_t = 0;
        }

        let size = self.tiles[t].size;
        let width = lr_s - ul_s + 1;
        let mut height = lr_t - ul_t + 1;

        let bmask = self.rdram.mask();
        let line_n = self.timg.width << size >> 1;
        let offs = (ul_t.wrapping_mul(line_n)).wrapping_add(ul_s << size >> 1).wrapping_add(self.timg.addr);
        if offs >= bmask {
            return;
        }

        if self.timg.size == 3 {
            self.load_tile_32b(t, ul_s, ul_t, width, height);
            return;
        }

        if line_n != 0 && offs + line_n * height > bmask {
            height = (bmask - offs) / line_n;
        }
        if height == 0 {
            return;
        }

        let line = self.tiles[t].line as usize * 8;
        if line == 0 || line > TMEM_SIZE {
            return;
        }

        let start = t_mem as usize * 8;
        let end = TMEM_SIZE - line;
        for row in 0..height as usize {
            let dst = start + row * line;
            if dst > end {
                break;
            }

            let swap = if (row & 1) != 0 { 4 } else { 0 };
            let src = offs as usize + row * line_n as usize;
            for i in 0..line {
                self.tmem[dst + (i ^ swap)] = self.rdram.read_u8(src + i);
            }
        }

        self.update |= UPDATE_TEXTURE;
    }

    fn load_tile_32b(&mut self, t: usize, ul_s: u32, ul_t: u32, width: u32, height: u32) {
        let line = self.tiles[t].line << 2;
        let tb = self.tiles[t].t_mem << 2;

        for j in 0..height {
            let odd = (j & 1) != 0;
            let row = (j + ul_t) * self.timg.width + ul_s;
            for i in 0..width {
                let c = self.rdram.read_u32((self.timg.addr + ((row + i) << 2)) as usize);
                self.write_texel_32(tb + line * j + i, odd, c);
            }
        }

        self.update |= UPDATE_TEXTURE;
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use crate::Addressable;

    #[test]
    fn test_settile_and_settilesize() {
        let mut rdp = test_rdp(0x1_0000);
        // G_SETTILE RGBA16, line 8, tmem 0x100, tile 7, clamp_t, mask_t 5, mirror_s, mask_s 4, shift_s 1
        rdp.run_command(0xF510_1100, 0x0709_4111);
        let tile = rdp.tiles[7];
        assert_eq!((tile.format, tile.size, tile.line, tile.t_mem), (0, 2, 8, 0x100));
        assert!(tile.clamp_t && !tile.mirror_t);
        assert_eq!((tile.mask_t, tile.shift_t), (5, 0));
        assert!(!tile.clamp_s && tile.mirror_s);
        assert_eq!((tile.mask_s, tile.shift_s), (1, 1));
        assert_eq!(rdp.last_tile, 7);

        // G_SETTILESIZE tile 7, (1.0, 2.0) to (31.0, 15.0)
        rdp.run_command(0xF200_4008, 0x0707_C03C);
        let tile = rdp.tiles[7];
        assert_eq!((tile.ul_s, tile.ul_t, tile.lr_s, tile.lr_t), (1, 2, 31, 15));
        assert_eq!((tile.f_ul_s, tile.f_lr_t), (1.0, 15.0));
    }

    #[test]
    fn test_zero_sized_tile_takes_next_loadtile_size() {
        let mut rdp = test_rdp(0x1_0000);
        // tile 1 is 8-bit with a mask, sized 0x0
        rdp.run_command(0xF508_0000, 0x0100_4010);
        rdp.run_command(0xF200_0000, 0x0100_0000);
        assert_eq!(rdp.wrong_tile, Some(1));

        // load a 16-bit 32x16 area through tile 0
        rdp.run_command(0xFD10_001F, 0x0000_1000);
        rdp.run_command(0xF510_1000, 0x0000_0000);
        rdp.run_command(0xF400_0000, 0x0007_C03C);

        let wrong = rdp.tiles[1];
        // 16-bit texels are twice as wide as 8-bit ones
        assert_eq!(wrong.lr_s, 31 << 1);
        assert_eq!(wrong.lr_t, 15);
        assert_eq!((wrong.mask_s, wrong.mask_t), (0, 0));
        // the loading tile itself is untouched
        assert_eq!(rdp.tiles[0].lr_s, 0);

        // a real size clears the quirk
        rdp.run_command(0xF200_0000, 0x0107_C03C);
        assert_eq!(rdp.wrong_tile, None);
    }

    #[test]
    fn test_loadblock_swaps_odd_lines() {
        let mut rdp = test_rdp(0x1_0000);
        for i in 0..64u32 {
            rdp.rdram.write_u32(0x1000_0000 | i, (0x1000 + i * 4) as usize);
        }

        // timg RGBA16 width 1 at 0x1000, settile RGBA16 tmem 0, load 8 qwords with dxt = 0x400
        // (a line is two qwords)
        rdp.run_command(0xFD10_0000, 0x0000_1000);
        rdp.run_command(0xF510_0000, 0x0000_0000);
        rdp.run_command(0xF300_0000, 0x0001_C400);

        let word = |rdp: &crate::rdp::Rdp, i: usize| u32::from_be_bytes(rdp.tmem[i * 4..i * 4 + 4].try_into().unwrap());
        // line 0 as is
        assert_eq!(word(&rdp, 0), 0x1000_0000);
        assert_eq!(word(&rdp, 1), 0x1000_0001);
        assert_eq!(word(&rdp, 2), 0x1000_0002);
        // line 1 starts at qword 2 and is word swapped
        assert_eq!(word(&rdp, 4), 0x1000_0005);
        assert_eq!(word(&rdp, 5), 0x1000_0004);
        assert_eq!(word(&rdp, 7), 0x1000_0006);
        // line 2 is straight again
        assert_eq!(word(&rdp, 8), 0x1000_0008);

        assert_eq!(rdp.timg.addr, 0x1000 + 8 * 8);
        assert_eq!(rdp.tiles[0].lr_t, (0x400 * 8) >> 11);
        assert_eq!(rdp.texture_addr[0], 0x1000);
        assert_eq!(rdp.timg.set_by, 0);
    }

    #[test]
    fn test_loadblock_inverted_range_wraps_and_binds() {
        let mut rdp = test_rdp(0x1_0000);
        // TEXEL0 combine, timg RGBA16 width 32, settile RGBA16 line 8
        rdp.run_command(0xFCFF_FFFF, 0xFFFC_F279);
        rdp.run_command(0xFD10_001F, 0x0000_2000);
        rdp.run_command(0xF510_1000, 0x0000_0000);
        // ul_s 8, lr_s 4
        rdp.run_command(0xF302_0000, 0x0001_0000);
        assert_eq!(rdp.tiles[0].ul_s, 8);
        assert_eq!(rdp.tiles[0].lr_s, 4 + 0x400);

        rdp.update_state();
        assert!(rdp.fault.is_none());
        assert!(rdp.cur_cache[0].is_some());
        assert!(rdp.tiles[0].width <= 1024);
    }

    #[test]
    fn test_loadtile_rows() {
        let mut rdp = test_rdp(0x1_0000);
        // a 4x2 RGBA16 image, 8 bytes per row
        for i in 0..4u32 {
            rdp.rdram.write_u32(0xA0A0_0000 | i, (0x2000 + i * 4) as usize);
        }
        rdp.run_command(0xFD10_0003, 0x0000_2000);
        // line 1 qword, tmem 0x10
        rdp.run_command(0xF510_0210, 0x0000_0000);
        // load (0,0)-(3,1)
        rdp.run_command(0xF400_0000, 0x0000_C004);

        let base = 0x10 * 8;
        let word = |rdp: &crate::rdp::Rdp, i: usize| u32::from_be_bytes(rdp.tmem[base + i * 4..base + i * 4 + 4].try_into().unwrap());
        assert_eq!(word(&rdp, 0), 0xA0A0_0000);
        assert_eq!(word(&rdp, 1), 0xA0A0_0001);
        // odd row swapped
        assert_eq!(word(&rdp, 2), 0xA0A0_0003);
        assert_eq!(word(&rdp, 3), 0xA0A0_0002);
        assert_eq!(rdp.timg.set_by, 1);
        assert_eq!(rdp.texture_addr[0x10], 0x2000);
    }

    #[test]
    fn test_loadtile_32b_splits_halves() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.rdram.write_u32(0x1122_3344, 0x3000);
        rdp.run_command(0xFD18_0000, 0x0000_3000);
        rdp.run_command(0xF518_0200, 0x0000_0000);
        rdp.run_command(0xF400_0000, 0x0000_0000);

        assert_eq!(&rdp.tmem[0..2], &[0x11, 0x22]);
        assert_eq!(&rdp.tmem[0x800..0x802], &[0x33, 0x44]);
    }

    #[test]
    fn test_loadtlut_and_palette_crcs() {
        let mut rdp = test_rdp(0x1_0000);
        for i in 0..8u32 {
            rdp.rdram.write_u32(((2 * i) << 16) | (2 * i + 1), (0x4000 + i * 4) as usize);
        }

        rdp.run_command(0xFD10_0000, 0x0000_4000);
        // tile 7 at tmem 0x100 + 16 (bank 1)
        rdp.run_command(0xF500_0110, 0x0700_0000);
        let before = rdp.pal_256_crc;
        // 16 entries
        rdp.run_command(0xF000_0000, 0x0703_C000);

        assert_eq!(rdp.palette[16], 0);
        assert_eq!(rdp.palette[17], 1);
        assert_eq!(rdp.palette[31], 15);
        assert_eq!(rdp.pal_8_crc[1], crate::texcache::crc::crc32_u16(0xFFFF_FFFF, &rdp.palette[16..32]));
        assert_ne!(rdp.pal_256_crc, before);
        assert_eq!(rdp.timg.addr, 0x4000 + 32);
    }

    #[test]
    fn test_loads_skipped_while_not_drawing() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.rdram.write_u32(0xFFFF_FFFF, 0x1000);
        rdp.fb.skip_drawing = true;
        rdp.run_command(0xFD10_0000, 0x0000_1000);
        rdp.run_command(0xF300_0000, 0x0000_0000);
        assert_eq!(rdp.tmem[0], 0);
        assert_eq!(rdp.timg.addr, 0x1000);
    }
}
