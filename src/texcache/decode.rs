//! TMEM to RGBA8888 conversion. Output texels have red in the top byte and alpha in the
//! bottom byte.

use super::TMEM_SIZE;

/// Where and how a tile's texels sit in TMEM
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TmemLayout {
    pub format   : u8,
    pub size     : u8,
    // byte offset of the first row
    pub start    : usize,
    // bytes between rows (per half for 32-bit textures)
    pub stride   : usize,
    pub palette  : u8,
    // 0 = no TLUT, 2 = RGBA16 palette, 3 = IA16 palette
    pub tlut_mode: u8,
}

pub fn rgba5551_to_8888(c: u16) -> u32 {
    let expand = |v: u16| -> u32 {
        let v = (v & 0x1F) as u32;
        (v << 3) | (v >> 2)
    };
    let a = if (c & 1) != 0 { 0xFF } else { 0 };
    (expand(c >> 11) << 24) | (expand(c >> 6) << 16) | (expand(c >> 1) << 8) | a
}

pub fn rgba8888_to_5551(c: u32) -> u16 {
    let r = ((c >> 27) & 0x1F) as u16;
    let g = ((c >> 19) & 0x1F) as u16;
    let b = ((c >> 11) & 0x1F) as u16;
    let a = if (c & 0xFF) >= 0x80 { 1 } else { 0 };
    (r << 11) | (g << 6) | (b << 1) | a
}

pub fn ia16_to_8888(c: u16) -> u32 {
    let i = (c >> 8) as u32;
    (i << 24) | (i << 16) | (i << 8) | (c as u32 & 0xFF)
}

fn gray(i: u32, a: u32) -> u32 {
    (i << 24) | (i << 16) | (i << 8) | a
}

fn clamp_u8(v: f32) -> u32 {
    num_traits::clamp(v, 0.0, 255.0) as u32
}

fn yuv_to_8888(y: u8, u: u8, v: u8) -> u32 {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = clamp_u8(y + 1.402 * v);
    let g = clamp_u8(y - 0.344 * u - 0.714 * v);
    let b = clamp_u8(y + 1.772 * u);
    (r << 24) | (g << 16) | (b << 8) | 0xFF
}

struct Tmem<'a> {
    bytes: &'a [u8; TMEM_SIZE],
}

impl Tmem<'_> {
    // odd rows are stored with their 32-bit halves swapped
    fn u8(&self, offset: usize, odd: bool) -> u8 {
        let o = if odd { offset ^ 4 } else { offset };
        self.bytes[o & (TMEM_SIZE - 1)]
    }

    fn u16(&self, offset: usize, odd: bool) -> u16 {
        ((self.u8(offset, odd) as u16) << 8) | self.u8(offset + 1, odd) as u16
    }
}

/// Decode `width` x `height` texels into `out`, whose rows are `out_stride` texels apart
pub fn decode(tmem: &[u8; TMEM_SIZE], palette: &[u16; 256], layout: &TmemLayout, width: usize, height: usize,
              out: &mut [u32], out_stride: usize) {
    let mem = Tmem { bytes: tmem };
    let width = width.min(out_stride);
    let height = height.min(out.len() / out_stride.max(1));

    let lookup = |index: usize| -> u32 {
        let entry = palette[index & 0xFF];
        if layout.tlut_mode == 3 { ia16_to_8888(entry) } else { rgba5551_to_8888(entry) }
    };

    let paletted = layout.format == 2 || (layout.format == 0 && layout.tlut_mode != 0);

    for y in 0..height {
        let row = layout.start + y * layout.stride;
        let odd = (y & 1) != 0;
        let dst = &mut out[y * out_stride..y * out_stride + width];

        for (x, texel) in dst.iter_mut().enumerate() {
            *texel = match layout.size {
                0 => {
                    let b = mem.u8(row + (x >> 1), odd);
                    let n = (if (x & 1) == 0 { b >> 4 } else { b & 0x0F }) as u32;
                    if paletted {
                        lookup(((layout.palette as usize) << 4) | n as usize)
                    } else if layout.format == 3 {
                        let i = ((n >> 1) * 255) / 7;
                        gray(i, if (n & 1) != 0 { 0xFF } else { 0 })
                    } else {
                        gray(n * 17, n * 17)
                    }
                },

                1 => {
                    let b = mem.u8(row + x, odd) as u32;
                    if paletted {
                        lookup(b as usize)
                    } else if layout.format == 3 {
                        gray((b >> 4) * 17, (b & 0x0F) * 17)
                    } else {
                        gray(b, b)
                    }
                },

                2 => match layout.format {
                    1 => {
                        // UYVY, two texels per word
                        let pair = row + ((x & !1) << 1);
                        let u = mem.u8(pair, odd);
                        let luma = mem.u8(pair + 1 + ((x & 1) << 1), odd);
                        let v = mem.u8(pair + 2, odd);
                        yuv_to_8888(luma, u, v)
                    },
                    3 => ia16_to_8888(mem.u16(row + (x << 1), odd)),
                    _ => rgba5551_to_8888(mem.u16(row + (x << 1), odd)),
                },

                _ => {
                    // red/green in the low half of TMEM, blue/alpha in the high half
                    let offset = (row + (x << 1)) & 0x7FF;
                    let rg = mem.u16(offset, odd) as u32;
                    let ba = mem.u16(offset | 0x800, odd) as u32;
                    (rg << 16) | ba
                },
            };
        }
    }
}

/// Run a palette through `f` as RGBA8888 and store it back as RGBA5551
pub fn modify_palette(palette: &[u16; 256], f: impl FnOnce(&mut [u32])) -> [u16; 256] {
    let mut wide = [0u32; 256];
    for (w, p) in wide.iter_mut().zip(palette.iter()) {
        *w = rgba5551_to_8888(*p);
    }
    f(&mut wide);

    let mut out = [0u16; 256];
    for (o, w) in out.iter_mut().zip(wide.iter()) {
        *o = rgba8888_to_5551(*w);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(format: u8, size: u8, stride: usize) -> TmemLayout {
        TmemLayout { format: format, size: size, start: 0, stride: stride, palette: 0, tlut_mode: 0 }
    }

    #[test]
    fn test_color_conversions() {
        assert_eq!(rgba5551_to_8888(0xFFFF), 0xFFFF_FFFF);
        assert_eq!(rgba5551_to_8888(0xF800), 0xFF00_0000);
        assert_eq!(rgba5551_to_8888(0x003F), 0x0000_FFFF);
        assert_eq!(rgba8888_to_5551(0xFF00_00FF), 0xF801);
        assert_eq!(rgba8888_to_5551(rgba5551_to_8888(0x1235)), 0x1235);
        assert_eq!(ia16_to_8888(0x8040), 0x8080_8040);
    }

    #[test]
    fn test_decode_rgba16_with_odd_row_swap() {
        let mut tmem = [0u8; TMEM_SIZE];
        // row 0: texel 0 red
        tmem[0..2].copy_from_slice(&0xF801u16.to_be_bytes());
        // row 1: texel 0 lives in the second word of the qword
        tmem[8 + 4..8 + 6].copy_from_slice(&0x07C1u16.to_be_bytes());

        let mut out = vec![0u32; 4 * 2];
        decode(&tmem, &[0; 256], &layout(0, 2, 8), 4, 2, &mut out, 4);
        assert_eq!(out[0], 0xFF00_00FF);
        assert_eq!(out[4], 0x00FF_00FF);
    }

    #[test]
    fn test_decode_ci4_uses_palette_bank() {
        let mut tmem = [0u8; TMEM_SIZE];
        tmem[0] = 0x1F;
        let mut palette = [0u16; 256];
        palette[0x31] = 0xF801;
        palette[0x3F] = 0x003F;

        let mut l = layout(2, 0, 8);
        l.palette = 3;
        l.tlut_mode = 2;
        let mut out = vec![0u32; 2];
        decode(&tmem, &palette, &l, 2, 1, &mut out, 2);
        assert_eq!(out, vec![0xFF00_00FF, 0x0000_FFFF]);
    }

    #[test]
    fn test_decode_intensity_formats() {
        let mut tmem = [0u8; TMEM_SIZE];
        tmem[0] = 0xF3;

        let mut out = vec![0u32; 2];
        decode(&tmem, &[0; 256], &layout(4, 0, 8), 2, 1, &mut out, 2);
        assert_eq!(out, vec![0xFFFF_FFFF, 0x3333_3333]);

        // IA4: 3 bits of intensity and one bit of alpha
        decode(&tmem, &[0; 256], &layout(3, 0, 8), 2, 1, &mut out, 2);
        assert_eq!(out, vec![0xFFFF_FFFF, 0x2424_2400 | 0xFF]);

        // IA8
        decode(&tmem, &[0; 256], &layout(3, 1, 8), 1, 1, &mut out, 2);
        assert_eq!(out[0], 0xFFFF_FF33);
    }

    #[test]
    fn test_decode_rgba32_halves() {
        let mut tmem = [0u8; TMEM_SIZE];
        tmem[0..2].copy_from_slice(&[0x11, 0x22]);
        tmem[0x800..0x802].copy_from_slice(&[0x33, 0x44]);
        let mut out = vec![0u32; 1];
        decode(&tmem, &[0; 256], &layout(0, 3, 8), 1, 1, &mut out, 1);
        assert_eq!(out[0], 0x1122_3344);
    }

    #[test]
    fn test_modify_palette() {
        let mut palette = [0u16; 256];
        palette[1] = 0xFFFF;
        let out = modify_palette(&palette, |p| {
            for c in p.iter_mut() {
                *c &= 0xFF00_00FF;
            }
        });
        assert_eq!(out[1], 0xF801);
        assert_eq!(out[0], 0);
    }
}
