//! Register setters and the two rectangle primitives.

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::Addressable;
use crate::backend::{Backend, ClearTarget, PrimitiveKind, Rect, Vertex};
use crate::combine::{unpack_set_combine, BlendMode};

use super::{CiStatus, Rdp, UPDATE_BLEND, UPDATE_COMBINE, UPDATE_SCISSOR, UPDATE_TEXTURE};

// fill colors for 16-bit color images are RGBA5551 in the low half
fn fill_color_to_rgba(color: u32, ci_size: u8) -> u32 {
    if ci_size >= 3 {
        return color;
    }
    let channel = |v: u32| -> u32 { ((v as f32 / 31.0) * 255.0) as u32 };
    (if (color & 1) != 0 { 0xFF } else { 0 })
        | (channel((color & 0xF800) >> 11) << 24)
        | (channel((color & 0x07C0) >> 6) << 16)
        | (channel((color & 0x003E) >> 1) << 8)
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct Span {
    lo: f32,
    hi: f32,
    // texture coordinates at lo and hi, per texel
    tex: [(f32, f32); 2],
}

/// Clip a screen span to [min, max], interpolating the texture coordinates along.
/// None when nothing is left.
fn clip_span(mut span: Span, min: f32, max: f32) -> Option<Span> {
    if span.lo > span.hi || span.hi < min || span.lo > max {
        return None;
    }

    let len = span.hi - span.lo;
    if span.lo < min {
        let p = (min - span.lo) / len;
        for t in span.tex.iter_mut() {
            t.0 += p * (t.1 - t.0);
        }
        span.lo = min;
    }

    if span.hi > max {
        // measured from the original start, which may have moved
        let start = span.lo;
        let p = (max - start) / (span.hi - start);
        for t in span.tex.iter_mut() {
            t.1 = t.0 + p * (t.1 - t.0);
        }
        span.hi = max;
    }

    Some(span)
}

// 11.5 texture coordinate with the 16-bit overflow cut off
fn sign16(v: i32) -> i32 {
    (v & 0xFFFF) as i16 as i32
}

// tile shift as applied to texture coordinates: (scaled coordinate, scale factor)
fn apply_shift(v: i32, shift: u8) -> (i32, f32) {
    match shift {
        0 => (v, 1.0),
        s if s > 10 => {
            let s = 16 - s as u32;
            (v.wrapping_shl(s), (1u32 << s) as f32)
        },
        s => (v >> s, 1.0 / (1u32 << s) as f32),
    }
}

impl<B: Backend> Rdp<B> {
    pub(super) fn handle_setkeygb(&mut self) { // G_SETKEYGB
        let sb = self.cmd1 & 0xFF;
        let cb = (self.cmd1 >> 8) & 0xFF;
        let sg = (self.cmd1 >> 16) & 0xFF;
        let cg = (self.cmd1 >> 24) & 0xFF;
        trace!(target: "RDP", "{} gsDPSetKeyGB({}, {}, {}, {})", self.command_prefix, cg, sg, cb, sb);

        self.key_scale = (self.key_scale & 0xFF00_00FF) | (sg << 16) | (sb << 8);
        self.key_center = (self.key_center & 0xFF00_00FF) | (cg << 16) | (cb << 8);
        self.update |= UPDATE_COMBINE;
    }

    pub(super) fn handle_setkeyr(&mut self) { // G_SETKEYR
        let sr = self.cmd1 & 0xFF;
        let cr = (self.cmd1 >> 8) & 0xFF;
        trace!(target: "RDP", "{} gsDPSetKeyR({}, {})", self.command_prefix, cr, sr);

        self.key_scale = (self.key_scale & 0x00FF_FFFF) | (sr << 24);
        self.key_center = (self.key_center & 0x00FF_FFFF) | (cr << 24);
        self.update |= UPDATE_COMBINE;
    }

    pub(super) fn handle_setconvert(&mut self) { // G_SETCONVERT
        // only the low 8 bits of the 9-bit coefficients are kept
        self.k4 = ((self.cmd1 >> 9) & 0x1FF) as u8;
        self.k5 = (self.cmd1 & 0x1FF) as u8;
        trace!(target: "RDP", "{} gsDPSetConvert(.., k4={}, k5={})", self.command_prefix, self.k4, self.k5);
        self.update |= UPDATE_COMBINE;
    }

    pub(super) fn handle_setscissor(&mut self) { // G_SETSCISSOR
        self.scissor_o = Rect {
            ul_x: (self.cmd0 & 0x00FF_F000) >> 14,
            ul_y: (self.cmd0 & 0x0000_0FFF) >> 2,
            lr_x: (self.cmd1 & 0x00FF_F000) >> 14,
            lr_y: (self.cmd1 & 0x0000_0FFF) >> 2,
        };
        trace!(target: "RDP", "{} gsDPSetScissor(G_SC_NON_INTERLACE, {}, {}, {}, {})", self.command_prefix,
               self.scissor_o.ul_x, self.scissor_o.ul_y, self.scissor_o.lr_x, self.scissor_o.lr_y);

        self.ci_upper_bound = self.scissor_o.ul_y;
        self.ci_lower_bound = self.scissor_o.lr_y;
        self.scissor_set = true;
        self.update |= UPDATE_SCISSOR;
    }

    pub(super) fn handle_setprimdepth(&mut self) { // G_SETPRIMDEPTH
        self.prim_depth = ((self.cmd1 >> 16) & 0x7FFF) as u16;
        self.prim_dz = (self.cmd1 & 0x7FFF) as u16;
        trace!(target: "RDP", "{} gsDPSetPrimDepth({}, {})", self.command_prefix, self.prim_depth, self.prim_dz);
    }

    pub(super) fn handle_setfillcolor(&mut self) { // G_SETFILLCOLOR
        trace!(target: "RDP", "{} gsDPSetFillColor(0x{:08X})", self.command_prefix, self.cmd1);
        self.fill_color = self.cmd1;
        self.update |= UPDATE_COMBINE;
    }

    pub(super) fn handle_setfogcolor(&mut self) { // G_SETFOGCOLOR
        trace!(target: "RDP", "{} gsDPSetFogColor(0x{:08X})", self.command_prefix, self.cmd1);
        self.fog_color = self.cmd1;
        self.update |= UPDATE_COMBINE | UPDATE_BLEND;
    }

    pub(super) fn handle_setblendcolor(&mut self) { // G_SETBLENDCOLOR
        trace!(target: "RDP", "{} gsDPSetBlendColor(0x{:08X})", self.command_prefix, self.cmd1);
        self.blend_color = self.cmd1;
        // alpha compare threshold lives in the blend color
        self.update |= UPDATE_COMBINE | UPDATE_BLEND;
    }

    pub(super) fn handle_setprimcolor(&mut self) { // G_SETPRIMCOLOR
        self.prim_color = self.cmd1;
        self.prim_lodmin = ((self.cmd0 >> 8) & 0xFF) as u8;
        self.prim_lodfrac = ((self.cmd0 & 0xFF) as u8).max(self.prim_lodmin);
        trace!(target: "RDP", "{} gsDPSetPrimColor({}, {}, 0x{:08X})", self.command_prefix, self.prim_lodmin, self.prim_lodfrac, self.cmd1);
        self.update |= UPDATE_COMBINE;
    }

    pub(super) fn handle_setenvcolor(&mut self) { // G_SETENVCOLOR
        trace!(target: "RDP", "{} gsDPSetEnvColor(0x{:08X})", self.command_prefix, self.cmd1);
        self.env_color = self.cmd1;
        self.update |= UPDATE_COMBINE;
    }

    pub(super) fn handle_setcombine(&mut self) { // G_SETCOMBINE
        let (cycle1, cycle2) = unpack_set_combine(self.cmd0, self.cmd1);
        trace!(target: "RDP", "{} gsDPSetCombineLERP(0x{:06X}, 0x{:08X})", self.command_prefix, self.cmd0 & 0x00FF_FFFF, self.cmd1);
        self.cycle1 = cycle1;
        self.cycle2 = cycle2;
        self.update |= UPDATE_COMBINE;
    }

    fn current_fb_status(&self) -> Option<CiStatus> {
        if !self.settings.fb_emulation || self.fb.ci_count == 0 {
            return None;
        }
        self.fb.frame_buffers.get(self.fb.ci_count - 1).map(|f| f.status)
    }

    // depth used for sprites and rectangles
    fn sprite_depth(&self) -> f32 {
        if (self.othermode_l & 0x04) != 0 {
            self.prim_depth as f32 / 32767.0
        } else {
            0.0
        }
    }

    pub(super) fn handle_fillrect(&mut self) { // G_FILLRECT
        let mut ul_x = (self.cmd1 & 0x00FF_F000) >> 14;
        let mut ul_y = (self.cmd1 & 0x0000_0FFF) >> 2;
        let mut lr_x = ((self.cmd0 & 0x00FF_F000) >> 14) + 1;
        let mut lr_y = ((self.cmd0 & 0x0000_0FFF) >> 2) + 1;
        trace!(target: "RDP", "{} gsDPFillRectangle({}, {}, {}, {})", self.command_prefix, ul_x, ul_y, lr_x, lr_y);

        if ul_x > lr_x || ul_y > lr_y {
            debug!(target: "RDP", "fill rectangle with inverted corners skipped");
            return;
        }

        if self.fb.cimg == self.fb.zimg || self.current_fb_status() == Some(CiStatus::Zimg) {
            debug!(target: "RDP", "fill rectangle clears the depth buffer at ${:08X}", self.fb.cimg);
            self.update_scissor();
            let depth = if self.fill_color != 0 { (self.fill_color & 0xFFFF) as u16 } else { 0xFFFF };
            self.backend.clear(ClearTarget::Depth(depth), self.scissor);

            // the game may read its depth buffer back, so clear it in RDRAM too
            let clamp = |v: u32, lo: u32, hi: u32| v.max(lo).min(hi);
            ul_x = clamp(ul_x, self.scissor_o.ul_x, self.scissor_o.lr_x) >> 1;
            lr_x = clamp(lr_x, self.scissor_o.ul_x, self.scissor_o.lr_x) >> 1;
            ul_y = clamp(ul_y, self.scissor_o.ul_y, self.scissor_o.lr_y);
            lr_y = clamp(lr_y, self.scissor_o.ul_y, self.scissor_o.lr_y);

            let words_per_row = self.fb.ci_width >> 1;
            for y in ul_y..lr_y {
                let row = self.fb.cimg as usize + (y * words_per_row) as usize * 4;
                for x in ul_x..lr_x {
                    self.rdram.write_u32(self.fill_color, row + x as usize * 4);
                }
            }
            return;
        }

        if self.fb.skip_drawing {
            trace!(target: "RDP", "fill rectangle skipped");
            return;
        }

        // filling a whole non RGBA auxiliary image
        if self.cycle_mode == 3 && self.settings.fb_emulation && self.fb.ci_count > 0 {
            if let Some(cur) = self.fb.frame_buffers.get(self.fb.ci_count - 1) {
                if cur.format != 0 && cur.width == lr_x - ul_x && cur.height == lr_y - ul_y {
                    let color = fill_color_to_rgba(self.fill_color, self.fb.ci_size);
                    self.update_scissor();
                    self.backend.clear(ClearTarget::Color(color), self.scissor);
                    return;
                }
            }
        }

        self.update_state();
        if self.halt {
            return;
        }

        if self.settings.decrease_fillrect_edge && self.cycle_mode == 0 {
            lr_x -= 1;
            lr_y -= 1;
        }

        let s = self.scissor;
        let scale = |v: u32, sc: f32, off: f32, lo: u32, hi: u32| -> f32 {
            (v as f32 * sc + off + 0.01).max(lo as f32).min(hi as f32).floor()
        };
        let s_ul_x = scale(ul_x, self.scale_x, self.offset_x, s.ul_x, s.lr_x);
        let s_lr_x = scale(lr_x, self.scale_x, self.offset_x, s.ul_x, s.lr_x);
        let s_ul_y = scale(ul_y, self.scale_y, self.offset_y, s.ul_y, s.lr_y);
        let s_lr_y = scale(lr_y, self.scale_y, self.offset_y, s.ul_y, s.lr_y);

        if self.cycle_mode == 3 {
            let color = fill_color_to_rgba(self.fill_color, self.fb.ci_size);
            let rect = Rect { ul_x: s_ul_x as u32, ul_y: s_ul_y as u32, lr_x: s_lr_x as u32, lr_y: s_lr_y as u32 };
            trace!(target: "RDP", "fill ({},{}) -> ({},{}) with ${:08X}", rect.ul_x, rect.ul_y, rect.lr_x, rect.lr_y, color);
            self.backend.clear(ClearTarget::Color(color), rect);
            return;
        }

        let z = self.sprite_depth();
        let corner = |x: f32, y: f32| Vertex { x: x, y: y, z: z, q: 1.0, color: [0xFF; 4], ..Default::default() };
        let v = [corner(s_ul_x, s_ul_y), corner(s_lr_x, s_ul_y), corner(s_ul_x, s_lr_y), corner(s_lr_x, s_lr_y)];
        self.backend.draw(PrimitiveKind::Triangles, &[v[0], v[2], v[1], v[2], v[3], v[1]]);
    }

    /// Fetch the two words following a texture rectangle. High level lists carry them in
    /// RDPHALF commands or as a bare second command.
    pub(super) fn fetch_texrect_words(&mut self) {
        if self.lle_mode {
            self.cmd2 = self.command_words.get(2).copied().unwrap_or(0);
            self.cmd3 = self.command_words.get(3).copied().unwrap_or(0);
            return;
        }

        let mask = self.rdram.mask();
        let a = self.pc[self.pc_i] & mask;
        let half_1 = self.rdram.read_u8(a as usize);
        let half_2 = self.rdram.read_u8(((a + 8) & mask) as usize);

        match (half_1, half_2) {
            (0xE1, 0xF1) | (0xB4, 0xB3) | (0xB3, 0xB2) => {
                self.cmd2 = self.rdram.read_u32(((a + 4) & mask) as usize);
                self.cmd3 = self.rdram.read_u32(((a + 12) & mask) as usize);
                self.pc[self.pc_i] = (a + 16) & mask;
            },
            _ => {
                self.cmd2 = self.rdram.read_u32(a as usize);
                self.cmd3 = self.rdram.read_u32(((a + 4) & mask) as usize);
                self.pc[self.pc_i] = (a + 8) & mask;
            },
        };
    }

    pub(super) fn handle_lite_texrect(&mut self) {
        self.fetch_texrect_words();
    }

    pub(super) fn handle_texrect(&mut self) { // G_TEXRECT / G_TEXRECTFLIP
        self.fetch_texrect_words();
        let flip = (self.cmd0 >> 24) == 0xE5 || (self.cmd0 >> 24) == 0x25;

        trace!(target: "RDP", "{} gsSPTextureRectangle{}(.., 0x{:08X}, 0x{:08X})", self.command_prefix,
               if flip { "Flip" } else { "" }, self.cmd2, self.cmd3);

        if self.fb.skip_drawing || (!self.settings.fb_emulation && self.fb.cimg == self.fb.zimg) {
            trace!(target: "RDP", "texture rectangle skipped");
            return;
        }

        let coord = |v: u32, copy: bool| -> f32 {
            let v = (v & 0xFFF) as i16;
            if copy { (v >> 2).max(0) as f32 } else { (v as f32 / 4.0).max(0.0) }
        };
        let copy = self.cycle_mode == 2;
        let ul_x = coord(self.cmd1 >> 12, copy);
        let ul_y = coord(self.cmd1, copy);
        let mut lr_x = coord(self.cmd0 >> 12, copy);
        let mut lr_y = coord(self.cmd0, copy);

        if ul_x >= lr_x {
            debug!(target: "RDP", "texture rectangle with ul_x {} >= lr_x {} skipped", ul_x, lr_x);
            return;
        }

        if self.cycle_mode > 1 {
            lr_x += 1.0;
            lr_y += 1.0;
        } else if lr_y - ul_y < 1.0 {
            lr_y = lr_y.ceil();
        }

        let tile = ((self.cmd1 >> 24) & 0x07) as usize;
        let prev_tile = self.cur_tile;
        if self.cur_tile != tile {
            self.cur_tile = tile;
            self.update |= UPDATE_TEXTURE;
        }

        self.update_state();
        if self.halt {
            self.cur_tile = prev_tile;
            return;
        }

        if (self.tex & 1) != 0 && self.cur_cache[0].is_none() {
            debug!(target: "RDP", "texture rectangle without a texture skipped");
            self.cur_tile = prev_tile;
            return;
        }

        let off_x = sign16((self.cmd2 >> 16) as i32);
        let off_y = sign16((self.cmd2 & 0xFFFF) as i32);
        let mut dsdx = ((self.cmd3 >> 16) as i16) as f32 / 1024.0;
        let dtdy = (self.cmd3 as i16) as f32 / 1024.0;
        if copy {
            dsdx /= 4.0;
        }

        let (off_size_x, off_size_y) = if flip {
            ((lr_y - ul_y - 1.0) * dsdx, (lr_x - ul_x - 1.0) * dtdy)
        } else {
            ((lr_x - ul_x - 1.0) * dsdx, (lr_y - ul_y - 1.0) * dtdy)
        };

        // (ul, lr) texture coordinates per texel, u then v
        let mut u = [(0.0f32, 0.0f32); 2];
        let mut v = [(0.0f32, 0.0f32); 2];
        for i in 0..2 {
            let entry = match self.cur_cache[i].and_then(|index| self.cache.entry(index)) {
                Some(entry) if (self.tex & (1 << i)) != 0 => entry,
                _ => continue,
            };
            let t = &self.tiles[(self.cur_tile + i) & 7];

            let (x_i, sx) = apply_shift(off_x, t.shift_s);
            let (y_i, sy) = apply_shift(off_y, t.shift_t);

            let ul_u = sign16(x_i) as f32 / 32.0 - t.f_ul_s;
            let ul_v = sign16(y_i) as f32 / 32.0 - t.f_ul_t;
            let lr_u = ul_u + off_size_x * sx;
            let lr_v = ul_v + off_size_y * sy;

            u[i] = (entry.c_off + entry.c_scl_x * ul_u, entry.c_off + entry.c_scl_x * lr_u);
            v[i] = (entry.c_off + entry.c_scl_y * ul_v, entry.c_off + entry.c_scl_y * lr_v);
        }
        self.cur_tile = prev_tile;

        let s = self.scissor;
        let xs = Span { lo: ul_x * self.scale_x + self.offset_x, hi: lr_x * self.scale_x + self.offset_x, tex: u };
        let ys = Span { lo: ul_y * self.scale_y + self.offset_y, hi: lr_y * self.scale_y + self.offset_y, tex: v };
        let (xs, ys) = match (clip_span(xs, s.ul_x as f32, s.lr_x as f32), clip_span(ys, s.ul_y as f32, s.lr_y as f32)) {
            (Some(xs), Some(ys)) => (xs, ys),
            _ => {
                trace!(target: "RDP", "texture rectangle outside of the scissor");
                return;
            },
        };

        let fog = match self.blend.map(|b| b.mode) {
            Some(BlendMode::Fog) => 1.0 / (self.fog_color & 0xFF).max(1) as f32,
            _ => 0.0,
        };

        let z = self.sprite_depth();
        // which end of each texture axis a corner takes
        let corner = |x: f32, y: f32, right: bool, bottom: bool| {
            let (right, bottom) = if flip { (bottom, right) } else { (right, bottom) };
            let pick = |t: (f32, f32), hi: bool| if hi { t.1 } else { t.0 };
            Vertex {
                x    : x,
                y    : y,
                z    : z,
                q    : 1.0,
                u0   : pick(xs.tex[0], right),
                v0   : pick(ys.tex[0], bottom),
                u1   : pick(xs.tex[1], right),
                v1   : pick(ys.tex[1], bottom),
                color: [0xFF; 4],
                fog  : fog,
            }
        };

        let vertices = [
            corner(xs.lo, ys.lo, false, false),
            corner(xs.hi, ys.lo, true, false),
            corner(xs.lo, ys.hi, false, true),
            corner(xs.hi, ys.hi, true, true),
        ];

        trace!(target: "RDP", "texture rectangle ({:.2},{:.2}) -> ({:.2},{:.2}), tile {}", xs.lo, ys.lo, xs.hi, ys.hi, tile);
        self.backend.draw(PrimitiveKind::TriangleStrip, &vertices);
    }
}
