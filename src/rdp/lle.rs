//! The low level path: raw RDP command streams pointed at by the DPC registers, and the
//! triangle commands that high level lists embed with RDPHALF_1.

use std::sync::atomic::Ordering;

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::{Addressable, GfxError, DPC_STATUS_FREEZE, DPC_STATUS_XBUS_DMEM_DMA};
use crate::backend::{Backend, PrimitiveKind, Vertex};

use super::{Rdp, RdpCommand};
use super::triangle::{self, shift_factor, TriangleKind};

/// Most command words held between calls to `process_rdp_list`
pub const LLE_BUFFER_WORDS: usize = 0x1000;

/// Size of every RDP command in 32-bit words, by the low six opcode bits
pub const LENGTH_TABLE: [u32; 64] = {
    let mut table = [2u32; 64];
    table[0x08] = 8;  // fill triangle
    table[0x09] = 12; //   + z
    table[0x0A] = 24; // textured
    table[0x0B] = 28; //   + z
    table[0x0C] = 24; // shaded
    table[0x0D] = 28; //   + z
    table[0x0E] = 40; // shaded and textured
    table[0x0F] = 44; //   + z
    table[0x24] = 4;  // texture rectangle
    table[0x25] = 4;  // flipped
    table
};

// the longest command RDPHALF_1 can gather, plus the terminating word
const MAX_EMBEDDED_WORDS: usize = 46;

impl<B: Backend> Rdp<B> {
    pub(super) fn install_lle_table(&mut self) {
        let mut table: [RdpCommand<B>; 64] = [Self::handle_lle_undefined; 64];

        table[0x00] = Self::handle_spnoop;
        for op in 0x08..=0x0F {
            table[op] = Self::handle_lle_triangle;
        }
        table[0x24] = Self::handle_texrect;
        table[0x25] = Self::handle_texrect;
        table[0x26] = Self::handle_loadsync;
        table[0x27] = Self::handle_pipesync;
        table[0x28] = Self::handle_tilesync;
        table[0x29] = Self::handle_fullsync;
        table[0x2A] = Self::handle_setkeygb;
        table[0x2B] = Self::handle_setkeyr;
        table[0x2C] = Self::handle_setconvert;
        table[0x2D] = Self::handle_setscissor;
        table[0x2E] = Self::handle_setprimdepth;
        table[0x2F] = Self::handle_rdpsetothermode;
        table[0x30] = Self::handle_loadtlut;
        table[0x32] = Self::handle_settilesize;
        table[0x33] = Self::handle_loadblock;
        table[0x34] = Self::handle_loadtile;
        table[0x35] = Self::handle_settile;
        table[0x36] = Self::handle_fillrect;
        table[0x37] = Self::handle_setfillcolor;
        table[0x38] = Self::handle_setfogcolor;
        table[0x39] = Self::handle_setblendcolor;
        table[0x3A] = Self::handle_setprimcolor;
        table[0x3B] = Self::handle_setenvcolor;
        table[0x3C] = Self::handle_setcombine;
        table[0x3D] = Self::handle_settextureimage;
        table[0x3E] = Self::handle_setdepthimage;
        table[0x3F] = Self::handle_setcolorimage;

        self.lle_table = table;
    }

    pub(super) fn handle_lle_undefined(&mut self) {
        warn!(target: "LLE", "{} undefined RDP command ${:02X} skipped", self.command_prefix, (self.cmd0 >> 24) & 0x3F);
    }

    /// Execute the RDP commands between DPC_CURRENT and DPC_END. A command whose words
    /// haven't all arrived yet stays buffered until the next call.
    pub fn process_rdp_list(&mut self) -> Result<(), GfxError> {
        self.refresh_settings();
        self.fault = None;

        let current = self.comms.dpc_current.load(Ordering::SeqCst);
        let end = self.comms.dpc_end.load(Ordering::SeqCst);
        let status = self.comms.dpc_status.load(Ordering::SeqCst);

        if end <= current {
            trace!(target: "LLE", "no new commands (current ${:08X}, end ${:08X})", current, end);
            return Ok(());
        }

        let from_dmem = (status & DPC_STATUS_XBUS_DMEM_DMA) != 0;
        debug!(target: "LLE", "RDP commands ${:08X}..${:08X} from {}", current, end, if from_dmem { "DMEM" } else { "RDRAM" });

        self.comms.dpc_current.store(end, Ordering::SeqCst);
        self.lle_mode = true;
        self.halt = false;

        // fetch at most a buffer's worth at a time, running what arrived before fetching more
        let mask = self.rdram.mask();
        let mut addr = current;
        while addr < end && self.fault.is_none() {
            let room = LLE_BUFFER_WORDS.saturating_sub(self.lle_buffer.len());
            if room == 0 {
                warn!(target: "LLE", "command buffer full, dropping {} words at ${:08X}", (end - addr + 3) / 4, addr);
                self.lle_buffer.clear();
                break;
            }

            let base = addr.wrapping_sub(4 * self.lle_buffer.len() as u32);
            let chunk_end = end.min(addr.saturating_add(4 * room as u32));
            if chunk_end < end {
                debug!(target: "LLE", "{} words pending, running ${:08X}..${:08X} first", (end - addr) / 4, addr, chunk_end);
            }
            for a in (addr..chunk_end).step_by(4) {
                let word = if from_dmem {
                    self.dmem.read_u32((a & 0xFFF) as usize)
                } else {
                    self.rdram.read_u32((a & mask) as usize)
                };
                self.lle_buffer.push(word);
            }
            addr = chunk_end;

            let cur = self.run_lle_buffer(base);
            self.lle_buffer.drain(..cur);
        }
        self.lle_mode = false;

        self.comms.dpc_start.store(end, Ordering::SeqCst);
        self.comms.dpc_status.fetch_and(!DPC_STATUS_FREEZE, Ordering::SeqCst);

        match self.fault.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // executes the complete commands at the front of lle_buffer, returning the words used
    fn run_lle_buffer(&mut self, base: u32) -> usize {
        let mut cur = 0;
        while cur < self.lle_buffer.len() {
            let op = ((self.lle_buffer[cur] >> 24) & 0x3F) as usize;
            let length = LENGTH_TABLE[op] as usize;
            if self.lle_buffer.len() - cur < length {
                debug!(target: "LLE", "command ${:02X} incomplete ({} of {} words), waiting for the rest", op, self.lle_buffer.len() - cur, length);
                break;
            }

            self.command_words.clear();
            self.command_words.extend_from_slice(&self.lle_buffer[cur..cur + length]);
            self.cmd0 = self.command_words[0];
            self.cmd1 = self.command_words[1];
            self.cmd2 = self.command_words.get(2).copied().unwrap_or(0);
            self.cmd3 = self.command_words.get(3).copied().unwrap_or(0);
            self.command_address = base.wrapping_add(4 * cur as u32);
            cur += length;

            self.update_command_prefix();
            if self.tweakables.trace_commands {
                debug!(target: "LLE", "{}", self.command_prefix);
            }
            (self.lle_table[op])(self);

            if self.fault.is_some() {
                break;
            }
        }
        cur
    }

    pub(super) fn handle_rdphalf_1(&mut self) { // G_RDPHALF_1
        let op = self.cmd1 >> 24;
        if !(0xC8..=0xCF).contains(&op) {
            trace!(target: "DL", "{} gsDPHalf1(0x{:08X})", self.command_prefix, self.cmd1);
            self.half_1 = self.cmd1;
            return;
        }

        // the rest of the command follows as RDPHALF_CONT words, RDPHALF_2 has the last one
        let terminator = if self.microcode.is_f3dex2_family() { 0xF1 } else { 0xB3 };
        let mask = self.rdram.mask();
        let mut words = Vec::with_capacity(MAX_EMBEDDED_WORDS);

        loop {
            words.push(self.cmd1);

            if self.dl_count != -1 {
                self.dl_count -= 1;
                if self.dl_count == 0 {
                    self.dl_count = -1;
                    self.pc_i = self.pc_i.saturating_sub(1);
                }
            }

            let a = self.pc[self.pc_i] & mask;
            self.cmd0 = self.rdram.read_u32(a as usize);
            self.cmd1 = self.rdram.read_u32(((a + 4) & mask) as usize);
            self.pc[self.pc_i] = (a + 8) & mask;

            if (self.cmd0 >> 24) == terminator {
                break;
            }

            if words.len() >= MAX_EMBEDDED_WORDS {
                warn!(target: "DL", "{} embedded RDP command longer than {} words, dropped", self.command_prefix, MAX_EMBEDDED_WORDS);
                return;
            }
        }
        words.push(self.cmd1);

        trace!(target: "DL", "{} embedded RDP command ${:02X}, {} words", self.command_prefix, op & 0x3F, words.len());
        if self.fb.detecting {
            return;
        }

        let lle_op = ((words[0] >> 24) & 0x3F) as usize;
        self.cmd0 = words[0];
        self.cmd1 = words[1];
        self.command_words = words;

        let lle_mode = self.lle_mode;
        self.lle_mode = true;
        (self.lle_table[lle_op])(self);
        self.lle_mode = lle_mode;
    }

    fn handle_lle_triangle(&mut self) {
        let op = (self.cmd0 >> 24) & 0x3F;
        let kind = TriangleKind::from_opcode(op);
        self.cur_tile = ((self.cmd0 >> 16) & 0x07) as usize;
        trace!(target: "LLE", "{} triangle ${:02X} ({:?}), tile {}", self.command_prefix, op, kind, self.cur_tile);

        let prim_depth = if (self.othermode_l & 0x04) != 0 {
            Some(self.prim_depth as f32 / 32767.0)
        } else {
            None
        };
        let edges = triangle::walk(&self.command_words, kind, self.persp_en, prim_depth);
        if edges.len() < 3 {
            trace!(target: "LLE", "degenerate triangle skipped");
            return;
        }

        self.update_state();
        if self.halt {
            return;
        }

        // texture coordinate transform per texel: shift scale, tile origin, cache entry
        let mut texel = [None; 2];
        for i in 0..2 {
            if (self.tex & (1 << i)) == 0 {
                continue;
            }
            if let Some(entry) = self.cur_cache[i].and_then(|index| self.cache.entry(index)) {
                let t = &self.tiles[(self.cur_tile + i) & 7];
                texel[i] = Some((shift_factor(t.shift_s), shift_factor(t.shift_t), t.f_ul_s, t.f_ul_t,
                                 entry.c_off, entry.c_scl_x, entry.c_scl_y));
            }
        }

        let vertices: Vec<Vertex> = edges.iter().map(|e| {
            let mut uv = [(e.s, e.t); 2];
            for i in 0..2 {
                if let Some((sx, sy, ul_s, ul_t, c_off, c_scl_x, c_scl_y)) = texel[i] {
                    let s = e.s * sx - ul_s;
                    let t = e.t * sy - ul_t;
                    uv[i] = ((c_off + c_scl_x * s) / e.w, (c_off + c_scl_y * t) / e.w);
                }
            }

            Vertex {
                x    : e.x * self.scale_x + self.offset_x,
                y    : e.y * self.scale_y + self.offset_y,
                z    : e.z,
                q    : 1.0 / e.w,
                u0   : uv[0].0,
                v0   : uv[0].1,
                u1   : uv[1].0,
                v1   : uv[1].1,
                color: e.color,
                fog  : 0.0,
            }
        }).collect();

        self.backend.draw(PrimitiveKind::TriangleStrip, &vertices);
    }
}
