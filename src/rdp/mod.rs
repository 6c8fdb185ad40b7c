//! The display list interpreter. `Rdp` owns every piece of emulated RDP state (tiles, TMEM,
//! color and depth images, the texture cache) and walks display lists in RDRAM through a
//! command table selected by the microcode in use.

use std::sync::atomic::Ordering;

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::*;
use crate::backend::{Backend, CommandBufferBackend, Rect, Surface};
use crate::combine::BlendState;
use crate::texcache::{CacheStats, TextureCache, TMEM_SIZE};
use crate::texcache::modifier::TexModifier;

mod commands;
mod framebuffer;
mod lle;
mod state;
mod tiles;
mod triangle;

pub use framebuffer::{CiStatus, ColorImage, FrameBufferInfo};
pub use tiles::{TextureImage, Tile};

use framebuffer::{CpuFbTracking, FrameBufferState};
use tiles::TexShift;

// what needs to be sent to the backend before the next draw
const UPDATE_TEXTURE: u32 = 0x0002;
const UPDATE_COMBINE: u32 = 0x0004;
const UPDATE_BLEND  : u32 = 0x0008;
const UPDATE_SCISSOR: u32 = 0x0010;
const UPDATE_ALL    : u32 = 0x7FFF_FFFF;

// display list call depth
const PC_STACK_SIZE: usize = 10;

type RdpCommand<B> = fn(&mut Rdp<B>);

pub struct Rdp<B: Backend = CommandBufferBackend> {
    comms: HostCommunication,
    settings: Settings,
    tweakables: Tweakables,

    rdram: Memory,
    dmem: Memory,
    backend: B,

    microcode: Microcode,
    old_ucode: Microcode,
    ucode_crc: u32,
    reset_pending: bool,
    persp_supported: bool,
    persp_en: bool,
    model_stack_size: u32,

    command_table: [RdpCommand<B>; 256],
    // used while classifying color images, before the real pass
    lite_table: [RdpCommand<B>; 256],
    lle_table: [RdpCommand<B>; 64],

    cmd0: u32,
    cmd1: u32,
    cmd2: u32,
    cmd3: u32,
    command_address: u32,
    command_prefix: String,
    // every word of the current low level command
    command_words: Vec<u32>,
    lle_mode: bool,
    lle_buffer: Vec<u32>,

    pc: [u32; PC_STACK_SIZE],
    pc_i: usize,
    dl_count: i32,
    halt: bool,
    segments: [u32; 16],
    half_1: u32,

    tiles: [Tile; 8],
    last_tile: usize,
    last_tile_size: usize,
    cur_tile: usize,
    tmem: Box<[u8; TMEM_SIZE]>,
    palette: [u16; 256],
    pal_8_crc: [u32; 16],
    pal_256_crc: u32,
    tlut_mode: u8,
    timg: TextureImage,
    // RDRAM address each TMEM line was last loaded from
    texture_addr: [u32; 512],
    wrong_tile: Option<usize>,
    texshift: TexShift,

    othermode_h: u32,
    othermode_l: u32,
    cycle_mode: u8,
    filter_mode: u8,
    cycle1: u32,
    cycle2: u32,
    prim_color: u32,
    env_color: u32,
    fog_color: u32,
    blend_color: u32,
    fill_color: u32,
    prim_lodmin: u8,
    prim_lodfrac: u8,
    key_center: u32,
    key_scale: u32,
    k4: u8,
    k5: u8,
    prim_depth: u16,
    prim_dz: u16,

    // scissor in console pixels and as sent to the backend
    scissor_o: Rect,
    scissor: Rect,
    scissor_set: bool,
    ci_upper_bound: u32,
    ci_lower_bound: u32,
    scale_x: f32,
    scale_y: f32,
    offset_x: f32,
    offset_y: f32,

    update: u32,
    // texels the current combiner samples, bit per tile
    tex: u8,
    modifier: Option<TexModifier>,
    blend: Option<BlendState>,

    fb: FrameBufferState,
    cpu_fb: CpuFbTracking,

    cache: TextureCache,
    cur_cache: [Option<usize>; 2],

    fault: Option<GfxError>,
}

impl<B: Backend> Rdp<B> {
    pub fn new(comms: HostCommunication, rdram: Memory, dmem: Memory, backend: B) -> Self {
        let settings = comms.settings();
        let tweakables = comms.tweakables();

        let mut rdp = Self {
            comms           : comms,
            settings        : settings,
            tweakables      : tweakables,

            rdram           : rdram,
            dmem            : dmem,
            backend         : backend,

            microcode       : Microcode::F3D,
            old_ucode       : Microcode::Unknown,
            ucode_crc       : 0,
            reset_pending   : true,
            persp_supported : true,
            persp_en        : true,
            model_stack_size: 32,

            command_table   : [Self::handle_undefined; 256],
            lite_table      : [Self::handle_lite_undefined; 256],
            lle_table       : [Self::handle_lle_undefined; 64],

            cmd0            : 0,
            cmd1            : 0,
            cmd2            : 0,
            cmd3            : 0,
            command_address : 0,
            command_prefix  : String::new(),
            command_words   : Vec::with_capacity(44),
            lle_mode        : false,
            lle_buffer      : vec![],

            pc              : [0; PC_STACK_SIZE],
            pc_i            : 0,
            dl_count        : -1,
            halt            : false,
            segments        : [0; 16],
            half_1          : 0,

            tiles           : [Tile::default(); 8],
            last_tile       : 0,
            last_tile_size  : 0,
            cur_tile        : 0,
            tmem            : Box::new([0u8; TMEM_SIZE]),
            palette         : [0; 256],
            pal_8_crc       : [0; 16],
            pal_256_crc     : 0,
            tlut_mode       : 0,
            timg            : TextureImage::default(),
            texture_addr    : [0; 512],
            wrong_tile      : None,
            texshift        : TexShift::default(),

            othermode_h     : 0,
            othermode_l     : 0,
            cycle_mode      : 2,
            filter_mode     : 0,
            cycle1          : 0,
            cycle2          : 0,
            prim_color      : 0,
            env_color       : 0,
            fog_color       : 0,
            blend_color     : 0,
            fill_color      : 0,
            prim_lodmin     : 0,
            prim_lodfrac    : 0,
            key_center      : 0,
            key_scale       : 0,
            k4              : 0,
            k5              : 0,
            prim_depth      : 0,
            prim_dz         : 0,

            scissor_o       : Rect::default(),
            scissor         : Rect::default(),
            scissor_set     : false,
            ci_upper_bound  : 0,
            ci_lower_bound  : 0,
            scale_x         : 1.0,
            scale_y         : 1.0,
            offset_x        : 0.0,
            offset_y        : 0.0,

            update          : 0,
            tex             : 0,
            modifier        : None,
            blend           : None,

            fb              : FrameBufferState::default(),
            cpu_fb          : CpuFbTracking::default(),

            cache           : TextureCache::new(settings.cache_capacity),
            cur_cache       : [None; 2],

            fault           : None,
        };

        rdp.install_command_table(Microcode::F3D);
        rdp.install_lle_table();
        rdp.reset();
        rdp
    }

    /// Put the RDP back into its power on state. The microcode is identified again on the
    /// next display list.
    pub fn reset(&mut self) {
        debug!(target: "RDP", "reset");

        self.scissor_o = Rect { ul_x: 0, ul_y: 0, lr_x: 320, lr_y: 240 };
        self.fb.vi_org_reg = self.comms.vi_origin.load(Ordering::SeqCst);
        self.cycle_mode = 2;
        self.update = UPDATE_SCISSOR | UPDATE_COMBINE | UPDATE_BLEND;
        self.fb.maincimg = [ColorImage { addr: 0x7FFF_FFFF, ..Default::default() }; 2];
        self.tiles = [Tile::default(); 8];
        self.wrong_tile = None;
        self.lle_buffer.clear();
        self.reset_pending = true;
    }

    pub fn rdram(&self) -> &Memory {
        &self.rdram
    }

    pub fn rdram_mut(&mut self) -> &mut Memory {
        &mut self.rdram
    }

    pub fn dmem_mut(&mut self) -> &mut Memory {
        &mut self.dmem
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn microcode(&self) -> Microcode {
        self.microcode
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // SEGMENTED address to physical
    fn segoffset(&self, so: u32) -> u32 {
        let mask = self.rdram.mask();
        self.segments[((so >> 24) & 0x0F) as usize].wrapping_add(so & mask) & mask
    }

    fn refresh_settings(&mut self) {
        self.settings = self.comms.settings();
        self.tweakables = self.comms.tweakables();
    }

    fn microcheck(&mut self) {
        let start = self.dmem.read_u32(0xFD0) & self.rdram.mask();
        let code = self.rdram.read_block(start as usize, 4096);
        self.ucode_crc = Microcode::checksum(&code);

        let ucode = self.settings.ucode_override.unwrap_or_else(|| Microcode::identify(self.ucode_crc));
        self.old_ucode = self.microcode;
        if ucode.is_known() {
            info!(target: "UCODE", "microcode at ${:08X} (crc ${:08X}) is {:?}", start, self.ucode_crc, ucode);
            self.install_command_table(ucode);
        } else {
            warn!(target: "UCODE", "unknown microcode crc ${:08X}, staying with {:?}", self.ucode_crc, self.microcode);
        }

        self.persp_supported = !Microcode::perspective_unsupported(self.ucode_crc);
    }

    fn install_command_table(&mut self, ucode: Microcode) {
        let mut table: [RdpCommand<B>; 256] = [Self::handle_undefined; 256];
        let mut defined = [false; 256];

        {
            let mut set = |op: usize, handler: RdpCommand<B>| {
                table[op] = handler;
                defined[op] = true;
            };

            // RDP commands
            set(0xE4, Self::handle_texrect);
            set(0xE5, Self::handle_texrect);
            set(0xE6, Self::handle_loadsync);
            set(0xE7, Self::handle_pipesync);
            set(0xE8, Self::handle_tilesync);
            set(0xE9, Self::handle_fullsync);
            set(0xEA, Self::handle_setkeygb);
            set(0xEB, Self::handle_setkeyr);
            set(0xEC, Self::handle_setconvert);
            set(0xED, Self::handle_setscissor);
            set(0xEE, Self::handle_setprimdepth);
            set(0xEF, Self::handle_rdpsetothermode);
            set(0xF0, Self::handle_loadtlut);
            set(0xF2, Self::handle_settilesize);
            set(0xF3, Self::handle_loadblock);
            set(0xF4, Self::handle_loadtile);
            set(0xF5, Self::handle_settile);
            set(0xF6, Self::handle_fillrect);
            set(0xF7, Self::handle_setfillcolor);
            set(0xF8, Self::handle_setfogcolor);
            set(0xF9, Self::handle_setblendcolor);
            set(0xFA, Self::handle_setprimcolor);
            set(0xFB, Self::handle_setenvcolor);
            set(0xFC, Self::handle_setcombine);
            set(0xFD, Self::handle_settextureimage);
            set(0xFE, Self::handle_setdepthimage);
            set(0xFF, Self::handle_setcolorimage);

            if ucode.is_f3dex2_family() {
                set(0x00, Self::handle_spnoop);
                for op in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDC, 0xDD] {
                    set(op, Self::handle_geometry);
                }
                set(0xDB, Self::handle_moveword);
                set(0xDE, Self::handle_displaylist);
                set(0xDF, Self::handle_enddl);
                set(0xE0, Self::handle_spnoop);
                set(0xE1, Self::handle_rdphalf_1);
                set(0xE2, Self::handle_setothermode_l);
                set(0xE3, Self::handle_setothermode_h);
                set(0xF1, Self::handle_rdphalf_2);
            } else {
                set(0x00, Self::handle_spnoop);
                for op in [0x01, 0x03, 0x04, 0xB1, 0xB5, 0xB6, 0xB7, 0xBB, 0xBD, 0xBE, 0xBF] {
                    set(op, Self::handle_geometry);
                }
                set(0x06, Self::handle_displaylist);
                set(0xB2, Self::handle_rdphalf_cont);
                set(0xB3, Self::handle_rdphalf_2);
                set(0xB4, Self::handle_rdphalf_1);
                set(0xB8, Self::handle_enddl);
                set(0xB9, Self::handle_setothermode_l);
                set(0xBA, Self::handle_setothermode_h);
                set(0xBC, Self::handle_moveword);
                set(0xC0, Self::handle_spnoop);

                match ucode {
                    Microcode::DiddyKong => {
                        set(0x02, Self::handle_texshift_table);
                        set(0x05, Self::handle_geometry);
                        set(0x07, Self::handle_dl_in_mem);
                    },
                    Microcode::S2DEX => {
                        // background and sprite objects
                        for op in [0x02, 0x05, 0xB0, 0xC1, 0xC2] {
                            set(op, Self::handle_geometry);
                        }
                    },
                    _ => {
                        set(0x02, Self::handle_geometry);
                    },
                };
            }
        }

        // during frame buffer detection only flow control and image bindings do anything
        let mut lite: [RdpCommand<B>; 256] = [Self::handle_lite_undefined; 256];
        for op in 0..256 {
            if defined[op] {
                lite[op] = Self::handle_lite_skip;
            }
        }
        for op in 0..256 {
            let handler = table[op] as usize;
            if handler == Self::handle_displaylist as RdpCommand<B> as usize
                || handler == Self::handle_enddl as RdpCommand<B> as usize
                || handler == Self::handle_moveword as RdpCommand<B> as usize
                || handler == Self::handle_dl_in_mem as RdpCommand<B> as usize
                || handler == Self::handle_rdphalf_1 as RdpCommand<B> as usize {
                lite[op] = table[op];
            }
        }
        lite[0xE4] = Self::handle_lite_texrect;
        lite[0xE5] = Self::handle_lite_texrect;
        lite[0xED] = Self::handle_lite_setscissor;
        lite[0xF6] = Self::handle_lite_fillrect;
        lite[0xFD] = Self::handle_lite_settextureimage;
        lite[0xFE] = Self::handle_lite_setdepthimage;
        lite[0xFF] = Self::handle_lite_setcolorimage;

        self.command_table = table;
        self.lite_table = lite;
        self.microcode = ucode;
    }

    /// Interpret the display list described by the task header in DMEM
    pub fn process_display_list(&mut self) -> Result<(), GfxError> {
        self.refresh_settings();
        self.fault = None;

        if self.reset_pending
            || (self.old_ucode == Microcode::S2DEX && self.microcode == Microcode::F3DEX)
            || self.settings.force_microcheck {
            self.reset_pending = false;
            self.microcheck();
        }

        if self.microcode == Microcode::Turbo3D {
            warn!(target: "DL", "Turbo3D display lists are not interpreted");
            self.comms.raise_dp_interrupt();
            return Ok(());
        }

        self.begin_list();

        let start = self.segoffset(self.dmem.read_u32(0xFF0));
        let length = self.dmem.read_u32(0xFF4);
        debug!(target: "DL", "display list at ${:08X}, {} bytes, ucode {:?}", start, length, self.microcode);

        self.pc_i = 0;
        self.pc[0] = start;
        self.dl_count = -1;
        self.halt = false;
        self.execute(false);

        self.end_list();

        match self.fault.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // per list state reset
    fn begin_list(&mut self) {
        let stack = self.dmem.read_u32(0xFE4) >> 6;
        self.model_stack_size = if stack == 0 { 32 } else { stack.min(32) };
        self.persp_en = self.persp_supported;

        self.fb.fb_drawn = false;
        self.fb.fb_drawn_front = false;
        self.update = UPDATE_ALL;
        self.fb.maincimg[1] = self.fb.maincimg[0];
        self.fb.skip_drawing = false;
        self.fb.swap_ok = self.settings.swap_mode > 0;

        let vi_origin = self.comms.vi_origin.load(Ordering::SeqCst);
        if self.fb.vi_org_reg != vi_origin {
            self.tlut_mode = 0;
        }

        self.scissor_set = false;
        self.texshift.clear();
        self.cpu_fb = CpuFbTracking::default();

        let vi_width = self.comms.vi_width.load(Ordering::SeqCst).max(1);
        let vi_height = self.comms.vi_height.load(Ordering::SeqCst).max(1);
        self.scale_x = self.settings.res_x as f32 / vi_width as f32;
        self.scale_y = self.settings.res_y as f32 / vi_height as f32;

        if self.cache.capacity() != self.settings.cache_capacity {
            self.cache.evict_all(&mut self.backend);
            self.cache = TextureCache::new(self.settings.cache_capacity);
            self.cur_cache = [None; 2];
        }

        if self.settings.fb_emulation {
            self.detect_frame_buffer_usage();
        }
    }

    fn end_list(&mut self) {
        if self.settings.fb_emulation {
            self.scale_x = self.fb.scale_bak.0;
            self.scale_y = self.fb.scale_bak.1;
        }

        if (self.settings.fb_emulation && self.cpu_fb.read_called) || self.settings.fb_copy_after_list {
            self.copy_frame_buffer(Surface::Back);
        }
    }

    // fetch, decode and execute until halted. `lite` runs the frame buffer detection table.
    fn execute(&mut self, lite: bool) {
        let mask = self.rdram.mask();

        while !self.halt {
            let a = self.pc[self.pc_i] & mask;
            self.cmd0 = self.rdram.read_u32(a as usize);
            self.cmd1 = self.rdram.read_u32((a + 4) as usize);
            self.command_address = a;
            self.pc[self.pc_i] = (a + 8) & mask;

            let op = (self.cmd0 >> 24) as usize;
            self.update_command_prefix();
            if lite {
                (self.lite_table[op])(self);
            } else {
                if self.tweakables.trace_commands {
                    debug!(target: "DL", "{}", self.command_prefix);
                }
                (self.command_table[op])(self);
            }

            if self.dl_count != -1 {
                self.dl_count -= 1;
                if self.dl_count == 0 {
                    self.dl_count = -1;
                    trace!(target: "DL", "end of counted display list");
                    self.pc_i = self.pc_i.saturating_sub(1);
                }
            }
        }
    }

    fn update_command_prefix(&mut self) {
        self.command_prefix.clear();
        if self.tweakables.trace_commands || tracing::enabled!(target: "RDP", tracing::Level::TRACE) {
            self.command_prefix = format!("${:08X}: ${:08X}_{:08X} [{}]:", self.command_address, self.cmd0, self.cmd1, self.pc_i);
        }
    }

    fn handle_undefined(&mut self) {
        warn!(target: "DL", "{} undefined opcode ${:02X}", self.command_prefix, self.cmd0 >> 24);
        if self.tweakables.ignore_undefined_opcodes {
            return;
        }

        self.comms.raise_dp_interrupt();
        self.halt = true;
    }

    // stops classification where the real pass will stop
    fn handle_lite_undefined(&mut self) {
        if self.tweakables.ignore_undefined_opcodes {
            return;
        }
        self.halt = true;
    }

    fn handle_lite_skip(&mut self) {}

    fn handle_spnoop(&mut self) { // G_SPNOOP
        trace!(target: "DL", "{} gsSPNoOp()", self.command_prefix);
    }

    fn handle_geometry(&mut self) {
        trace!(target: "DL", "{} geometry command ${:02X} ignored", self.command_prefix, self.cmd0 >> 24);
    }

    fn handle_displaylist(&mut self) { // G_DL
        let addr = self.segoffset(self.cmd1);
        let push = ((self.cmd0 >> 16) & 0xFF) == 0;

        if push {
            trace!(target: "DL", "{} gsSPDisplayList(0x{:08X} [0x{:08X}])", self.command_prefix, self.cmd1, addr);
            if self.pc_i >= PC_STACK_SIZE - 1 {
                warn!(target: "DL", "display list stack overflow, call to ${:08X} ignored", addr);
                return;
            }
            self.pc_i += 1;
        } else {
            trace!(target: "DL", "{} gsSPBranchList(0x{:08X} [0x{:08X}])", self.command_prefix, self.cmd1, addr);
        }

        self.pc[self.pc_i] = addr;
    }

    fn handle_enddl(&mut self) { // G_ENDDL
        trace!(target: "DL", "{} gsSPEndDisplayList()", self.command_prefix);
        if self.pc_i == 0 {
            self.halt = true;
        } else {
            self.pc_i -= 1;
        }
    }

    fn handle_dl_in_mem(&mut self) { // DKR G_DL_IN_MEM
        let addr = self.segoffset(self.cmd1);
        let count = (self.cmd0 >> 16) & 0xFF;
        trace!(target: "DL", "{} gsSPDisplayListInMem(0x{:08X}, {})", self.command_prefix, addr, count);

        if self.pc_i >= PC_STACK_SIZE - 1 {
            warn!(target: "DL", "display list stack overflow, call to ${:08X} ignored", addr);
            return;
        }

        self.pc_i += 1;
        self.pc[self.pc_i] = addr;
        // the countdown also runs for this command
        self.dl_count = count as i32 + 1;
    }

    fn handle_texshift_table(&mut self) { // DKR
        self.texshift.table = self.segoffset(self.cmd1);
        self.texshift.count = 0;
        trace!(target: "DL", "{} texture shift table at 0x{:08X}", self.command_prefix, self.texshift.table);
    }

    fn handle_moveword(&mut self) { // G_MOVEWORD
        let (index, offset) = if self.microcode.is_f3dex2_family() {
            ((self.cmd0 >> 16) & 0xFF, self.cmd0 & 0xFFFF)
        } else {
            (self.cmd0 & 0xFF, (self.cmd0 >> 8) & 0xFFFF)
        };

        match index {
            6 => { // G_MW_SEGMENT
                let segment = ((offset >> 2) & 0x0F) as usize;
                trace!(target: "DL", "{} gsSPSegment({}, 0x{:08X})", self.command_prefix, segment, self.cmd1);
                self.segments[segment] = self.cmd1 & self.rdram.mask();
            },

            _ => {
                trace!(target: "DL", "{} gsMoveWd({}, 0x{:04X}, 0x{:08X})", self.command_prefix, index, offset, self.cmd1);
            },
        };
    }

    fn othermode_mask(&self) -> (u32, u32) {
        let (shift, len) = if self.microcode.is_f3dex2_family() {
            let len = (self.cmd0 & 0xFF) + 1;
            (32u32.saturating_sub(((self.cmd0 >> 8) & 0xFF) + len), len)
        } else {
            ((self.cmd0 >> 8) & 0xFF, self.cmd0 & 0xFF)
        };

        let mask = (((1u64 << len.min(32)) - 1) << shift.min(31)) as u32;
        (shift, mask)
    }

    fn handle_setothermode_l(&mut self) { // G_SETOTHERMODE_L
        let (shift, mask) = self.othermode_mask();
        trace!(target: "DL", "{} gsSPSetOtherMode(G_SETOTHERMODE_L, {}, 0x{:08X})", self.command_prefix, shift, self.cmd1);
        self.set_othermode_l((self.othermode_l & !mask) | (self.cmd1 & mask));
    }

    fn handle_setothermode_h(&mut self) { // G_SETOTHERMODE_H
        let (shift, mask) = self.othermode_mask();
        trace!(target: "DL", "{} gsSPSetOtherMode(G_SETOTHERMODE_H, {}, 0x{:08X})", self.command_prefix, shift, self.cmd1);
        self.set_othermode_h((self.othermode_h & !mask) | (self.cmd1 & mask));
    }

    fn handle_rdpsetothermode(&mut self) { // G_RDPSETOTHERMODE
        trace!(target: "RDP", "{} gsDPSetOtherMode(0x{:06X}, 0x{:08X})", self.command_prefix, self.cmd0 & 0x00FF_FFFF, self.cmd1);
        self.set_othermode_h(self.cmd0 & 0x00FF_FFFF);
        self.set_othermode_l(self.cmd1);
    }

    fn set_othermode_h(&mut self, value: u32) {
        self.othermode_h = value;
        self.cycle_mode = ((value >> 20) & 0x03) as u8;
        self.filter_mode = ((value >> 12) & 0x03) as u8;
        self.tlut_mode = ((value >> 14) & 0x03) as u8;
        self.update |= UPDATE_COMBINE | UPDATE_TEXTURE | UPDATE_BLEND;
    }

    fn set_othermode_l(&mut self, value: u32) {
        self.othermode_l = value;
        self.update |= UPDATE_COMBINE | UPDATE_BLEND;
    }

    fn handle_rdphalf_2(&mut self) { // G_RDPHALF_2
        trace!(target: "DL", "{} gsDPHalf2(0x{:08X})", self.command_prefix, self.cmd1);
    }

    fn handle_rdphalf_cont(&mut self) { // G_RDPHALF_CONT
        trace!(target: "DL", "{} gsDPHalfCont(0x{:08X})", self.command_prefix, self.cmd1);
    }

    fn handle_loadsync(&mut self) { // G_RDPLOADSYNC
        trace!(target: "RDP", "{} gsDPLoadSync()", self.command_prefix);
    }

    fn handle_pipesync(&mut self) { // G_RDPPIPESYNC
        trace!(target: "RDP", "{} gsDPPipeSync()", self.command_prefix);
    }

    fn handle_tilesync(&mut self) { // G_RDPTILESYNC
        trace!(target: "RDP", "{} gsDPTileSync()", self.command_prefix);
    }

    fn handle_fullsync(&mut self) { // G_RDPFULLSYNC
        trace!(target: "RDP", "{} gsDPFullSync()", self.command_prefix);
        self.comms.raise_dp_interrupt();
    }
}
