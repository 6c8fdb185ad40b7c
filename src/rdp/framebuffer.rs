//! Color and depth image tracking. Before the real pass over a display list, the list is
//! run once through the lite command table to classify every color image binding; the real
//! SetColorImage then replays that classification to decide what to draw, skip or copy back
//! to RDRAM.

use std::sync::atomic::Ordering;

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::Addressable;
use crate::backend::{Backend, ClearTarget, Rect, Surface};
use crate::texcache::decode::rgba5551_to_8888;

use super::{Rdp, UPDATE_SCISSOR};

// color image bindings tracked per frame
pub(super) const NUMTEXBUF: usize = 92;

/// What a color image binding is used for within a frame
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum CiStatus {
    Main,
    Zimg,
    #[default]
    Unknown,
    Useless,
    OldCopy,
    Copy,
    CopySelf,
    Zcopy,
    Aux,
    AuxCopy,
}

impl CiStatus {
    pub fn is_aux(&self) -> bool {
        *self >= CiStatus::Aux
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ColorImage {
    pub addr  : u32,
    pub format: u8,
    pub size  : u8,
    pub width : u32,
    pub height: u32,
    pub status: CiStatus,
}

impl ColorImage {
    // bytes covered by the image
    fn byte_len(&self) -> u32 {
        ((self.width * self.height) << self.size) >> 1
    }
}

/// A frame buffer the host should watch for CPU accesses
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameBufferInfo {
    pub addr  : u32,
    pub size  : u32,
    pub width : u32,
    pub height: u32,
}

#[derive(Debug, Default)]
pub(super) struct FrameBufferState {
    pub cimg: u32,
    pub ocimg: u32,
    pub ci_width: u32,
    pub ci_height: u32,
    pub ci_size: u8,
    pub ci_format: u8,
    pub ci_end: u32,
    pub zimg: u32,
    pub zi_width: u32,
    pub zimg_end: u32,

    // [0] is the main image of the current frame, [1] of the previous one
    pub maincimg: [ColorImage; 2],
    pub frame_buffers: Vec<ColorImage>,
    pub ci_count: usize,
    pub num_of_ci: usize,
    pub ci_status: CiStatus,

    pub main_ci: u32,
    pub main_ci_end: u32,
    pub main_ci_index: usize,
    pub copy_ci_index: usize,
    pub read_previous_ci: bool,

    pub fb_drawn: bool,
    pub fb_drawn_front: bool,
    pub vi_org_reg: u32,
    pub swap_ok: bool,
    pub skip_drawing: bool,
    pub detecting: bool,
    pub scale_bak: (f32, f32),
}

impl FrameBufferState {
    fn current(&self) -> Option<&ColorImage> {
        self.ci_count.checked_sub(1).and_then(|i| self.frame_buffers.get(i))
    }

    fn current_mut(&mut self) -> Option<&mut ColorImage> {
        match self.ci_count.checked_sub(1) {
            Some(i) => self.frame_buffers.get_mut(i),
            None => None,
        }
    }
}

/// CPU accesses to the frame buffer reported by the host between display lists
#[derive(Debug)]
pub(super) struct CpuFbTracking {
    pub read_called: bool,
    pub write_called: bool,
    pub write: bool,
    pub ignore: bool,
    // pixels written by the CPU
    pub dirty: Rect,
}

impl Default for CpuFbTracking {
    fn default() -> Self {
        Self {
            read_called : false,
            write_called: false,
            write       : false,
            ignore      : false,
            dirty       : Rect { ul_x: 0xFFFF, ul_y: 0xFFFF, lr_x: 0, lr_y: 0 },
        }
    }
}

impl<B: Backend> Rdp<B> {
    /// Classify every color image the current display list binds. Leaves the interpreter
    /// cursor halted; the caller restarts it.
    pub(super) fn detect_frame_buffer_usage(&mut self) {
        debug!(target: "FB", "detecting frame buffer usage");

        let (ci, zi) = (self.fb.cimg, self.fb.zimg);
        let previous_ci_was_read = self.fb.read_previous_ci;

        {
            let fb = &mut self.fb;
            fb.frame_buffers.clear();
            fb.main_ci = 0;
            fb.main_ci_end = 0;
            fb.ci_count = 0;
            fb.main_ci_index = 0;
            fb.copy_ci_index = 0;
            fb.zimg_end = 0;
            fb.read_previous_ci = false;
            fb.scale_bak = (self.scale_x, self.scale_y);
            fb.detecting = true;
        }

        self.pc_i = 0;
        self.pc[0] = self.segoffset(self.dmem.read_u32(0xFF0));
        self.dl_count = -1;
        self.halt = false;
        self.execute(true);
        self.halt = false;
        self.fb.detecting = false;

        if self.fb.ci_count > NUMTEXBUF {
            warn!(target: "FB", "more than {} color images in one frame, frame buffer emulation off for this list", NUMTEXBUF);
            self.fb.cimg = ci;
            self.fb.zimg = zi;
            self.fb.num_of_ci = self.fb.ci_count;
            self.fb.ci_count = 0;
            self.scale_x = self.fb.scale_bak.0;
            self.scale_y = self.fb.scale_bak.1;
            return;
        }

        let count = self.fb.ci_count;
        if count > 0 {
            let fb = &mut self.fb;
            let last = count - 1;

            if fb.frame_buffers[last].status == CiStatus::Unknown {
                fb.frame_buffers[last].status = if count > 1 { CiStatus::Aux } else { CiStatus::Main };
            }

            // a narrow main image followed by a wider auxiliary one: the auxiliary is the screen
            let main_width = fb.frame_buffers[fb.main_ci_index].width;
            if fb.frame_buffers[last].status == CiStatus::Aux && main_width < 320 && fb.frame_buffers[last].width > main_width {
                let addr = fb.frame_buffers[last].addr;
                for image in fb.frame_buffers.iter_mut() {
                    if image.status == CiStatus::Main {
                        image.status = CiStatus::Aux;
                    } else if image.addr == addr {
                        image.status = CiStatus::Main;
                    }
                }
                fb.main_ci_index = last;
            }

            if fb.frame_buffers.iter().all(|image| image.status == CiStatus::Zimg) {
                for image in fb.frame_buffers.iter_mut() {
                    image.status = CiStatus::Main;
                }
            }

            for (i, image) in fb.frame_buffers.iter().enumerate() {
                debug!(target: "FB", "color image {}: {:?} at ${:08X}, {}x{}", i, image.status, image.addr, image.width, image.height);
            }
        }

        self.fb.cimg = ci;
        self.fb.zimg = zi;
        self.fb.num_of_ci = count;

        if self.fb.frame_buffers.get(self.fb.copy_ci_index).map(|f| f.status) == Some(CiStatus::AuxCopy) {
            self.scale_x = self.fb.scale_bak.0;
            self.scale_y = self.fb.scale_bak.1;
        }

        // the frame reads what the previous frame drew
        if (self.fb.read_previous_ci || previous_ci_was_read) && self.fb.copy_ci_index == 0 {
            let main = self.fb.maincimg[0];
            if main.height > 65 {
                debug!(target: "FB", "copying the previous main image at ${:08X} for reading", main.addr);
                self.copy_frame_buffer_region(Surface::Back, main.addr, main.width, main.height, self.fb.ci_size);
            } else {
                self.copy_frame_buffer(Surface::Back);
            }
        }

        self.fb.ci_count = 0;
        if let Some(main) = self.fb.frame_buffers.get(self.fb.main_ci_index) {
            self.fb.maincimg[0] = *main;
        }
    }

    pub(super) fn handle_lite_setcolorimage(&mut self) {
        self.fb.ocimg = self.fb.cimg;
        self.fb.cimg = self.segoffset(self.cmd1);

        let width = (self.cmd0 & 0x0FFF) + 1;
        let height = match width {
            32 => 32,
            16 => 16,
            _ if self.fb.ci_count > 0 => self.scissor_o.lr_y,
            _ => 0,
        };

        let mut image = ColorImage {
            addr  : self.fb.cimg,
            format: ((self.cmd0 >> 21) & 0x07) as u8,
            size  : ((self.cmd0 >> 19) & 0x03) as u8,
            width : width,
            height: height,
            status: CiStatus::Unknown,
        };

        let fb = &mut self.fb;
        if fb.cimg == fb.zimg {
            image.status = CiStatus::Zimg;
            if fb.zimg_end == fb.zimg {
                fb.zimg_end = fb.zimg + image.width * self.scissor_o.lr_y * 2;
            }
        } else if fb.main_ci != 0 {
            if fb.cimg == fb.main_ci {
                // back to the main image
                let main_height = fb.frame_buffers.get(fb.main_ci_index).map(|f| f.height).unwrap_or(0);
                image.height = image.height.max(main_height);
                image.status = CiStatus::Main;
                fb.main_ci_index = fb.ci_count;
                fb.main_ci_end = fb.cimg + image.byte_len();
            }
        } else {
            // first image of the frame
            image.status = CiStatus::Main;
            fb.main_ci = fb.cimg;
            fb.main_ci_end = fb.cimg + image.byte_len();
            fb.main_ci_index = fb.ci_count;
        }

        if let Some(prev) = fb.current_mut() {
            if prev.status == CiStatus::Unknown {
                // bound again without anything drawn into it being read
                prev.status = if prev.addr == image.addr { CiStatus::Useless } else { CiStatus::Aux };
            }
        }

        trace!(target: "FB", "{} color image {} at ${:08X}, width {}: {:?}", self.command_prefix, fb.ci_count, image.addr, image.width, image.status);
        fb.frame_buffers.push(image);
        fb.ci_count += 1;
        if fb.ci_count > NUMTEXBUF {
            self.halt = true;
        }
    }

    pub(super) fn handle_lite_setdepthimage(&mut self) {
        let zimg = self.segoffset(self.cmd1);
        let fb = &mut self.fb;
        fb.zimg = zimg;
        fb.zimg_end = fb.zimg + fb.ci_width * self.scissor_o.lr_y * 2;

        if fb.zimg == fb.main_ci {
            // the provisional main image turned out to be the depth buffer
            if let Some(main) = fb.frame_buffers.get_mut(fb.main_ci_index) {
                main.status = CiStatus::Zimg;
            }
            fb.main_ci = 0;
        }

        for image in fb.frame_buffers.iter_mut() {
            if image.addr == zimg && (image.status == CiStatus::Aux || image.status == CiStatus::Useless) {
                image.status = CiStatus::Zimg;
            }
        }
    }

    pub(super) fn handle_lite_settextureimage(&mut self) {
        // only 16 and 32-bit RGBA images can be frame buffer reads
        if ((self.cmd0 >> 19) & 0x03) < 2 || ((self.cmd0 >> 21) & 0x07) != 0 {
            return;
        }

        let addr = self.segoffset(self.cmd1);
        let lr_y = self.scissor_o.lr_y;
        let ci_count = self.fb.ci_count;

        let fb = &mut self.fb;
        let (main_ci, main_ci_end) = (fb.main_ci, fb.main_ci_end);
        let main_width = fb.frame_buffers.get(fb.main_ci_index).map(|f| f.width).unwrap_or(0);
        let previous_main = fb.maincimg[0];
        let (zimg, zimg_end) = (fb.zimg, fb.zimg_end);

        let mut extend_main = 0;
        let mut copy_index = None;
        let mut read_previous = false;
        {
            let cur = match fb.current_mut() {
                Some(cur) => cur,
                None => return,
            };
            if cur.status >= CiStatus::Copy {
                return;
            }

            if cur.status == CiStatus::Main && cur.height == 0 {
                cur.height = lr_y;
                extend_main = cur.byte_len();
            }

            let main_end = main_ci_end + extend_main;
            if addr >= main_ci && addr < main_end {
                match cur.status {
                    CiStatus::Main => {
                        cur.status = CiStatus::CopySelf;
                        copy_index = Some(ci_count - 1);
                    },
                    CiStatus::Unknown => {
                        cur.status = if cur.width == main_width { CiStatus::Copy } else { CiStatus::AuxCopy };
                        copy_index = Some(ci_count - 1);
                    },
                    _ => {},
                };
            } else if addr >= previous_main.addr && addr < previous_main.addr.wrapping_add(previous_main.width * previous_main.height * 2) {
                if cur.status != CiStatus::Main {
                    cur.status = CiStatus::OldCopy;
                }
                read_previous = true;
            } else if cur.status == CiStatus::Unknown && addr >= zimg && addr < zimg_end {
                cur.status = CiStatus::Zcopy;
            }
        }

        fb.main_ci_end += extend_main;
        if let Some(index) = copy_index {
            fb.copy_ci_index = index;
        }
        if read_previous {
            fb.read_previous_ci = true;
        }
    }

    pub(super) fn handle_lite_fillrect(&mut self) {
        let fb = &mut self.fb;
        let cur = match fb.current_mut() {
            Some(cur) => cur,
            None => return,
        };
        if cur.width == 32 {
            return;
        }

        let ul_x = (self.cmd1 & 0x00FF_F000) >> 14;
        let lr_x = (self.cmd0 & 0x00FF_F000) >> 14;
        // a fill across the whole width tells how tall the image is
        if (cur.width as i32 - (lr_x as i32 - ul_x as i32)).abs() < 4 {
            let lr_y = self.scissor_o.lr_y.min((self.cmd0 & 0x0FFF) >> 2);
            cur.height = cur.height.max(lr_y);
        }
    }

    pub(super) fn handle_lite_setscissor(&mut self) {
        self.handle_setscissor();

        let scissor = self.scissor_o;
        if let Some(cur) = self.fb.current_mut() {
            if scissor.lr_x.saturating_sub(scissor.ul_x) > (cur.width >> 1)
                && (cur.height == 0 || (cur.width + 1 >= scissor.lr_x && cur.width <= scissor.lr_x + 1)) {
                cur.height = scissor.lr_y;
            }
        }
    }

    fn restore_scale(&mut self) {
        debug!(target: "FB", "back to the original scale {}x{}", self.fb.scale_bak.0, self.fb.scale_bak.1);
        self.scale_x = self.fb.scale_bak.0;
        self.scale_y = self.fb.scale_bak.1;
        self.update |= UPDATE_SCISSOR;

        let screen = Rect { ul_x: 0, ul_y: 0, lr_x: self.settings.res_x, lr_y: self.settings.res_y };
        self.backend.clear(ClearTarget::Depth(0xFFFF), screen);
    }

    // copy `len` bytes of RDRAM from one image to another
    fn copy_rdram(&mut self, from: u32, to: u32, len: u32) {
        for i in (0..len).step_by(4) {
            let v = self.rdram.read_u32((from + i) as usize);
            self.rdram.write_u32(v, (to + i) as usize);
        }
    }

    fn fill_rdram(&mut self, to: u32, len: u32) {
        for i in (0..len).step_by(4) {
            self.rdram.write_u32(0, (to + i) as usize);
        }
    }

    // act on the classification of the image about to be bound
    fn replay_color_image(&mut self) {
        let index = self.fb.ci_count;
        let cur = match self.fb.frame_buffers.get(index) {
            Some(cur) => *cur,
            None => return,
        };
        let prev = self.fb.frame_buffers.get(index.saturating_sub(1)).copied().unwrap_or_default();
        let next = self.fb.frame_buffers.get(index + 1).copied();

        trace!(target: "FB", "color image {} is {:?}", index, cur.status);
        let mut status = cur.status;
        match cur.status {
            CiStatus::Main => {
                if index == 0 {
                    if self.fb.ci_status == CiStatus::Aux {
                        let scale = (self.scale_x, self.scale_y);
                        self.scale_x = 1.0;
                        self.scale_y = 1.0;
                        self.copy_frame_buffer(Surface::Back);
                        self.scale_x = scale.0;
                        self.scale_y = scale.1;
                    }
                    if let Some(next) = next {
                        if self.fb.num_of_ci > 1 && next.status == CiStatus::Aux && next.width >= cur.width {
                            self.scale_x = 1.0;
                            self.scale_y = 1.0;
                        }
                    }
                }
                self.fb.skip_drawing = false;
            },

            CiStatus::Copy => {
                if cur.width == self.fb.ci_width {
                    if !self.fb.fb_drawn || prev.status == CiStatus::CopySelf {
                        self.copy_frame_buffer(Surface::Back);
                        self.fb.fb_drawn = true;
                    }
                    self.copy_rdram(self.fb.cimg, cur.addr, cur.byte_len());
                }
                self.fb.skip_drawing = true;
            },

            CiStatus::AuxCopy => {
                self.fb.skip_drawing = false;
                if !self.fb.fb_drawn {
                    self.copy_frame_buffer(Surface::Back);
                    self.fb.fb_drawn = true;
                }
            },

            CiStatus::OldCopy => {
                if cur.width == self.fb.ci_width {
                    self.copy_rdram(self.fb.maincimg[1].addr, cur.addr, cur.byte_len());
                } else {
                    self.fill_rdram(cur.addr, cur.byte_len());
                }
            },

            CiStatus::Aux => {
                // nothing can be drawn into a non RGBA image
                self.fb.skip_drawing = cur.format != 0;
                if index == 0 {
                    self.scale_x = 1.0;
                    self.scale_y = 1.0;
                } else if prev.status == CiStatus::Main && prev.width == cur.width {
                    self.copy_frame_buffer(Surface::Back);
                }
                status = CiStatus::Aux;
            },

            CiStatus::Zimg | CiStatus::Zcopy | CiStatus::Useless => {
                self.fb.skip_drawing = true;
            },

            CiStatus::CopySelf | CiStatus::Unknown => {
                self.fb.skip_drawing = false;
            },
        };

        if index > 0 && prev.status.is_aux() && prev.format == 0 {
            self.copy_frame_buffer(Surface::Back);
        }

        if cur.status == CiStatus::Copy {
            if let Some(next) = next {
                if next.status != CiStatus::Aux {
                    self.restore_scale();
                }
            }
        }

        if cur.status == CiStatus::Main && index > 0 {
            let rest_is_main = self.fb.frame_buffers.iter()
                .take(self.fb.num_of_ci)
                .skip(index + 1)
                .all(|f| matches!(f.status, CiStatus::Main | CiStatus::Zimg | CiStatus::Zcopy));
            if rest_is_main {
                self.scale_x = self.fb.scale_bak.0;
                self.scale_y = self.fb.scale_bak.1;
            }
        }

        self.fb.ci_status = status;
        self.fb.ci_count += 1;
    }

    pub(super) fn handle_setcolorimage(&mut self) { // G_SETCIMG
        if self.settings.fb_emulation && self.fb.num_of_ci < NUMTEXBUF {
            self.replay_color_image();
        }

        let cimg = self.segoffset(self.cmd1);
        let fb = &mut self.fb;
        fb.ocimg = fb.cimg;
        fb.cimg = cimg;
        fb.ci_width = (self.cmd0 & 0x0FFF) + 1;
        fb.ci_format = ((self.cmd0 >> 21) & 0x07) as u8;
        fb.ci_size = ((self.cmd0 >> 19) & 0x03) as u8;

        fb.ci_height = if self.settings.fb_emulation && fb.ci_count > 0 {
            fb.frame_buffers.get(fb.ci_count - 1).map(|f| f.height).unwrap_or(0)
        } else if fb.ci_width == 32 {
            32
        } else {
            self.scissor_o.lr_y
        };

        if fb.zimg == fb.cimg {
            fb.zi_width = fb.ci_width;
        }
        fb.ci_end = fb.cimg + (((fb.ci_width * fb.ci_height) << fb.ci_size) >> 1);

        trace!(target: "RDP", "{} gsDPSetColorImage(G_IM_FMT_{}, G_IM_SIZ_{}b, {}, 0x{:08X}) height {}", self.command_prefix,
               fb.ci_format, 4 << fb.ci_size, fb.ci_width, fb.cimg, fb.ci_height);

        if fb.ci_format != 0 {
            if fb.ci_format > 2 {
                fb.skip_drawing = true;
            }
            return;
        } else if !self.settings.fb_emulation {
            fb.skip_drawing = false;
        }

        if self.settings.swap_mode == 0 {
            return;
        }

        let vi_origin = self.comms.vi_origin.load(Ordering::SeqCst);
        let vi_swap_ok = !(self.settings.swap_mode == 2 && fb.vi_org_reg == vi_origin);
        if fb.zimg != fb.cimg && fb.ocimg != fb.cimg && fb.swap_ok && vi_swap_ok {
            if self.settings.fb_emulation {
                if let Some(main) = fb.frame_buffers.get(fb.main_ci_index) {
                    fb.maincimg[0] = *main;
                }
            } else {
                fb.maincimg[0].addr = fb.cimg;
            }

            debug!(target: "FB", "swapping buffers, main image ${:08X}", fb.maincimg[0].addr);
            fb.vi_org_reg = vi_origin;
            fb.swap_ok = false;
            self.backend.swap_buffers();
        }
    }

    pub(super) fn handle_setdepthimage(&mut self) { // G_SETZIMG
        self.fb.zimg = self.segoffset(self.cmd1);
        self.fb.zi_width = self.fb.ci_width;
        trace!(target: "RDP", "{} gsDPSetDepthImage(0x{:08X})", self.command_prefix, self.fb.zimg);
    }

    /// Copy the image currently drawn to its place in RDRAM
    pub(super) fn copy_frame_buffer(&mut self, from: Surface) {
        let height = if self.settings.fb_emulation {
            self.fb.current().or(self.fb.frame_buffers.first()).map(|f| f.height).unwrap_or(0)
        } else {
            self.ci_lower_bound
        };
        self.copy_frame_buffer_region(from, self.fb.cimg, self.fb.ci_width, height, self.fb.ci_size);
    }

    pub(super) fn copy_frame_buffer_region(&mut self, from: Surface, addr: u32, width: u32, height: u32, size: u8) {
        if width == 0 || height == 0 {
            return;
        }
        debug!(target: "FB", "copying {}x{} from {:?} to ${:08X}", width, height, from, addr);

        let (sx, sy) = if self.scale_x < 1.1 {
            (1.0, 1.0)
        } else {
            let vi_width = self.comms.vi_width.load(Ordering::SeqCst);
            let vi_height = self.comms.vi_height.load(Ordering::SeqCst);
            ((self.settings.res_x as f32 - self.offset_x * 2.0) / width.max(vi_width) as f32,
             (self.settings.res_y as f32 - self.offset_y * 2.0) / height.max(vi_height) as f32)
        };

        let rect = Rect {
            ul_x: self.offset_x as u32,
            ul_y: self.offset_y as u32,
            lr_x: self.offset_x as u32 + (width as f32 * sx).ceil() as u32,
            lr_y: self.offset_y as u32 + (height as f32 * sy).ceil() as u32,
        };
        let pixels = match self.backend.read_region(from, rect) {
            Some(pixels) => pixels,
            None => {
                debug!(target: "FB", "frame buffer read back failed");
                return;
            },
        };

        let stride = rect.width() as usize;
        for y in 0..height {
            for x in 0..width {
                let src = (x as f32 * sx) as usize + (y as f32 * sy) as usize * stride;
                let c = match pixels.get(src) {
                    Some(c) => *c,
                    None => continue,
                };
                // RGB565 to RGBA5551, opaque
                let c = (c & 0xFFC0) | ((c & 0x001F) << 1) | 1;
                let i = (x + y * width) as usize;
                if size <= 2 {
                    self.rdram.write_u16(c, addr as usize + i * 2);
                } else {
                    self.rdram.write_u32(rgba5551_to_8888(c), addr as usize + i * 4);
                }
            }
        }
    }

    // a texture about to be read from the image being drawn needs it in RDRAM first
    pub(super) fn copy_self_before_texture_read(&mut self) {
        if !self.settings.fb_emulation || self.fb.fb_drawn {
            return;
        }
        if self.fb.current().map(|f| f.status) != Some(CiStatus::CopySelf) {
            return;
        }
        if self.timg.addr >= self.fb.cimg && self.timg.addr < self.fb.ci_end {
            self.copy_frame_buffer(Surface::Back);
            self.fb.fb_drawn = true;
        }
    }

    /// The CPU is reading frame buffer memory at `addr`
    pub fn fb_read(&mut self, addr: u32) {
        if self.cpu_fb.ignore {
            return;
        }
        if self.cpu_fb.write_called {
            // mixed reads and writes within a frame: stop tracking
            self.cpu_fb.ignore = true;
            self.cpu_fb.write = false;
            return;
        }
        self.cpu_fb.read_called = true;

        let a = self.segoffset(addr);
        trace!(target: "FB", "CPU read at ${:08X}", a);

        if (!self.fb.fb_drawn || self.settings.fb_read_always) && a >= self.fb.cimg && a < self.fb.ci_end {
            self.copy_frame_buffer(Surface::Back);
            self.fb.fb_drawn = true;
        }

        let front = self.fb.maincimg[1];
        if !self.fb.fb_drawn_front && a >= front.addr && a < front.addr.wrapping_add(self.fb.ci_width * self.fb.ci_height * 2) {
            let (width, height) = if self.settings.fb_emulation {
                (front.width, front.height)
            } else {
                (self.fb.ci_width, self.ci_lower_bound)
            };
            self.copy_frame_buffer_region(Surface::Front, front.addr, width, height, self.fb.ci_size);
            self.fb.fb_drawn_front = true;
        }
    }

    /// The CPU wrote `size` bytes of frame buffer memory at `addr`
    pub fn fb_write(&mut self, addr: u32, size: u32) {
        if self.cpu_fb.ignore {
            return;
        }
        if self.cpu_fb.read_called {
            self.cpu_fb.ignore = true;
            self.cpu_fb.write = false;
            return;
        }
        self.cpu_fb.write_called = true;

        let a = self.segoffset(addr);
        trace!(target: "FB", "CPU write of {} bytes at ${:08X}", size, a);
        if a < self.fb.cimg || a > self.fb.ci_end || self.fb.ci_width == 0 {
            return;
        }

        self.cpu_fb.write = true;
        let shift_l = (a - self.fb.cimg) >> 1;
        let shift_r = shift_l + 2;

        let w = self.fb.ci_width;
        let dirty = &mut self.cpu_fb.dirty;
        dirty.ul_x = dirty.ul_x.min(shift_l % w);
        dirty.ul_y = dirty.ul_y.min(shift_l / w);
        dirty.lr_x = dirty.lr_x.max(shift_r % w);
        dirty.lr_y = dirty.lr_y.max(shift_r / w);
    }

    /// Area of the color image the CPU wrote since the last display list
    pub fn cpu_dirty_rect(&self) -> Option<Rect> {
        if self.cpu_fb.write { Some(self.cpu_fb.dirty) } else { None }
    }

    /// Frame buffers the host should report CPU accesses for. Unused entries are zero.
    pub fn frame_buffer_info(&self) -> [FrameBufferInfo; 6] {
        let mut info = [FrameBufferInfo::default(); 6];
        let from_image = |image: &ColorImage| FrameBufferInfo {
            addr  : image.addr,
            size  : image.size as u32,
            width : image.width,
            height: image.height,
        };

        if self.settings.fb_emulation {
            info[0] = from_image(&self.fb.maincimg[1]);
            let watched = self.fb.frame_buffers.iter()
                .take(self.fb.num_of_ci)
                .filter(|f| matches!(f.status, CiStatus::Main | CiStatus::CopySelf | CiStatus::OldCopy));
            for (slot, image) in info[1..].iter_mut().zip(watched) {
                *slot = from_image(image);
            }
        } else {
            for (slot, image) in info.iter_mut().zip(self.fb.maincimg.iter()) {
                *slot = FrameBufferInfo {
                    addr  : image.addr,
                    size  : self.fb.ci_size as u32,
                    width : self.fb.ci_width,
                    height: self.fb.ci_width * 3 / 4,
                };
            }
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use atomic_counter::AtomicCounter;

    use super::*;
    use super::super::tests::*;
    use crate::{RenderCommand, Settings};

    const IMAGE_A: u32 = 0x1_0000;
    const IMAGE_B: u32 = 0x2_0000;
    const DEPTH  : u32 = 0x3_0000;

    // RGBA 16-bit, 320 wide
    fn setcimg(addr: u32) -> (u32, u32) {
        (0xFF10_013F, addr)
    }

    fn emulating_rdp() -> Rdp {
        test_rdp_with(0x4_0000, Settings { fb_emulation: true, ..Settings::default() })
    }

    fn statuses(rdp: &Rdp) -> Vec<CiStatus> {
        rdp.fb.frame_buffers.iter().map(|f| f.status).collect()
    }

    #[test]
    fn test_status_order() {
        assert!(CiStatus::Aux.is_aux());
        assert!(CiStatus::AuxCopy.is_aux());
        assert!(!CiStatus::Main.is_aux());
        assert!(CiStatus::CopySelf >= CiStatus::Copy);
    }

    #[test]
    fn test_depth_image_binding_is_zimg() {
        let mut rdp = emulating_rdp();
        rdp.load_display_list(&[
            (0xFE00_0000, DEPTH),
            setcimg(IMAGE_A),
            setcimg(DEPTH),
            setcimg(IMAGE_A),
            ENDDL,
        ]);
        rdp.process_display_list().expect("list runs");

        assert_eq!(statuses(&rdp), vec![CiStatus::Main, CiStatus::Zimg, CiStatus::Main]);
        assert_eq!(rdp.fb.num_of_ci, 3);
        // the real pass replayed every binding
        assert_eq!(rdp.fb.ci_count, 3);
        assert_eq!(rdp.fb.cimg, IMAGE_A);
        assert!(!rdp.fb.skip_drawing);

        let swaps = rdp.commands().iter().filter(|c| **c == RenderCommand::SwapBuffers).count();
        assert_eq!(swaps, 1);
        assert_eq!(rdp.fb.maincimg[0].addr, IMAGE_A);
    }

    #[test]
    fn test_unknown_image_becomes_aux() {
        let mut rdp = emulating_rdp();
        rdp.load_display_list(&[
            setcimg(IMAGE_A),
            setcimg(IMAGE_B),
            setcimg(IMAGE_A),
            ENDDL,
        ]);
        rdp.process_display_list().expect("list runs");
        assert_eq!(statuses(&rdp), vec![CiStatus::Main, CiStatus::Aux, CiStatus::Main]);
    }

    #[test]
    fn test_ignored_undefined_opcode_does_not_stop_classification() {
        let mut rdp = emulating_rdp();
        if let Ok(mut t) = rdp.comms.tweakables.write() {
            t.ignore_undefined_opcodes = true;
        }
        rdp.load_display_list(&[
            setcimg(IMAGE_A),
            (0x2A00_0000, 0),
            setcimg(IMAGE_B),
            setcimg(IMAGE_A),
            ENDDL,
        ]);
        rdp.process_display_list().expect("list runs");
        assert_eq!(statuses(&rdp), vec![CiStatus::Main, CiStatus::Aux, CiStatus::Main]);
        assert_eq!(rdp.fb.num_of_ci, 3);
        assert_eq!(rdp.fb.ci_count, 3);
    }

    #[test]
    fn test_undefined_opcode_stops_classification() {
        let mut rdp = emulating_rdp();
        rdp.load_display_list(&[
            setcimg(IMAGE_A),
            (0x2A00_0000, 0),
            setcimg(IMAGE_B),
            ENDDL,
        ]);
        rdp.process_display_list().expect("undefined opcodes aren't fatal");
        assert_eq!(rdp.fb.num_of_ci, 1);
        assert_eq!(rdp.comms.interrupts_raised.get(), 1);
    }

    #[test]
    fn test_last_unknown_image() {
        let mut rdp = emulating_rdp();
        rdp.load_display_list(&[setcimg(IMAGE_A), setcimg(IMAGE_B), ENDDL]);
        rdp.process_display_list().expect("list runs");
        assert_eq!(statuses(&rdp), vec![CiStatus::Main, CiStatus::Aux]);
    }

    #[test]
    fn test_texture_read_from_main_is_copy_self() {
        let mut rdp = emulating_rdp();
        rdp.load_display_list(&[
            (0xED00_0000, 0x0050_03C0),
            setcimg(IMAGE_A),
            (0xFD10_013F, IMAGE_A + 0x100),
            ENDDL,
        ]);
        rdp.process_display_list().expect("list runs");
        assert_eq!(statuses(&rdp), vec![CiStatus::CopySelf]);
        assert_eq!(rdp.fb.frame_buffers[0].height, 240);
    }

    #[test]
    fn test_too_many_images_disable_replay() {
        let mut rdp = emulating_rdp();
        let mut list: Vec<(u32, u32)> = (0..(NUMTEXBUF as u32 + 2)).map(|i| setcimg(0x1000 + i * 0x100)).collect();
        list.push(ENDDL);
        rdp.load_display_list(&list);
        rdp.process_display_list().expect("list runs");

        assert_eq!(rdp.fb.num_of_ci, NUMTEXBUF + 1);
        assert_eq!(rdp.fb.ci_count, 0);
        // the real pass still binds every image
        assert_eq!(rdp.fb.cimg, 0x1000 + (NUMTEXBUF as u32 + 1) * 0x100);
    }

    #[test]
    fn test_cpu_read_copies_frame_buffer() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.fb.cimg = 0x1000;
        rdp.fb.ci_width = 4;
        rdp.fb.ci_size = 2;
        rdp.ci_lower_bound = 2;
        rdp.fb.ci_end = 0x1000 + 4 * 2 * 2;
        rdp.backend_mut().set_readback(Some(vec![0xF800, 0x07E0, 0x001F, 0, 0, 0, 0, 0xFFFF]));

        rdp.fb_read(0x1004);
        assert_eq!(rdp.rdram.read_u16(0x1000), 0xF801);
        assert_eq!(rdp.rdram.read_u16(0x1002), 0x07C1);
        assert_eq!(rdp.rdram.read_u16(0x1004), 0x003F);
        assert_eq!(rdp.rdram.read_u16(0x100E), 0xFFFF);
        assert!(rdp.fb.fb_drawn);

        // a write after a read turns tracking off
        rdp.fb_write(0x1000, 2);
        assert!(rdp.cpu_fb.ignore);
        assert_eq!(rdp.cpu_dirty_rect(), None);
    }

    #[test]
    fn test_cpu_write_dirty_rect() {
        let mut rdp = test_rdp(0x4_0000);
        rdp.fb.cimg = 0x1000;
        rdp.fb.ci_width = 320;
        rdp.fb.ci_end = 0x1000 + 320 * 240 * 2;

        rdp.fb_write(0x1000 + 2 * (320 * 3 + 5), 2);
        rdp.fb_write(0x1000 + 2 * (320 * 7 + 1), 2);
        assert_eq!(rdp.cpu_dirty_rect(), Some(Rect { ul_x: 1, ul_y: 3, lr_x: 7, lr_y: 7 }));

        // outside the color image
        rdp.fb_write(0x800, 4);
        assert_eq!(rdp.cpu_dirty_rect(), Some(Rect { ul_x: 1, ul_y: 3, lr_x: 7, lr_y: 7 }));
    }

    #[test]
    fn test_frame_buffer_info_without_emulation() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.fb.maincimg[0].addr = 0x1000;
        rdp.fb.maincimg[1].addr = 0x2000;
        rdp.fb.ci_width = 320;
        rdp.fb.ci_size = 2;

        let info = rdp.frame_buffer_info();
        assert_eq!(info[0], FrameBufferInfo { addr: 0x1000, size: 2, width: 320, height: 240 });
        assert_eq!(info[1].addr, 0x2000);
        assert_eq!(info[2], FrameBufferInfo::default());
    }
}
