use std::fmt;
use std::sync::{Arc, RwLock};
use std::sync::mpsc;
use std::sync::atomic::{AtomicU32, Ordering};

use atomic_counter::{AtomicCounter, RelaxedCounter};

pub mod backend;
pub mod combine;
pub mod memory;
pub mod rdp;
pub mod texcache;
pub mod ucode;

pub use backend::{Backend, BackendError, CommandBufferBackend, RenderCommand};
pub use memory::Memory;
pub use rdp::Rdp;
pub use ucode::Microcode;

// MI_INTR_REG bit for the DP
pub const MI_INTR_DP: u32 = 0x20;

// DPC_STATUS bit that selects DMEM as the command source
pub const DPC_STATUS_XBUS_DMEM_DMA: u32 = 0x01;
pub const DPC_STATUS_FREEZE: u32 = 0x02;

/// Memory as seen by the RDP. Every address is masked by the implementor, so
/// none of these can fault.
pub trait Addressable {
    fn read_u32(&self, offset: usize) -> u32;
    fn write_u32(&mut self, value: u32, offset: usize);

    fn read_u64(&self, offset: usize) -> u64 {
        ((self.read_u32(offset) as u64) << 32) | self.read_u32(offset + 4) as u64
    }

    /// not every memory needs to implement these, so defaults are provided
    fn read_u16(&self, offset: usize) -> u16 {
        let word = self.read_u32(offset & !0x03);
        let shift = 16 - ((offset & 0x02) << 3);
        ((word >> shift) & 0xFFFF) as u16
    }

    fn read_u8(&self, offset: usize) -> u8 {
        let word = self.read_u32(offset & !0x03);
        let shift = 24 - ((offset & 0x03) << 3);
        ((word >> shift) & 0xFF) as u8
    }

    fn write_u16(&mut self, value: u16, offset: usize) {
        let word = self.read_u32(offset & !0x03);
        let shift = 16 - ((offset & 0x02) << 3);
        self.write_u32(((value as u32) << shift) | (word & (0xFFFF0000 >> shift)), offset & !0x03)
    }

    fn write_u8(&mut self, value: u8, offset: usize) {
        let word = self.read_u32(offset & !0x03);
        let shift = 24 - ((offset & 0x03) << 3);
        self.write_u32(((value as u32) << shift) | (word & !(0xFFu32 << shift)), offset & !0x03)
    }

    // block read. returns `length` bytes starting at offset as big endian bytes
    fn read_block(&self, offset: usize, length: usize) -> Vec<u8> {
        (0..length).map(|i| self.read_u8(offset + i)).collect()
    }
}

#[derive(Debug)]
pub enum GfxError {
    // the backend failed in a way that evicting the texture cache could not fix
    Backend(BackendError),
    Io(std::io::Error),
    DumpTooSmall { name: &'static str, size: usize, needed: usize },
}

impl fmt::Display for GfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GfxError::Backend(e) => write!(f, "graphics backend failure: {}", e),
            GfxError::Io(e) => write!(f, "i/o error: {}", e),
            GfxError::DumpTooSmall { name, size, needed } => {
                write!(f, "{} dump is {} bytes, need at least {}", name, size, needed)
            },
        }
    }
}

impl std::error::Error for GfxError {}

impl From<BackendError> for GfxError {
    fn from(e: BackendError) -> Self {
        GfxError::Backend(e)
    }
}

impl From<std::io::Error> for GfxError {
    fn from(e: std::io::Error) -> Self {
        GfxError::Io(e)
    }
}

// Tweakables -- things developers and nerds might want to play with
#[derive(Debug, Clone, Copy, Default)]
pub struct Tweakables {
    pub disable_textures        : bool,
    pub disable_modifiers       : bool,
    // keep interpreting after an undefined opcode instead of halting the list
    pub ignore_undefined_opcodes: bool,
    pub trace_commands          : bool,
}

// Settings -- normal things people may want to configure (frame buffer emulation, cache size, etc.)
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    // run the frame buffer usage pre-pass and honor its classification
    pub fb_emulation       : bool,
    // copy every drawn color image back to RDRAM when the CPU reads it
    pub fb_read_always     : bool,
    // copy the main color image to RDRAM at the end of every display list
    pub fb_copy_after_list : bool,
    // 0 = never swap on color image changes, 1 = swap when the main color image changes
    pub swap_mode          : u8,
    pub texture_correction : bool,
    pub force_microcheck   : bool,
    pub ucode_override     : Option<Microcode>,
    pub cache_capacity     : usize,
    // bytes of texture memory the command buffer backend pretends to have
    pub texture_memory     : usize,
    pub res_x              : u32,
    pub res_y              : u32,
    // 0 = follow othermode, 1 = force bilinear, 2 = force point sampling
    pub filtering          : u8,
    pub decrease_fillrect_edge: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fb_emulation       : true,
            fb_read_always     : false,
            fb_copy_after_list : false,
            swap_mode          : 1,
            texture_correction : true,
            force_microcheck   : false,
            ucode_override     : None,
            cache_capacity     : texcache::MAX_CACHE,
            texture_memory     : 64 << 20,
            res_x              : 640,
            res_y              : 480,
            filtering          : 0,
            decrease_fillrect_edge: false,
        }
    }
}

// Collection of thread-safe registers and signals shared between the host and the RDP
#[derive(Clone)]
pub struct HostCommunication {
    // MI_INTR_REG
    pub mi_intr: Arc<AtomicU32>,
    // number of DP interrupts raised so far
    pub interrupts_raised: Arc<RelaxedCounter>,
    // host side CheckInterrupts()
    pub mi_interrupts_tx: Option<mpsc::Sender<u32>>,

    // current render framebuffer
    pub vi_origin: Arc<AtomicU32>,
    // framebuffer width and visible height in pixels
    pub vi_width: Arc<AtomicU32>,
    pub vi_height: Arc<AtomicU32>,

    // DP command registers for the low level path
    pub dpc_start: Arc<AtomicU32>,
    pub dpc_end: Arc<AtomicU32>,
    pub dpc_current: Arc<AtomicU32>,
    pub dpc_status: Arc<AtomicU32>,

    // emulation flags that change the way emulation behaves
    pub settings: Arc<RwLock<Settings>>,

    // tweakables -- fun for geeks
    pub tweakables: Arc<RwLock<Tweakables>>,
}

impl HostCommunication {
    pub fn new() -> Self {
        Self {
            mi_intr          : Arc::new(AtomicU32::new(0)),
            interrupts_raised: Arc::new(RelaxedCounter::new(0)),
            mi_interrupts_tx : None,
            vi_origin        : Arc::new(AtomicU32::new(0)),
            vi_width         : Arc::new(AtomicU32::new(320)),
            vi_height        : Arc::new(AtomicU32::new(240)),
            dpc_start        : Arc::new(AtomicU32::new(0)),
            dpc_end          : Arc::new(AtomicU32::new(0)),
            dpc_current      : Arc::new(AtomicU32::new(0)),
            dpc_status       : Arc::new(AtomicU32::new(0)),
            settings         : Arc::new(RwLock::new(Settings::default())),
            tweakables       : Arc::new(RwLock::new(Tweakables::default())),
        }
    }

    /// MI_INTR_REG |= DP, then let the host check interrupts
    pub fn raise_dp_interrupt(&self) {
        self.mi_intr.fetch_or(MI_INTR_DP, Ordering::SeqCst);
        self.interrupts_raised.inc();
        if let Some(tx) = &self.mi_interrupts_tx {
            // a host that went away can't be interrupted anyway
            let _ = tx.send(MI_INTR_DP);
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().map(|s| *s).unwrap_or_default()
    }

    pub fn tweakables(&self) -> Tweakables {
        self.tweakables.read().map(|t| *t).unwrap_or_default()
    }
}

impl Default for HostCommunication {
    fn default() -> Self {
        Self::new()
    }
}
