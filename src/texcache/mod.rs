use std::collections::HashMap;
use std::mem;

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::backend::{Backend, BackendError, TextureHandle, TextureUpload};
use crate::rdp::Tile;

pub mod crc;
pub mod decode;
pub mod modifier;
pub mod wrap;

use decode::TmemLayout;
use modifier::TexModifier;

// default number of textures kept before the whole cache is thrown away
pub const MAX_CACHE: usize = 1024;

pub const TMEM_SIZE: usize = 4096;

// largest texture the cache will build, in texels per side
const MAX_TEXTURE_SIZE: u32 = 1024;

/// The parts of RDP state a texture depends on besides its tile descriptor
pub struct TextureSource<'a> {
    pub tmem       : &'a [u8; TMEM_SIZE],
    pub palette    : &'a [u16; 256],
    pub pal_8_crc  : &'a [u32; 16],
    pub pal_256_crc: u32,
    pub tlut_mode  : u8,
    // 1 when TMEM was last filled by LoadTile, 0 for LoadBlock
    pub set_by     : u8,
}

/// Footprint of a tile in TMEM and its cache key
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TexInfo {
    pub crc        : u32,
    pub flags      : u32,
    // texels decoded from TMEM
    pub width      : u32,
    pub height     : u32,
    pub tile_width : u32,
    pub tile_height: u32,
    // qwords per row covered by the crc
    pub wid_64     : u32,
    pub crc_height : u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub crc     : u32,
    pub flags   : u32,
    pub width   : u32,
    pub height  : u32,
    pub format  : u8,
    pub size    : u8,
    pub palette : u8,
    pub modifier: Option<TexModifier>,

    pub handle  : TextureHandle,
    pub tmu     : usize,

    // uploaded (power of two) size
    pub real_x  : u32,
    pub real_y  : u32,
    pub lod     : u32,
    pub aspect  : i32,

    // texture coordinate scaling for the draw paths
    pub scale   : f32,
    pub scale_x : f32,
    pub scale_y : f32,
    pub c_off   : f32,
    pub c_scl_x : f32,
    pub c_scl_y : f32,

    // force the backend wrap mode instead of deriving it from the tile
    pub f_mirror_s: bool,
    pub f_mirror_t: bool,
    pub f_wrap_s  : bool,
    pub f_wrap_t  : bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits     : u64,
    pub misses   : u64,
    pub evictions: u64,
    pub uploads  : u64,
}

pub struct TextureCache {
    entries   : Vec<CacheEntry>,
    // crc >> 16 -> indices into entries
    lut       : HashMap<u16, Vec<usize>>,
    capacity  : usize,
    stats     : CacheStats,
    noise_seed: u32,
    // decode scratch space, reused between loads
    buffer    : Vec<u32>,
}

/// Compute what part of TMEM `tile` samples and hash it. Updates `tile.width`/`tile.height`
/// to the size the texture will have, and shrinks tiles that would run off the end of TMEM.
pub fn tex_info(tile: &mut Tile, src: &TextureSource) -> TexInfo {
    // a shrunk tile always fits, so the second pass is final
    for _ in 0..2 {
        let tile_width = (tile.lr_s.saturating_sub(tile.ul_s) + 1).min(MAX_TEXTURE_SIZE);
        let tile_height = (tile.lr_t.saturating_sub(tile.ul_t) + 1).min(MAX_TEXTURE_SIZE);

        let mut mask_width = if tile.mask_s == 0 { tile_width } else { 1 << tile.mask_s };
        let mut mask_height = if tile.mask_t == 0 { tile_height } else { 1 << tile.mask_t };

        if mask_width > 256 && mask_height > 256 {
            mask_width = tile_width;
            mask_height = tile_height;
        }

        let width = if tile.clamp_s && tile_width <= 256 {
            tile.width = tile_width;
            mask_width.min(tile_width)
        } else {
            tile.width = mask_width;
            mask_width
        };

        let height = if (tile.clamp_t && tile_height <= 256) || mask_height > 256 {
            tile.height = tile_height;
            mask_height.min(tile_height)
        } else {
            tile.height = mask_height;
            mask_height
        };

        // texture wraps TMEM: cut it down to the rows that fit and treat it as repeating
        // the overrun test counts t_mem in words against the TMEM size in bytes
        let row_bytes = tile.line * 8;
        let start = tile.t_mem * 8;
        if row_bytes > 0 && tile.t_mem + height.min(tile_height) * row_bytes > TMEM_SIZE as u32 {
            let y = (TMEM_SIZE as u32).saturating_sub(tile.t_mem) / row_bytes;
            debug!(target: "TEXCACHE", "tile at tmem ${:03X} wraps TMEM, keeping {} rows", tile.t_mem, y);

            tile.clamp_t = false;
            tile.lr_t = tile.ul_t.wrapping_add(y).wrapping_sub(1);
            let mut shift = 0;
            while (1u32 << shift) < y {
                shift += 1;
            }
            tile.mask_t = shift;
            continue;
        }

        let crc_height = if src.set_by == 1 { tile_height } else { height };

        let mut wid_64 = width << tile.size >> 1;
        if tile.size == 3 {
            wid_64 = (wid_64 + 15) & !15;
        } else {
            wid_64 = (wid_64 + 7) & !7;
        }
        let wid_64 = (wid_64 >> 3).max(1);

        let stride = row_bytes as usize;
        let mut crc = 0u32;
        if crc_height > 0 {
            if tile.size < 3 {
                crc = crc::texture_crc(src.tmem, start as usize, wid_64, crc_height, stride);
            } else {
                let half = (wid_64 >> 1).max(1);
                crc = crc::texture_crc(src.tmem, start as usize, half, crc_height, stride)
                    .wrapping_add(crc::texture_crc(src.tmem, start as usize + 0x800, half, crc_height, stride));
            }
        }

        if tile.size < 2 && (src.tlut_mode != 0 || tile.format == 2) {
            crc = crc.wrapping_add(if tile.size == 0 { src.pal_8_crc[(tile.palette & 0x0F) as usize] } else { src.pal_256_crc });
        }

        let flags = ((tile.clamp_s as u32) << 23) | ((tile.mirror_s as u32) << 22) | ((tile.mask_s as u32) << 18)
                  | ((tile.clamp_t as u32) << 17) | ((tile.mirror_t as u32) << 16) | ((tile.mask_t as u32) << 12);

        return TexInfo {
            crc        : crc,
            flags      : flags,
            width      : width,
            height     : height,
            tile_width : tile_width,
            tile_height: tile_height,
            wid_64     : wid_64,
            crc_height : crc_height,
        };
    }

    // unreachable in practice, an empty footprint never matches anything useful
    TexInfo::default()
}

fn modifiers_match(a: Option<&TexModifier>, b: Option<&TexModifier>, mask: u32) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.matches(b, mask),
        _ => false,
    }
}

// lod and coordinate scale for a power of two size
fn lod_and_scale(size_max: u32) -> (u32, f32) {
    match size_max {
        1   => (0, 256.0),
        2   => (1, 128.0),
        4   => (2, 64.0),
        8   => (3, 32.0),
        16  => (4, 16.0),
        32  => (5, 8.0),
        64  => (6, 4.0),
        128 => (7, 2.0),
        256 => (8, 1.0),
        512 => (9, 0.5),
        _   => (10, 0.25),
    }
}

impl TextureCache {
    pub fn new(capacity: usize) -> TextureCache {
        TextureCache {
            entries   : Vec::new(),
            lut       : HashMap::new(),
            capacity  : capacity.max(1),
            stats     : CacheStats::default(),
            noise_seed: 1,
            buffer    : Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn entry(&self, index: usize) -> Option<&CacheEntry> {
        self.entries.get(index)
    }

    /// Footprint and hash of `tile`, plus the index of a cached texture that can be used
    /// for it
    pub fn probe(&mut self, tile: &mut Tile, src: &TextureSource, modifier: Option<&TexModifier>) -> (TexInfo, Option<usize>) {
        let info = tex_info(tile, src);
        let found = self.find(tile, &info, modifier);

        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }

        trace!(target: "TEXCACHE", "probe crc=${:08X} {}x{} flags=${:06X}: {}", info.crc, tile.width, tile.height,
               info.flags, if found.is_some() { "hit" } else { "miss" });
        (info, found)
    }

    fn find(&self, tile: &Tile, info: &TexInfo, modifier: Option<&TexModifier>) -> Option<usize> {
        let mod_mask = if tile.format == 2 { 0xFFFF_FFFF } else { 0xF0F0_F0F0 };
        let bucket = self.lut.get(&((info.crc >> 16) as u16))?;

        bucket.iter().copied().find(|&index| {
            let e = &self.entries[index];
            e.crc == info.crc
                && e.width == tile.width
                && e.height == tile.height
                && e.flags == info.flags
                && modifiers_match(e.modifier.as_ref(), modifier, mod_mask)
        })
    }

    /// Drop every texture, in the cache and in the backend
    pub fn evict_all<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        debug!(target: "TEXCACHE", "evicting all {} textures", self.entries.len());
        self.entries.clear();
        self.lut.clear();
        backend.release_textures();
        self.stats.evictions += 1;
    }

    /// Decode, post-process and upload the texture `tile` describes. Returns the index of the
    /// new entry. Running out of backend texture memory clears the cache and retries once.
    pub fn load<B: Backend + ?Sized>(&mut self, backend: &mut B, tile: &Tile, info: &TexInfo, src: &TextureSource,
                                     modifier: Option<TexModifier>, tmu: usize) -> Result<usize, BackendError> {
        if self.entries.len() >= self.capacity {
            debug!(target: "TEXCACHE", "cache count reached ({}), clearing", self.capacity);
            self.evict_all(backend);
        }

        let size_x = tile.width.max(1).next_power_of_two().min(MAX_TEXTURE_SIZE);
        let size_y = tile.height.max(1).next_power_of_two().min(MAX_TEXTURE_SIZE);
        let size_max = size_x.max(size_y);
        let (lod, scale) = lod_and_scale(size_max);

        let mut real_x = size_max;
        let mut real_y = size_max;
        let mut scale_x = 1.0f32;
        let mut scale_y = 1.0f32;
        let aspect;

        if size_x >= size_y {
            aspect = match size_x / size_y {
                1 => 0,
                2 => 1,
                4 => 2,
                _ => 3,
            };
            scale_y = 1.0 / (1 << aspect) as f32;
            real_y >>= aspect;
        } else {
            aspect = match size_y / size_x {
                2 => -1,
                4 => -2,
                _ => -3,
            };
            scale_x = 1.0 / (1 << -aspect) as f32;
            real_x >>= -aspect;
        }

        if real_x != tile.width || real_y != tile.height {
            scale_x *= tile.width as f32 / real_x as f32;
            scale_y *= tile.height as f32 / real_y as f32;
        }

        // CI textures with an RGBA16 palette are modified through the palette
        let modify_palette = modifier.is_some() && tile.format == 2 && src.tlut_mode == 2;
        let palette = match (&modifier, modify_palette) {
            (Some(m), true) => {
                let seed = &mut self.noise_seed;
                decode::modify_palette(src.palette, |p| m.apply(p, seed))
            },
            _ => *src.palette,
        };

        let mut pixels = mem::take(&mut self.buffer);
        pixels.clear();
        pixels.resize((real_x * real_y) as usize, 0);

        let layout = TmemLayout {
            format   : tile.format,
            size     : tile.size,
            start    : tile.t_mem as usize * 8,
            stride   : tile.line as usize * 8,
            palette  : tile.palette,
            tlut_mode: src.tlut_mode,
        };
        decode::decode(src.tmem, &palette, &layout, info.width as usize, info.height as usize, &mut pixels, real_x as usize);
        self.fill_edges(&mut pixels, tile, info, real_x as usize, real_y as usize);

        if let (Some(m), false) = (&modifier, modify_palette) {
            m.apply(&mut pixels, &mut self.noise_seed);
        }

        let result = self.upload(backend, tmu, &pixels, real_x, real_y, lod, aspect);
        self.buffer = pixels;
        let handle = result?;

        let entry = CacheEntry {
            crc       : info.crc,
            flags     : info.flags,
            width     : tile.width,
            height    : tile.height,
            format    : tile.format,
            size      : tile.size,
            palette   : tile.palette,
            modifier  : modifier,
            handle    : handle,
            tmu       : tmu,
            real_x    : real_x,
            real_y    : real_y,
            lod       : lod,
            aspect    : aspect,
            scale     : scale,
            scale_x   : scale_x,
            scale_y   : scale_y,
            c_off     : scale * 0.5,
            c_scl_x   : if tile.width != 1 { scale } else { 0.0 },
            c_scl_y   : if tile.height != 1 { scale } else { 0.0 },
            f_mirror_s: false,
            f_mirror_t: false,
            f_wrap_s  : false,
            f_wrap_t  : false,
        };

        let index = self.entries.len();
        self.lut.entry((info.crc >> 16) as u16).or_default().push(index);
        self.entries.push(entry);

        debug!(target: "TEXCACHE", "loaded crc=${:08X} fmt={} siz={} {}x{} as {}x{} (tmu {}, entry {})",
               info.crc, tile.format, tile.size, tile.width, tile.height, real_x, real_y, tmu, index);
        Ok(index)
    }

    fn fill_edges(&self, pixels: &mut [u32], tile: &Tile, info: &TexInfo, real_x: usize, real_y: usize) {
        let width = info.width as usize;
        let height = info.height as usize;

        let min_x = if tile.mask_s != 0 { real_x.min(1 << tile.mask_s) } else { real_x };
        let min_y = if tile.mask_t != 0 { real_y.min(1 << tile.mask_t) } else { real_y };

        if min_x > width {
            wrap::clamp_s(pixels, real_x, width, min_x, height);
        }
        if width < real_x {
            wrap::wrap_s(pixels, real_x, tile.mask_s, tile.mirror_s, height);
        }

        if min_y > height {
            wrap::clamp_t(pixels, real_x, height, min_y);
        }
        if height < real_y {
            wrap::wrap_t(pixels, real_x, tile.mask_t, tile.mirror_t, real_y);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn upload<B: Backend + ?Sized>(&mut self, backend: &mut B, tmu: usize, pixels: &[u32], width: u32, height: u32,
                                   lod: u32, aspect: i32) -> Result<TextureHandle, BackendError> {
        let upload = TextureUpload { width: width, height: height, lod: lod, aspect: aspect, pixels: pixels };

        let handle = match backend.upload_texture(tmu, &upload) {
            Ok(handle) => handle,
            Err(BackendError::OutOfTextureMemory { needed, available }) => {
                warn!(target: "TEXCACHE", "out of texture memory ({} needed, {} available), clearing cache", needed, available);
                self.evict_all(backend);
                backend.upload_texture(tmu, &upload).map_err(|e| {
                    error!(target: "TEXCACHE", "texture upload failed after clearing the cache: {}", e);
                    e
                })?
            },
            Err(e) => return Err(e),
        };

        self.stats.uploads += 1;
        Ok(handle)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::backend::{CommandBufferBackend, RenderCommand, RenderCommandBuffer};
    use crate::backend::tests::drain;
    use modifier::ModifierOp;

    pub(crate) struct Fixture {
        pub tmem       : Box<[u8; TMEM_SIZE]>,
        pub palette    : [u16; 256],
        pub pal_8_crc  : [u32; 16],
        pub pal_256_crc: u32,
        pub tlut_mode  : u8,
        pub set_by     : u8,
    }

    impl Fixture {
        pub fn new() -> Fixture {
            Fixture { tmem: Box::new([0u8; TMEM_SIZE]), palette: [0; 256], pal_8_crc: [0; 16], pal_256_crc: 0, tlut_mode: 0, set_by: 1 }
        }

        pub fn source(&self) -> TextureSource<'_> {
            TextureSource {
                tmem       : &self.tmem,
                palette    : &self.palette,
                pal_8_crc  : &self.pal_8_crc,
                pal_256_crc: self.pal_256_crc,
                tlut_mode  : self.tlut_mode,
                set_by     : self.set_by,
            }
        }
    }

    // 32x32 RGBA16 at the start of TMEM
    pub(crate) fn rgba16_tile(size: u32) -> Tile {
        Tile {
            format: 0,
            size  : 2,
            line  : size * 2 / 8,
            lr_s  : size - 1,
            lr_t  : size - 1,
            ..Default::default()
        }
    }

    fn backend(memory: usize) -> (CommandBufferBackend, Arc<RenderCommandBuffer>) {
        let buffer = Arc::new(RenderCommandBuffer::with_capacity(4096));
        (CommandBufferBackend::new(buffer.clone(), memory), buffer)
    }

    fn uploads(buffer: &RenderCommandBuffer) -> usize {
        drain(buffer).iter().filter(|c| matches!(c, RenderCommand::UploadTexture { .. })).count()
    }

    fn probe_or_load(cache: &mut TextureCache, backend: &mut CommandBufferBackend, tile: &mut Tile, fx: &Fixture) -> usize {
        let src = fx.source();
        let (info, found) = cache.probe(tile, &src, None);
        match found {
            Some(index) => index,
            None => cache.load(backend, tile, &info, &src, None, 0).expect("load"),
        }
    }

    #[test]
    fn test_tex_info_sizes() {
        let fx = Fixture::new();
        let mut tile = rgba16_tile(32);
        let info = tex_info(&mut tile, &fx.source());
        assert_eq!((info.width, info.height), (32, 32));
        assert_eq!((tile.width, tile.height), (32, 32));
        assert_eq!(info.wid_64, 8);
        assert_eq!(info.flags, 0);

        // a mask smaller than the tile wraps
        let mut tile = rgba16_tile(32);
        tile.mask_s = 4;
        tile.mirror_s = true;
        let info = tex_info(&mut tile, &fx.source());
        assert_eq!(info.width, 16);
        assert_eq!(tile.width, 16);
        assert_eq!(info.flags, (1 << 22) | (4 << 18));

        // clamped: load the smaller of mask and tile, keep the tile size
        let mut tile = rgba16_tile(32);
        tile.mask_s = 4;
        tile.clamp_s = true;
        let info = tex_info(&mut tile, &fx.source());
        assert_eq!(info.width, 16);
        assert_eq!(tile.width, 32);
    }

    #[test]
    fn test_tex_info_shrinks_tile_that_wraps_tmem() {
        let fx = Fixture::new();
        // 64 rows of 64 bytes from tmem word 0x100
        let mut tile = rgba16_tile(32);
        tile.line = 8;
        tile.lr_t = 63;
        tile.t_mem = 0x100;
        tile.clamp_t = true;

        let info = tex_info(&mut tile, &fx.source());
        // (4096 - 0x100) / 64 rows are kept
        assert_eq!(tile.lr_t, 59);
        assert_eq!(tile.mask_t, 6);
        assert!(!tile.clamp_t);
        assert_eq!(info.tile_height, 60);
        assert_eq!(info.height, 64);
    }

    #[test]
    fn test_tex_info_tmem_overrun_counts_t_mem_in_words() {
        let fx = Fixture::new();
        // 0x100 + 40 * 64 fits even though 0x800 bytes + 40 rows would not
        let mut tile = rgba16_tile(32);
        tile.line = 8;
        tile.lr_t = 39;
        tile.t_mem = 0x100;
        tile.clamp_t = true;

        let info = tex_info(&mut tile, &fx.source());
        assert_eq!(tile.lr_t, 39);
        assert!(tile.clamp_t);
        assert_eq!(info.height, 40);
    }

    #[test]
    fn test_tex_info_inverted_or_huge_tile_is_bounded() {
        let fx = Fixture::new();
        let mut tile = rgba16_tile(32);
        tile.ul_s = 8;
        tile.lr_s = 4;
        let info = tex_info(&mut tile, &fx.source());
        assert_eq!(info.tile_width, 1);

        let mut tile = rgba16_tile(32);
        tile.lr_s = 0x7FF;
        tile.lr_t = 3;
        let info = tex_info(&mut tile, &fx.source());
        assert_eq!(info.tile_width, 1024);
        assert!(tile.width <= 1024);
    }

    #[test]
    fn test_palette_crc_is_added() {
        let mut fx = Fixture::new();
        let mut tile = rgba16_tile(16);
        tile.format = 2;
        tile.size = 0;
        tile.palette = 3;
        let mut copy = tile;
        let plain = tex_info(&mut copy, &fx.source()).crc;
        fx.pal_8_crc[3] = 0x1000;
        assert_eq!(tex_info(&mut tile, &fx.source()).crc, plain.wrapping_add(0x1000));

        tile.size = 1;
        fx.pal_256_crc = 0x20;
        let mut copy = tile;
        assert_eq!(tex_info(&mut copy, &fx.source()).crc.wrapping_sub(0x20),
                   tex_info(&mut tile, &Fixture::new().source()).crc);
    }

    #[test]
    fn test_same_texture_uploads_once() {
        let mut fx = Fixture::new();
        for (i, b) in fx.tmem.iter_mut().enumerate().take(32 * 64) {
            *b = (i % 251) as u8;
        }

        let (mut backend, buffer) = backend(64 << 20);
        let mut cache = TextureCache::new(MAX_CACHE);

        let mut tile = rgba16_tile(32);
        let first = probe_or_load(&mut cache, &mut backend, &mut tile, &fx);
        let mut tile = rgba16_tile(32);
        let second = probe_or_load(&mut cache, &mut backend, &mut tile, &fx);

        assert_eq!(first, second);
        assert_eq!(uploads(&buffer), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, evictions: 0, uploads: 1 });

        let e = cache.entry(first).expect("entry");
        assert_eq!((e.real_x, e.real_y, e.lod, e.aspect), (32, 32, 5, 0));
        assert_eq!(e.scale, 8.0);
        assert_eq!(e.c_off, 4.0);
    }

    #[test]
    fn test_capacity_overflow_evicts_everything_once() {
        let mut fx = Fixture::new();
        let (mut backend, buffer) = backend(64 << 20);
        let mut cache = TextureCache::new(4);

        let mut indices = vec![];
        for n in 0..5u8 {
            fx.tmem[0] = n + 1;
            let mut tile = rgba16_tile(8);
            indices.push(probe_or_load(&mut cache, &mut backend, &mut tile, &fx));
        }

        assert_eq!(indices, vec![0, 1, 2, 3, 0]);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 1);

        let commands = drain(&buffer);
        assert_eq!(commands.iter().filter(|c| **c == RenderCommand::ReleaseTextures).count(), 1);

        // the first texture was evicted
        fx.tmem[0] = 1;
        let mut tile = rgba16_tile(8);
        let (_, found) = cache.probe(&mut tile, &fx.source(), None);
        assert_eq!(found, None);
    }

    #[test]
    fn test_out_of_texture_memory_retries_once() {
        let fx = Fixture::new();
        // room for exactly one 8x8 texture
        let (mut backend, _buffer) = backend(8 * 8 * 4);
        let mut cache = TextureCache::new(MAX_CACHE);

        let mut tile = rgba16_tile(8);
        probe_or_load(&mut cache, &mut backend, &mut tile, &fx);

        let mut tile = rgba16_tile(8);
        tile.mirror_s = true;
        let index = probe_or_load(&mut cache, &mut backend, &mut tile, &fx);
        assert_eq!(index, 0);
        assert_eq!(cache.stats().evictions, 1);

        // too big even for an empty backend
        let mut tile = rgba16_tile(16);
        let src = fx.source();
        let (info, _) = cache.probe(&mut tile, &src, None);
        let result = cache.load(&mut backend, &tile, &info, &src, None, 0);
        assert!(matches!(result, Err(BackendError::OutOfTextureMemory { .. })));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_modifier_is_part_of_the_key() {
        let fx = Fixture::new();
        let (mut backend, _buffer) = backend(64 << 20);
        let mut cache = TextureCache::new(MAX_CACHE);
        let m = TexModifier { op: ModifierOp::TexMulCol, color0: 0x8080_80FF, color1: 0, color2: 0, factor: 0 };

        let mut tile = rgba16_tile(8);
        let src = fx.source();
        let (info, _) = cache.probe(&mut tile, &src, Some(&m));
        let index = cache.load(&mut backend, &tile, &info, &src, Some(m), 0).expect("load");

        assert_eq!(cache.probe(&mut tile, &src, None).1, None);
        assert_eq!(cache.probe(&mut tile, &src, Some(&m)).1, Some(index));
        // low nibbles are ignored for non-CI formats
        let close = TexModifier { color0: 0x8F8F_8FFF, ..m };
        assert_eq!(cache.probe(&mut tile, &src, Some(&close)).1, Some(index));
    }

    #[test]
    fn test_non_square_aspect() {
        let fx = Fixture::new();
        let (mut backend, _buffer) = backend(64 << 20);
        let mut cache = TextureCache::new(MAX_CACHE);

        let mut tile = rgba16_tile(32);
        tile.lr_t = 7;
        let index = probe_or_load(&mut cache, &mut backend, &mut tile, &fx);
        let e = cache.entry(index).expect("entry");
        assert_eq!((e.real_x, e.real_y, e.aspect), (32, 8, 2));
        assert_eq!(e.scale_y, 0.25);

        let mut tile = rgba16_tile(4);
        tile.lr_t = 63;
        tile.line = 1;
        let index = probe_or_load(&mut cache, &mut backend, &mut tile, &fx);
        let e = cache.entry(index).expect("entry");
        assert_eq!((e.real_x, e.real_y, e.aspect), (8, 64, -3));
        // only 4 of the 8 texels per row are real
        assert_eq!(e.scale_x, 0.125 * 0.5);
    }

    proptest! {
        #[test]
        fn prop_identical_tmem_is_deduplicated(seed in any::<u64>(), size_log in 2u32..6, mask_s in 0u8..5) {
            let mut fx = Fixture::new();
            let mut x = seed;
            for b in fx.tmem.iter_mut() {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                *b = (x >> 56) as u8;
            }

            let (mut backend, buffer) = backend(64 << 20);
            let mut cache = TextureCache::new(MAX_CACHE);

            let size = 1 << size_log;
            let mut a = rgba16_tile(size);
            a.mask_s = mask_s;
            let mut b = a;

            let first = probe_or_load(&mut cache, &mut backend, &mut a, &fx);
            let second = probe_or_load(&mut cache, &mut backend, &mut b, &fx);
            prop_assert_eq!(first, second);
            prop_assert_eq!(uploads(&buffer), 1);
        }
    }
}
