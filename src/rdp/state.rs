//! Lazy propagation of RDP state to the backend. Handlers only set bits in `update`; the
//! draw paths call `update_state()` which sends whatever changed.

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::GfxError;
use crate::backend::{Backend, BackendError, ClampMode, FilterMode, Rect};
use crate::combine::{BlendState, CombineState, CombinerCycle};
use crate::texcache::TextureSource;
use crate::texcache::modifier::TexModifier;

use super::{Rdp, Tile, UPDATE_BLEND, UPDATE_COMBINE, UPDATE_SCISSOR, UPDATE_TEXTURE};

/// Backend wrap mode for one axis of a tile
fn clamp_mode(clamp: bool, mirror: bool, mask: u8, force_mirror: bool, force_wrap: bool) -> ClampMode {
    if force_mirror {
        ClampMode::Mirror
    } else if force_wrap {
        ClampMode::Wrap
    } else if mirror && mask != 0 {
        ClampMode::Mirror
    } else if clamp || mask == 0 {
        ClampMode::Clamp
    } else {
        ClampMode::Wrap
    }
}

impl<B: Backend> Rdp<B> {
    pub(super) fn combine_state(&self) -> CombineState {
        let cycles = [CombinerCycle::from_packed(self.cycle1), CombinerCycle::from_packed(self.cycle2)];
        CombineState {
            cycle_mode   : self.cycle_mode,
            cycles       : cycles,
            prim_color   : self.prim_color,
            env_color    : self.env_color,
            fog_color    : self.fog_color,
            blend_color  : self.blend_color,
            fill_color   : self.fill_color,
            prim_lod_frac: self.prim_lodfrac,
            key_center   : self.key_center,
            key_scale    : self.key_scale,
            k4           : self.k4,
            k5           : self.k5,
            texture_mask : CombineState::texture_usage(self.cycle_mode, &cycles),
        }
    }

    /// Send pending combiner, blender, scissor and texture changes to the backend
    pub(super) fn update_state(&mut self) {
        if (self.update & UPDATE_COMBINE) != 0 {
            self.update &= !UPDATE_COMBINE;

            let mut combine = self.combine_state();
            let tex = combine.texture_mask;

            let modifier = if tex != 0 && !self.tweakables.disable_modifiers {
                combine.extract_modifier()
            } else {
                None
            };

            if tex != self.tex || modifier != self.modifier {
                self.update |= UPDATE_TEXTURE;
            }
            self.tex = tex;
            self.modifier = modifier;

            trace!(target: "RDP", "combine: cycle mode {}, textures {:#b}, modifier {:?}", self.cycle_mode, tex, modifier.map(|m| m.op));
            self.backend.set_combine(&combine);
        }

        if (self.update & UPDATE_BLEND) != 0 {
            self.update &= !UPDATE_BLEND;

            let blend = BlendState::from_othermode(self.othermode_l, self.cycle_mode, self.blend_color);
            if self.blend != Some(blend) {
                self.backend.set_blend(&blend);
                self.blend = Some(blend);
            }
        }

        if (self.update & UPDATE_SCISSOR) != 0 {
            self.update_scissor();
        }

        if (self.update & UPDATE_TEXTURE) != 0 {
            self.update &= !UPDATE_TEXTURE;
            self.load_textures();
        }
    }

    /// Scale the console scissor to output pixels and hand it to the backend
    pub(super) fn update_scissor(&mut self) {
        self.update &= !UPDATE_SCISSOR;

        let res_x = self.settings.res_x;
        let res_y = self.settings.res_y;
        let scale = |v: u32, s: f32, o: f32, max: u32| -> u32 { ((v as f32 * s + o).max(0.0) as u32).min(max) };

        self.scissor = Rect {
            ul_x: scale(self.scissor_o.ul_x, self.scale_x, self.offset_x, res_x),
            ul_y: scale(self.scissor_o.ul_y, self.scale_y, self.offset_y, res_y),
            lr_x: scale(self.scissor_o.lr_x, self.scale_x, self.offset_x, res_x),
            lr_y: scale(self.scissor_o.lr_y, self.scale_y, self.offset_y, res_y),
        };

        trace!(target: "RDP", "scissor ({},{}) -> ({},{})", self.scissor.ul_x, self.scissor.ul_y, self.scissor.lr_x, self.scissor.lr_y);
        self.backend.set_scissor(self.scissor);
    }

    // find or build the textures for the current tile (and the next one when the combiner
    // samples texel 1) and bind them
    fn load_textures(&mut self) {
        self.cur_cache = [None; 2];
        if self.tex == 0 || self.tweakables.disable_textures {
            return;
        }

        let modifier = self.modifier;
        for i in 0..2 {
            if (self.tex & (1 << i)) == 0 {
                continue;
            }

            let tmu = if self.tex == 3 { i } else { 0 };
            let evictions = self.cache.stats().evictions;

            let m = if i == 0 { modifier } else { None };
            match self.load_tile_texture((self.cur_tile + i) & 7, m, tmu) {
                Ok(index) => self.cur_cache[i] = Some(index),
                Err(e) => {
                    error!(target: "RDP", "unable to load texture for tile {}: {}", (self.cur_tile + i) & 7, e);
                    self.fault = Some(GfxError::Backend(e));
                    self.halt = true;
                    return;
                },
            };

            // loading texel 1 threw texel 0 out of the cache
            if i == 1 && self.cur_cache[0].is_some() && self.cache.stats().evictions != evictions {
                debug!(target: "RDP", "texel 0 evicted while loading texel 1, reloading");
                match self.load_tile_texture(self.cur_tile & 7, modifier, 0) {
                    Ok(index) => self.cur_cache[0] = Some(index),
                    Err(e) => {
                        error!(target: "RDP", "unable to reload texture for tile {}: {}", self.cur_tile & 7, e);
                        self.fault = Some(GfxError::Backend(e));
                        self.halt = true;
                        return;
                    },
                };
            }
        }
    }

    fn load_tile_texture(&mut self, t: usize, modifier: Option<TexModifier>, tmu: usize) -> Result<usize, BackendError> {
        let mut tile = self.tiles[t];
        let src = TextureSource {
            tmem       : &self.tmem,
            palette    : &self.palette,
            pal_8_crc  : &self.pal_8_crc,
            pal_256_crc: self.pal_256_crc,
            tlut_mode  : self.tlut_mode,
            set_by     : self.timg.set_by,
        };

        let (info, found) = self.cache.probe(&mut tile, &src, modifier.as_ref());
        let index = match found {
            Some(index) => index,
            None => self.cache.load(&mut self.backend, &tile, &info, &src, modifier, tmu)?,
        };
        self.tiles[t] = tile;

        self.bind_texture(index, &tile, tmu);
        Ok(index)
    }

    fn bind_texture(&mut self, index: usize, tile: &Tile, tmu: usize) {
        let entry = match self.cache.entry(index) {
            Some(entry) => entry,
            None => return,
        };

        let clamp = [
            clamp_mode(tile.clamp_s, tile.mirror_s, tile.mask_s, entry.f_mirror_s, entry.f_wrap_s),
            clamp_mode(tile.clamp_t, tile.mirror_t, tile.mask_t, entry.f_mirror_t, entry.f_wrap_t),
        ];

        let filter = match self.settings.filtering {
            1 => FilterMode::Bilinear,
            2 => FilterMode::Point,
            _ => if self.filter_mode == 2 { FilterMode::Bilinear } else { FilterMode::Point },
        };

        self.backend.bind_texture(tmu, entry.handle, clamp, filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::tests::*;
    use crate::Addressable;
    use crate::backend::RenderCommand;

    // color = TEXEL0, alpha = TEXEL0 in both cycles
    const COMBINE_TEXEL0: (u32, u32) = (0xFCFF_FFFF, 0xFFFC_F279);

    fn prepare_rgba16_32x32(rdp: &mut Rdp) {
        for i in 0..(32 * 32 * 2 / 4) {
            rdp.rdram.write_u32(0x1234_5678u32.wrapping_mul(i as u32 + 1), 0x2000 + i * 4);
        }
        rdp.run_command(COMBINE_TEXEL0.0, COMBINE_TEXEL0.1);
        // timg RGBA16 width 32 at 0x2000, tile 0 line 8, load 32x32
        rdp.run_command(0xFD10_001F, 0x0000_2000);
        rdp.run_command(0xF510_1000, 0x0000_0000);
        rdp.run_command(0xF400_0000, 0x0007_C07C);
        rdp.run_command(0xF200_0000, 0x0007_C07C);
    }

    #[test]
    fn test_clamp_modes() {
        assert_eq!(clamp_mode(true, false, 5, false, false), ClampMode::Clamp);
        assert_eq!(clamp_mode(false, true, 5, false, false), ClampMode::Mirror);
        assert_eq!(clamp_mode(false, false, 5, false, false), ClampMode::Wrap);
        // no mask: nothing to repeat
        assert_eq!(clamp_mode(false, true, 0, false, false), ClampMode::Clamp);
        assert_eq!(clamp_mode(true, false, 5, false, true), ClampMode::Wrap);
    }

    #[test]
    fn test_same_texture_is_uploaded_once() {
        let mut rdp = test_rdp(0x1_0000);
        prepare_rgba16_32x32(&mut rdp);

        rdp.update_state();
        assert_eq!(rdp.tex, 1);
        assert_eq!(rdp.cur_cache, [Some(0), None]);

        // same data loaded again
        rdp.run_command(0xF400_0000, 0x0007_C07C);
        rdp.update_state();
        assert_eq!(rdp.cur_cache, [Some(0), None]);

        let commands = rdp.commands();
        let uploads = commands.iter().filter(|c| matches!(c, RenderCommand::UploadTexture { .. })).count();
        let binds = commands.iter().filter(|c| matches!(c, RenderCommand::BindTexture { .. })).count();
        assert_eq!(uploads, 1);
        assert_eq!(binds, 2);
        assert_eq!(rdp.cache_stats().hits, 1);
    }

    #[test]
    fn test_cache_capacity_overflow_through_interpreter() {
        let settings = crate::Settings { fb_emulation: false, cache_capacity: 2, ..Default::default() };
        let mut rdp = test_rdp_with(0x1_0000, settings);
        prepare_rgba16_32x32(&mut rdp);

        for n in 0..3u32 {
            rdp.rdram.write_u32(0xCAFE_0000 | n, 0x2000);
            rdp.run_command(0xF400_0000, 0x0007_C07C);
            rdp.update_state();
            assert!(rdp.cur_cache[0].is_some());
        }

        let stats = rdp.cache_stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.uploads, 3);
        assert!(rdp.fault.is_none());
    }

    #[test]
    fn test_disabled_textures_bind_nothing() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.tweakables.disable_textures = true;
        prepare_rgba16_32x32(&mut rdp);
        rdp.update_state();
        assert_eq!(rdp.cur_cache, [None, None]);
        assert_eq!(rdp.cache_stats().uploads, 0);
    }

    #[test]
    fn test_scissor_is_scaled() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.scale_x = 2.0;
        rdp.scale_y = 2.0;
        // (8, 4) -> (320, 240)
        rdp.run_command(0xED02_0010, 0x0050_03C0);
        rdp.update_state();
        assert_eq!(rdp.scissor, Rect { ul_x: 16, ul_y: 8, lr_x: 640, lr_y: 480 });
        assert!(rdp.commands().contains(&RenderCommand::SetScissor(rdp.scissor)));
    }

    #[test]
    fn test_blend_sent_only_when_changed() {
        let mut rdp = test_rdp(0x1_0000);
        rdp.run_command(0xEF00_0000, 0x0000_0030);
        rdp.update_state();
        rdp.run_command(0xEF00_0000, 0x0000_0030);
        rdp.update_state();
        let blends = rdp.commands().iter().filter(|c| matches!(c, RenderCommand::SetBlend(_))).count();
        assert_eq!(blends, 1);
    }
}
