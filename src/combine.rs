#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::texcache::modifier::{ModifierOp, TexModifier};

/// Color combiner input, as selected by the A/B/C/D fields of SetCombine. The encoding of
/// each field differs, see the from_x() constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorInput {
    Combined,
    Texel0,
    Texel1,
    Primitive,
    Shade,
    Environment,
    One,
    Noise,
    KeyCenter,
    KeyScale,
    K4,
    K5,
    CombinedAlpha,
    Texel0Alpha,
    Texel1Alpha,
    PrimitiveAlpha,
    ShadeAlpha,
    EnvironmentAlpha,
    LodFraction,
    PrimLodFraction,
    Zero,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlphaInput {
    Combined,
    Texel0,
    Texel1,
    Primitive,
    Shade,
    Environment,
    One,
    LodFraction,
    PrimLodFraction,
    Zero,
}

// inputs 0-5 are shared by every color field
fn common_color(v: u8) -> Option<ColorInput> {
    Some(match v {
        0 => ColorInput::Combined,
        1 => ColorInput::Texel0,
        2 => ColorInput::Texel1,
        3 => ColorInput::Primitive,
        4 => ColorInput::Shade,
        5 => ColorInput::Environment,
        _ => return None,
    })
}

impl ColorInput {
    pub fn from_a(v: u8) -> ColorInput {
        common_color(v).unwrap_or(match v {
            6 => ColorInput::One,
            7 => ColorInput::Noise,
            _ => ColorInput::Zero,
        })
    }

    pub fn from_b(v: u8) -> ColorInput {
        common_color(v).unwrap_or(match v {
            6 => ColorInput::KeyCenter,
            7 => ColorInput::K4,
            _ => ColorInput::Zero,
        })
    }

    pub fn from_c(v: u8) -> ColorInput {
        common_color(v).unwrap_or(match v {
            6  => ColorInput::KeyScale,
            7  => ColorInput::CombinedAlpha,
            8  => ColorInput::Texel0Alpha,
            9  => ColorInput::Texel1Alpha,
            10 => ColorInput::PrimitiveAlpha,
            11 => ColorInput::ShadeAlpha,
            12 => ColorInput::EnvironmentAlpha,
            13 => ColorInput::LodFraction,
            14 => ColorInput::PrimLodFraction,
            15 => ColorInput::K5,
            _  => ColorInput::Zero,
        })
    }

    pub fn from_d(v: u8) -> ColorInput {
        common_color(v).unwrap_or(match v {
            6 => ColorInput::One,
            _ => ColorInput::Zero,
        })
    }

    fn uses_texel0(&self) -> bool {
        matches!(self, ColorInput::Texel0 | ColorInput::Texel0Alpha)
    }

    fn uses_texel1(&self) -> bool {
        matches!(self, ColorInput::Texel1 | ColorInput::Texel1Alpha)
    }
}

impl AlphaInput {
    /// Aa, Ab and Ad share one encoding
    pub fn from_abd(v: u8) -> AlphaInput {
        match v {
            0 => AlphaInput::Combined,
            1 => AlphaInput::Texel0,
            2 => AlphaInput::Texel1,
            3 => AlphaInput::Primitive,
            4 => AlphaInput::Shade,
            5 => AlphaInput::Environment,
            6 => AlphaInput::One,
            _ => AlphaInput::Zero,
        }
    }

    pub fn from_c(v: u8) -> AlphaInput {
        match v {
            0 => AlphaInput::LodFraction,
            1 => AlphaInput::Texel0,
            2 => AlphaInput::Texel1,
            3 => AlphaInput::Primitive,
            4 => AlphaInput::Shade,
            5 => AlphaInput::Environment,
            6 => AlphaInput::PrimLodFraction,
            _ => AlphaInput::Zero,
        }
    }
}

/// One combiner cycle: color = (a - b) * c + d, alpha = (aa - ab) * ac + ad
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CombinerCycle {
    pub a : ColorInput,
    pub b : ColorInput,
    pub c : ColorInput,
    pub d : ColorInput,
    pub aa: AlphaInput,
    pub ab: AlphaInput,
    pub ac: AlphaInput,
    pub ad: AlphaInput,
}

impl CombinerCycle {
    /// Decode from the packed per-cycle layout kept by the interpreter:
    /// a[3:0] b[7:4] c[12:8] d[15:13] Aa[18:16] Ab[21:19] Ac[24:22] Ad[27:25]
    pub fn from_packed(cycle: u32) -> CombinerCycle {
        CombinerCycle {
            a : ColorInput::from_a((cycle & 0x0F) as u8),
            b : ColorInput::from_b(((cycle >> 4) & 0x0F) as u8),
            c : ColorInput::from_c(((cycle >> 8) & 0x1F) as u8),
            d : ColorInput::from_d(((cycle >> 13) & 0x07) as u8),
            aa: AlphaInput::from_abd(((cycle >> 16) & 0x07) as u8),
            ab: AlphaInput::from_abd(((cycle >> 19) & 0x07) as u8),
            ac: AlphaInput::from_c(((cycle >> 22) & 0x07) as u8),
            ad: AlphaInput::from_abd(((cycle >> 25) & 0x07) as u8),
        }
    }

    fn color(&self) -> [ColorInput; 4] {
        [self.a, self.b, self.c, self.d]
    }

    fn alpha(&self) -> [AlphaInput; 4] {
        [self.aa, self.ab, self.ac, self.ad]
    }

    fn texture_usage(&self) -> u8 {
        let mut mask = 0;
        for c in self.color() {
            if c.uses_texel0() { mask |= 1; }
            if c.uses_texel1() { mask |= 2; }
        }
        for a in self.alpha() {
            if a == AlphaInput::Texel0 { mask |= 1; }
            if a == AlphaInput::Texel1 { mask |= 2; }
        }
        mask
    }
}

/// Pack the SetCombine command words into the two per-cycle values
pub fn unpack_set_combine(cmd0: u32, cmd1: u32) -> (u32, u32) {
    let a0  = (cmd0 >> 20) & 0x0F;
    let b0  = (cmd1 >> 28) & 0x0F;
    let c0  = (cmd0 >> 15) & 0x1F;
    let d0  = (cmd1 >> 15) & 0x07;
    let aa0 = (cmd0 >> 12) & 0x07;
    let ab0 = (cmd1 >> 12) & 0x07;
    let ac0 = (cmd0 >>  9) & 0x07;
    let ad0 = (cmd1 >>  9) & 0x07;

    let a1  = (cmd0 >>  5) & 0x0F;
    let b1  = (cmd1 >> 24) & 0x0F;
    let c1  =  cmd0        & 0x1F;
    let d1  = (cmd1 >>  6) & 0x07;
    let aa1 = (cmd1 >> 21) & 0x07;
    let ab1 = (cmd1 >>  3) & 0x07;
    let ac1 = (cmd1 >> 18) & 0x07;
    let ad1 =  cmd1        & 0x07;

    let cycle1 = a0 | (b0 << 4) | (c0 << 8) | (d0 << 13) | (aa0 << 16) | (ab0 << 19) | (ac0 << 22) | (ad0 << 25);
    let cycle2 = a1 | (b1 << 4) | (c1 << 8) | (d1 << 13) | (aa1 << 16) | (ab1 << 19) | (ac1 << 22) | (ad1 << 25);
    (cycle1, cycle2)
}

/// The combiner as handed to the backend
#[derive(Clone, Debug, PartialEq)]
pub struct CombineState {
    // 0 = 1 cycle, 1 = 2 cycle, 2 = copy, 3 = fill
    pub cycle_mode   : u8,
    pub cycles       : [CombinerCycle; 2],
    pub prim_color   : u32,
    pub env_color    : u32,
    pub fog_color    : u32,
    pub blend_color  : u32,
    pub fill_color   : u32,
    pub prim_lod_frac: u8,
    pub key_center   : u32,
    pub key_scale    : u32,
    pub k4           : u8,
    pub k5           : u8,
    // bit 0: texel 0 is sampled, bit 1: texel 1 is sampled
    pub texture_mask : u8,
}

impl CombineState {
    /// Which texels the combiner samples for this cycle mode
    pub fn texture_usage(cycle_mode: u8, cycles: &[CombinerCycle; 2]) -> u8 {
        match cycle_mode {
            0 => cycles[0].texture_usage(),
            1 => cycles[0].texture_usage() | cycles[1].texture_usage(),
            2 => 1,
            _ => 0,
        }
    }

    /// Look for combiner equations that can be evaluated in texture space. Returns the
    /// modifier and rewrites the affected cycle so the backend samples the modified texel
    /// directly.
    pub fn extract_modifier(&mut self) -> Option<TexModifier> {
        use ColorInput::*;

        let c0 = self.cycles[0];
        let prim = self.prim_color;
        let env  = self.env_color;
        let prim_a = (prim & 0xFF) as u8;
        let env_a  = (env & 0xFF) as u8;

        let color = |op, color0, color1, factor| Some(TexModifier { op: op, color0: color0, color1: color1, color2: 0, factor: factor });

        // two cycle equations first, they'd otherwise match on their first cycle alone
        if self.cycle_mode == 1 {
            let c1 = self.cycles[1];
            let found = match (c0.color(), c1.color()) {
                ([Primitive, Environment, Texel0Alpha, Environment], [Combined, Zero, Texel0, Zero]) =>
                    color(ModifierOp::ColInterCol1UsingTexaMulTex, env, prim, 0),
                ([Primitive, Environment, Texel0, Environment], [Combined, Environment, Texel0Alpha, Environment]) =>
                    Some(TexModifier { op: ModifierOp::Col2InterColInterCol1UsingTexUsingTexa, color0: env, color1: prim, color2: env, factor: 0 }),
                _ => None,
            };

            if found.is_some() {
                self.passthrough_color(0);
                self.passthrough_color(1);
                return found;
            }
        }

        let found = match c0.color() {
            [Texel0, Zero, Primitive, Zero]                  => color(ModifierOp::TexMulCol, prim, 0, 0),
            [Texel0, Zero, Environment, Zero]                => color(ModifierOp::TexMulCol, env, 0, 0),
            [Primitive, Environment, Texel0, Environment]    => color(ModifierOp::ColInterCol1UsingTex, env, prim, 0),
            [Primitive, Environment, Texel0Alpha, Environment] => color(ModifierOp::ColInterCol1UsingTexa, env, prim, 0),
            [Primitive, Texel0, PrimitiveAlpha, Texel0]      => color(ModifierOp::TexInterColorUsingFactor, prim, 0, prim_a),
            [Environment, Texel0, EnvironmentAlpha, Texel0]  => color(ModifierOp::TexInterColorUsingFactor, env, 0, env_a),
            [Primitive, Texel0, Texel0Alpha, Texel0]         => color(ModifierOp::TexInterColUsingTexa, prim, 0, 0),
            [Environment, Texel0, Texel0Alpha, Texel0]       => color(ModifierOp::TexInterColUsingTexa, env, 0, 0),
            [Primitive, Texel0, Environment, Texel0]         => color(ModifierOp::TexInterColUsingCol1, prim, env, 0),
            [Texel0, Zero, One, Primitive]                   => color(ModifierOp::TexAddCol, prim, 0, 0),
            [Texel0, Zero, One, Environment]                 => color(ModifierOp::TexAddCol, env, 0, 0),
            [Texel0, Primitive, One, Zero]                   => color(ModifierOp::TexSubCol, prim, 0, 0),
            [Texel0, Primitive, PrimitiveAlpha, Zero]        => color(ModifierOp::TexSubColMulFac, prim, 0, prim_a),
            [Texel0, Environment, EnvironmentAlpha, Texel0]  => color(ModifierOp::TexSubColMulFacAddTex, env, 0, env_a),
            [Texel0, Zero, Primitive, Environment]           => color(ModifierOp::TexScaleColAddCol, prim, env, 0),
            [Texel0, Zero, PrimLodFraction, Environment]     => color(ModifierOp::TexScaleFacAddCol, env, 0, self.prim_lod_frac),
            [Primitive, Zero, Texel0Alpha, Texel0]           => color(ModifierOp::ColMulTexaAddTex, prim, 0, 0),
            [Texel0, Primitive, Texel0, Primitive]           => color(ModifierOp::ColInterTexUsingTex, prim, 0, 0),
            [Texel0, Primitive, Texel0Alpha, Primitive]      => color(ModifierOp::ColInterTexUsingTexa, prim, 0, 0),
            [Texel0, Primitive, Environment, Primitive]      => color(ModifierOp::ColInterTexUsingCol1, prim, env, 0),
            [Primitive, Texel0, One, Zero]                   => color(ModifierOp::FullColorSubTex, prim, 0, 0),
            [Noise, Texel0, Primitive, Texel0]               => color(ModifierOp::TexInterNoiseUsingCol, prim, 0, 0),
            _ => None,
        };

        if found.is_some() {
            self.passthrough_color(0);
            return found;
        }

        // alpha only: ta * f + (1 - f)
        if c0.alpha() == [AlphaInput::Texel0, AlphaInput::One, AlphaInput::Primitive, AlphaInput::One] {
            self.cycles[0].aa = AlphaInput::Zero;
            self.cycles[0].ab = AlphaInput::Zero;
            self.cycles[0].ac = AlphaInput::Zero;
            self.cycles[0].ad = AlphaInput::Texel0;
            return color(ModifierOp::TexScaleFacAddFac, 0, 0, prim_a);
        }

        None
    }

    // color = (0 - 0) * 0 + texel0 (or the previous cycle)
    fn passthrough_color(&mut self, cycle: usize) {
        let c = &mut self.cycles[cycle];
        c.a = ColorInput::Zero;
        c.b = ColorInput::Zero;
        c.c = ColorInput::Zero;
        c.d = if cycle == 0 { ColorInput::Texel0 } else { ColorInput::Combined };
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlendMode {
    Opaque,
    // src * a + dst * (1 - a)
    AlphaBlend,
    // src + dst
    Additive,
    // mix with the fog color
    Fog,
    // framebuffer is left untouched
    Keep,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlphaCompare {
    None,
    // discard when alpha < threshold
    Threshold(u8),
    Dither,
}

/// Blender and depth state derived from the othermode words
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlendState {
    pub mode         : BlendMode,
    pub alpha_compare: AlphaCompare,
    pub depth_compare: bool,
    pub depth_update : bool,
    // depth comes from SetPrimDepth instead of per pixel
    pub depth_prim   : bool,
    pub decal        : bool,
}

impl BlendState {
    pub fn from_othermode(othermode_l: u32, cycle_mode: u8, blend_color: u32) -> BlendState {
        // blender inputs for the cycle that produces the final pixel
        let shift = if cycle_mode == 1 { 16 } else { 18 };
        let p = (othermode_l >> (shift + 12)) & 3;
        let a = (othermode_l >> (shift + 8)) & 3;
        let m = (othermode_l >> (shift + 4)) & 3;
        let b = (othermode_l >> shift) & 3;
        let force_blend = (othermode_l & 0x4000) != 0;

        let mode = if cycle_mode >= 2 {
            BlendMode::Opaque
        } else if !force_blend {
            BlendMode::Opaque
        } else if p == 0 && a == 0 && m == 1 && b == 0 {
            BlendMode::AlphaBlend
        } else if a == 3 && m == 1 && b == 2 {
            BlendMode::Keep
        } else if m == 1 && b == 2 {
            BlendMode::Additive
        } else if p == 3 || m == 3 {
            BlendMode::Fog
        } else {
            BlendMode::Opaque
        };

        let alpha_compare = match othermode_l & 3 {
            1 => AlphaCompare::Threshold((blend_color & 0xFF) as u8),
            3 => AlphaCompare::Dither,
            _ => AlphaCompare::None,
        };

        BlendState {
            mode         : mode,
            alpha_compare: alpha_compare,
            depth_compare: (othermode_l & 0x10) != 0,
            depth_update : (othermode_l & 0x20) != 0,
            depth_prim   : (othermode_l & 0x04) != 0,
            decal        : ((othermode_l >> 10) & 3) == 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // gsDPSetCombineMode(G_CC_MODULATEIDECALA, G_CC_MODULATEIDECALA) equivalent words
    // color (TEXEL0 - 0) * SHADE + 0, alpha (0 - 0) * 0 + TEXEL0
    fn modulate_combine() -> (u32, u32) {
        let a = 1u32;  let b = 8u32; let c = 4u32; let d = 7u32;
        let aa = 7u32; let ab = 7u32; let ac = 7u32; let ad = 1u32;
        let cmd0 = 0xFC00_0000 | (a << 20) | (c << 15) | (aa << 12) | (ac << 9) | (a << 5) | c;
        let cmd1 = (b << 28) | (b << 24) | (aa << 21) | (ac << 18) | (d << 15) | (ab << 12) | (ad << 9) | (d << 6) | (ab << 3) | ad;
        (cmd0, cmd1)
    }

    #[test]
    fn test_unpack_set_combine() {
        let (cmd0, cmd1) = modulate_combine();
        let (cycle1, cycle2) = unpack_set_combine(cmd0, cmd1);
        let c = CombinerCycle::from_packed(cycle1);
        assert_eq!([c.a, c.b, c.c, c.d], [ColorInput::Texel0, ColorInput::Zero, ColorInput::Shade, ColorInput::Zero]);
        assert_eq!([c.aa, c.ab, c.ac, c.ad], [AlphaInput::Zero, AlphaInput::Zero, AlphaInput::Zero, AlphaInput::Texel0]);
        assert_eq!(CombinerCycle::from_packed(cycle2), c);
    }

    #[test]
    fn test_input_encodings() {
        assert_eq!(ColorInput::from_a(7), ColorInput::Noise);
        assert_eq!(ColorInput::from_a(12), ColorInput::Zero);
        assert_eq!(ColorInput::from_b(6), ColorInput::KeyCenter);
        assert_eq!(ColorInput::from_c(7), ColorInput::CombinedAlpha);
        assert_eq!(ColorInput::from_c(15), ColorInput::K5);
        assert_eq!(ColorInput::from_c(31), ColorInput::Zero);
        assert_eq!(ColorInput::from_d(6), ColorInput::One);
        assert_eq!(AlphaInput::from_c(0), AlphaInput::LodFraction);
        assert_eq!(AlphaInput::from_c(6), AlphaInput::PrimLodFraction);
        assert_eq!(AlphaInput::from_abd(6), AlphaInput::One);
    }

    #[test]
    fn test_texture_usage() {
        let (cmd0, cmd1) = modulate_combine();
        let (cycle1, cycle2) = unpack_set_combine(cmd0, cmd1);
        let cycles = [CombinerCycle::from_packed(cycle1), CombinerCycle::from_packed(cycle2)];
        assert_eq!(CombineState::texture_usage(0, &cycles), 1);
        assert_eq!(CombineState::texture_usage(2, &cycles), 1);
        assert_eq!(CombineState::texture_usage(3, &cycles), 0);

        let mut t1 = cycles;
        t1[1].c = ColorInput::Texel1Alpha;
        assert_eq!(CombineState::texture_usage(0, &t1), 1);
        assert_eq!(CombineState::texture_usage(1, &t1), 3);
    }

    fn state_with(color: [ColorInput; 4]) -> CombineState {
        let mut cycle = CombinerCycle::from_packed(0);
        cycle.a = color[0]; cycle.b = color[1]; cycle.c = color[2]; cycle.d = color[3];
        CombineState {
            cycle_mode: 0, cycles: [cycle, cycle],
            prim_color: 0x8040_20FF, env_color: 0x1020_3040, fog_color: 0, blend_color: 0, fill_color: 0,
            prim_lod_frac: 0x80, key_center: 0, key_scale: 0, k4: 0, k5: 0, texture_mask: 1,
        }
    }

    #[test]
    fn test_extract_modifier() {
        use ColorInput::*;
        let mut state = state_with([Texel0, Zero, Primitive, Zero]);
        let m = state.extract_modifier().expect("tex * prim is a modifier");
        assert_eq!(m.op, ModifierOp::TexMulCol);
        assert_eq!(m.color0, 0x8040_20FF);
        assert_eq!(state.cycles[0].d, Texel0);
        assert_eq!(state.cycles[0].c, Zero);

        let mut state = state_with([Primitive, Environment, Texel0, Environment]);
        let m = state.extract_modifier().expect("lerp env->prim by tex");
        assert_eq!(m.op, ModifierOp::ColInterCol1UsingTex);
        assert_eq!((m.color0, m.color1), (0x1020_3040, 0x8040_20FF));

        let mut state = state_with([Texel0, Zero, Shade, Zero]);
        assert_eq!(state.extract_modifier(), None);
    }

    #[test]
    fn test_blend_from_othermode() {
        // G_RM_XLU_SURF: force blend, p=IN a=IN_A m=MEM b=1MA
        let xlu = 0x0000_4000 | (1 << 22) | (1 << 20);
        let blend = BlendState::from_othermode(xlu | 0x10, 0, 0);
        assert_eq!(blend.mode, BlendMode::AlphaBlend);
        assert!(blend.depth_compare);
        assert!(!blend.depth_update);

        let opaque = BlendState::from_othermode(0x0000_0030, 0, 0);
        assert_eq!(opaque.mode, BlendMode::Opaque);
        assert!(opaque.depth_update);

        let threshold = BlendState::from_othermode(0x0000_0001, 0, 0x0000_0080);
        assert_eq!(threshold.alpha_compare, AlphaCompare::Threshold(0x80));

        let decal = BlendState::from_othermode(0x0000_0C00, 0, 0);
        assert!(decal.decal);
    }
}
