//! Texture modifiers: combiner equations that only involve the texel and constant colors
//! are baked into the texture at load time. `inter(a, b, c)` below is `a * (1 - c) + b * c`.

use num_traits::clamp;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModifierOp {
    // inter(tex, color0, factor)
    TexInterColorUsingFactor,
    // inter(tex, color0, color1)
    TexInterColUsingCol1,
    // color0 - tex, alpha included
    FullColorSubTex,
    // inter(color0, color1, tex)
    ColInterCol1UsingTex,
    // inter(color0, color1, tex alpha)
    ColInterCol1UsingTexa,
    // inter(color0, color1, tex alpha) * tex
    ColInterCol1UsingTexaMulTex,
    // inter(color0, tex, tex alpha)
    ColInterTexUsingTexa,
    // inter(color2, inter(color0, color1, tex), tex alpha)
    Col2InterColInterCol1UsingTexUsingTexa,
    // alpha = tex alpha * factor + (1 - factor)
    TexScaleFacAddFac,
    // (tex - color0) * factor + tex
    TexSubColMulFacAddTex,
    // tex * color0 + color1
    TexScaleColAddCol,
    TexAddCol,
    TexSubCol,
    // (tex - color0) * factor
    TexSubColMulFac,
    // inter(color0, tex, color1)
    ColInterTexUsingCol1,
    // color0 * tex alpha + tex
    ColMulTexaAddTex,
    // inter(color0, tex, tex)
    ColInterTexUsingTex,
    // inter(tex, noise, color0)
    TexInterNoiseUsingCol,
    // inter(tex, color0, tex alpha)
    TexInterColUsingTexa,
    TexMulCol,
    // tex * factor + color0
    TexScaleFacAddCol,
}

/// A modifier and its constants. Colors are RGBA8888 with red in the top byte.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TexModifier {
    pub op    : ModifierOp,
    pub color0: u32,
    pub color1: u32,
    pub color2: u32,
    pub factor: u8,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Rgba {
    r: f32,
    g: f32,
    b: f32,
    a: f32,
}

impl Rgba {
    fn from_u32(c: u32) -> Rgba {
        Rgba {
            r: (c >> 24) as u8 as f32 / 255.0,
            g: (c >> 16) as u8 as f32 / 255.0,
            b: (c >>  8) as u8 as f32 / 255.0,
            a:  c        as u8 as f32 / 255.0,
        }
    }

    fn to_u32(self) -> u32 {
        let q = |v: f32| (clamp(v, 0.0, 1.0) * 255.0 + 0.5) as u32;
        (q(self.r) << 24) | (q(self.g) << 16) | (q(self.b) << 8) | q(self.a)
    }

    fn splat(v: f32) -> Rgba {
        Rgba { r: v, g: v, b: v, a: v }
    }

    // apply f per channel to rgb, keep alpha from self
    fn rgb(self, other: Rgba, f: impl Fn(f32, f32) -> f32) -> Rgba {
        Rgba { r: f(self.r, other.r), g: f(self.g, other.g), b: f(self.b, other.b), a: self.a }
    }
}

fn inter(a: f32, b: f32, c: f32) -> f32 {
    a * (1.0 - c) + b * c
}

fn inter_rgb(a: Rgba, b: Rgba, c: Rgba, alpha: f32) -> Rgba {
    Rgba { r: inter(a.r, b.r, c.r), g: inter(a.g, b.g, c.g), b: inter(a.b, b.b, c.b), a: alpha }
}

impl TexModifier {
    /// Two modifiers produce the same texture when they use the same operation and their
    /// colors agree under `mask` and their factors are close.
    pub fn matches(&self, other: &TexModifier, mask: u32) -> bool {
        self.op == other.op
            && (self.color0 & mask) == (other.color0 & mask)
            && (self.color1 & mask) == (other.color1 & mask)
            && (self.color2 & mask) == (other.color2 & mask)
            && (self.factor as i32 - other.factor as i32).abs() < 8
    }

    /// Apply to RGBA8888 texels in place. `noise_seed` drives the noise input and is
    /// advanced per texel.
    pub fn apply(&self, pixels: &mut [u32], noise_seed: &mut u32) {
        let c0 = Rgba::from_u32(self.color0);
        let c1 = Rgba::from_u32(self.color1);
        let c2 = Rgba::from_u32(self.color2);
        let f = self.factor as f32 / 255.0;

        for p in pixels.iter_mut() {
            let t = Rgba::from_u32(*p);
            let ta = Rgba::splat(t.a);

            let out = match self.op {
                ModifierOp::TexInterColorUsingFactor => inter_rgb(t, c0, Rgba::splat(f), t.a),
                ModifierOp::TexInterColUsingCol1 => inter_rgb(t, c0, c1, t.a),
                ModifierOp::FullColorSubTex => Rgba {
                    r: c0.r - t.r, g: c0.g - t.g, b: c0.b - t.b, a: c0.a - t.a,
                },
                ModifierOp::ColInterCol1UsingTex => inter_rgb(c0, c1, t, t.a),
                ModifierOp::ColInterCol1UsingTexa => inter_rgb(c0, c1, ta, t.a),
                ModifierOp::ColInterCol1UsingTexaMulTex => inter_rgb(c0, c1, ta, t.a).rgb(t, |a, b| a * b),
                ModifierOp::ColInterTexUsingTexa => inter_rgb(c0, t, ta, t.a),
                ModifierOp::Col2InterColInterCol1UsingTexUsingTexa => {
                    let mid = inter_rgb(c0, c1, t, t.a);
                    inter_rgb(c2, mid, ta, t.a)
                },
                ModifierOp::TexScaleFacAddFac => Rgba { a: t.a * f + (1.0 - f), ..t },
                ModifierOp::TexSubColMulFacAddTex => t.rgb(c0, |t, c| (t - c) * f + t),
                ModifierOp::TexScaleColAddCol => {
                    t.rgb(c0, |t, c| t * c).rgb(c1, |s, c| s + c)
                },
                ModifierOp::TexAddCol => t.rgb(c0, |t, c| t + c),
                ModifierOp::TexSubCol => t.rgb(c0, |t, c| t - c),
                ModifierOp::TexSubColMulFac => t.rgb(c0, |t, c| (t - c) * f),
                ModifierOp::ColInterTexUsingCol1 => inter_rgb(c0, t, c1, t.a),
                ModifierOp::ColMulTexaAddTex => t.rgb(c0, |t, c| c * ta.a + t),
                ModifierOp::ColInterTexUsingTex => inter_rgb(c0, t, t, t.a),
                ModifierOp::TexInterNoiseUsingCol => {
                    *noise_seed = noise_seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    let noise = Rgba::splat(((*noise_seed >> 16) & 0xFF) as f32 / 255.0);
                    inter_rgb(t, noise, c0, t.a)
                },
                ModifierOp::TexInterColUsingTexa => inter_rgb(t, c0, ta, t.a),
                ModifierOp::TexMulCol => t.rgb(c0, |t, c| t * c),
                ModifierOp::TexScaleFacAddCol => t.rgb(c0, |t, c| t * f + c),
            };

            *p = out.to_u32();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modifier(op: ModifierOp, color0: u32, color1: u32, factor: u8) -> TexModifier {
        TexModifier { op: op, color0: color0, color1: color1, color2: 0, factor: factor }
    }

    fn apply_one(m: &TexModifier, texel: u32) -> u32 {
        let mut px = [texel];
        let mut seed = 1;
        m.apply(&mut px, &mut seed);
        px[0]
    }

    #[test]
    fn test_matches_uses_mask_and_factor_tolerance() {
        let a = modifier(ModifierOp::TexMulCol, 0x8040_20FF, 0, 100);
        let b = modifier(ModifierOp::TexMulCol, 0x8F4F_2FFF, 0, 107);
        assert!(a.matches(&b, 0xF0F0_F0F0));
        assert!(!a.matches(&b, 0xFFFF_FFFF));

        let c = TexModifier { factor: 108, ..b };
        assert!(!a.matches(&c, 0xF0F0_F0F0));

        let d = TexModifier { op: ModifierOp::TexAddCol, ..a };
        assert!(!a.matches(&d, 0xF0F0_F0F0));
    }

    #[test]
    fn test_tex_mul_col() {
        let m = modifier(ModifierOp::TexMulCol, 0xFF80_00FF, 0, 0);
        assert_eq!(apply_one(&m, 0xFFFF_FF40), 0xFF80_0040);
    }

    #[test]
    fn test_tex_add_and_sub_saturate() {
        let add = modifier(ModifierOp::TexAddCol, 0x8080_8000, 0, 0);
        assert_eq!(apply_one(&add, 0xC000_4020), 0xFF80_C020);

        let sub = modifier(ModifierOp::TexSubCol, 0x8080_8000, 0, 0);
        assert_eq!(apply_one(&sub, 0xC000_FF20), 0x4000_7F20);
    }

    #[test]
    fn test_color_interpolation_by_texel() {
        // black texel picks color0, white picks color1
        let m = modifier(ModifierOp::ColInterCol1UsingTex, 0x1020_30FF, 0xF0E0_D0FF, 0);
        assert_eq!(apply_one(&m, 0x0000_0077), 0x1020_3077);
        assert_eq!(apply_one(&m, 0xFFFF_FF77), 0xF0E0_D077);
    }

    #[test]
    fn test_alpha_scale() {
        let m = modifier(ModifierOp::TexScaleFacAddFac, 0, 0, 0);
        // factor 0 makes the texture opaque
        assert_eq!(apply_one(&m, 0x1234_5600), 0x1234_56FF);
        let m = modifier(ModifierOp::TexScaleFacAddFac, 0, 0, 0xFF);
        assert_eq!(apply_one(&m, 0x1234_5680), 0x1234_5680);
    }

    #[test]
    fn test_full_color_sub_tex_touches_alpha() {
        let m = modifier(ModifierOp::FullColorSubTex, 0xFFFF_FFFF, 0, 0);
        assert_eq!(apply_one(&m, 0x00FF_40F0), 0xFF00_BF0F);
    }

    #[test]
    fn test_noise_is_deterministic() {
        let m = modifier(ModifierOp::TexInterNoiseUsingCol, 0xFFFF_FFFF, 0, 0);
        let mut a = [0u32; 8];
        let mut b = [0u32; 8];
        let (mut sa, mut sb) = (7, 7);
        m.apply(&mut a, &mut sa);
        m.apply(&mut b, &mut sb);
        assert_eq!(a, b);
        assert_eq!(sa, sb);
        assert_ne!(sa, 7);
    }
}
