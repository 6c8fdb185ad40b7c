//! Edge walker for the RDP's own triangle commands. Turns the edge coefficients of one
//! triangle into the handful of vertices that outline it, in console pixels.

/// Optional coefficient blocks following the edge words
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(super) struct TriangleKind {
    pub shade  : bool,
    pub texture: bool,
    pub zbuffer: bool,
}

impl TriangleKind {
    /// From the low three bits of the command: z-buffer, texture and shade
    pub fn from_opcode(op: u32) -> Self {
        Self {
            shade  : (op & 0x04) != 0,
            texture: (op & 0x02) != 0,
            zbuffer: (op & 0x01) != 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(super) struct EdgeVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    pub s: f32,
    pub t: f32,
    pub color: [u8; 4],
}

// interpolated attributes, fixed point as the command carries them
#[derive(Copy, Clone, Debug, Default)]
struct Attributes {
    r: i32,
    g: i32,
    b: i32,
    a: i32,
    z: i32,
    s: i32,
    t: i32,
    w: i32,
}

impl Attributes {
    fn step(&mut self, d: &Attributes, n: i32) {
        self.r = self.r.wrapping_add(d.r.wrapping_mul(n));
        self.g = self.g.wrapping_add(d.g.wrapping_mul(n));
        self.b = self.b.wrapping_add(d.b.wrapping_mul(n));
        self.a = self.a.wrapping_add(d.a.wrapping_mul(n));
        self.z = self.z.wrapping_add(d.z.wrapping_mul(n));
        self.s = self.s.wrapping_add(d.s.wrapping_mul(n));
        self.t = self.t.wrapping_add(d.t.wrapping_mul(n));
        self.w = self.w.wrapping_add(d.w.wrapping_mul(n));
    }
}

// 16.16 values are split over two words: integer parts in one, fractions in the other
fn hi(int: u32, frac: u32) -> i32 {
    ((int & 0xFFFF_0000) | ((frac >> 16) & 0xFFFF)) as i32
}

fn lo(int: u32, frac: u32) -> i32 {
    ((int << 16) | (frac & 0xFFFF)) as i32
}

fn color_channel(c: i32) -> u8 {
    (c.clamp(0, 0x3FF_0000) >> 18) as u8
}

/// Texture coordinate scale for a tile shift
pub(super) fn shift_factor(shift: u8) -> f32 {
    match shift {
        0 => 1.0,
        s if s > 10 => (1u32 << (16 - s as u32)) as f32,
        s => 1.0 / (1u32 << s) as f32,
    }
}

struct Emitter {
    kind: TriangleKind,
    persp: bool,
    // fixed depth replacing the interpolated one
    prim_depth: Option<f32>,
    dx: Attributes,
}

impl Emitter {
    fn texture_coord(&self, v: i32, w: i32) -> f32 {
        if self.persp {
            let w = if w != 0 { w as i64 } else { 1 };
            (((v as i64) << 20) / w) as f32 / 1024.0
        } else {
            v as f32 / (1u32 << 21) as f32
        }
    }

    // vertex at `x` on scanline `y`, `steps` whole pixels right of the attribute origin
    fn vertex(&self, x: i32, y: i32, at: &Attributes, steps: i32) -> EdgeVertex {
        let mut at = *at;
        at.step(&self.dx, steps);

        let w_int = at.w.wrapping_add(0xFFFF) >> 16;
        let w = if self.persp && w_int != 0 { 65536.0 / w_int as f32 } else { 1.0 };

        EdgeVertex {
            x: x as f32 / (1u32 << 18) as f32,
            y: y as f32 / 4.0,
            z: self.prim_depth.unwrap_or((at.z as u32) as f32 / 0xFFFF_0000u32 as f32),
            w: w,
            s: if self.kind.texture { self.texture_coord(at.s, at.w) } else { 0.0 },
            t: if self.kind.texture { self.texture_coord(at.t, at.w) } else { 0.0 },
            color: if self.kind.shade {
                [color_channel(at.r), color_channel(at.g), color_channel(at.b), color_channel(at.a)]
            } else {
                [0xFF; 4]
            },
        }
    }
}

/// Walk the edges of the triangle in `words` (the whole command). Returns the outline as a
/// triangle strip.
pub(super) fn walk(words: &[u32], kind: TriangleKind, persp: bool, prim_depth: Option<f32>) -> Vec<EdgeVertex> {
    let word = |i: usize| words.get(i).copied().unwrap_or(0);

    let w1 = word(0);
    let w2 = word(1);
    let flip = (w1 & 0x0080_0000) != 0;

    let mut yl = (w1 & 0x3FFF) as i32;
    let ym = ((w2 >> 16) & 0x3FFF) as i32;
    let mut yh = (w2 & 0x3FFF) as i32 & !3;

    let xl = (word(2) as i32).wrapping_shl(2);
    let dxldy = word(3) as i32;
    let xh = (word(4) as i32).wrapping_shl(2);
    let dxhdy = word(5) as i32;
    let xm = (word(6) as i32).wrapping_shl(2);
    let dxmdy = word(7) as i32;

    let shade_base = 8;
    let texture_base = shade_base + if kind.shade { 16 } else { 0 };
    let z_base = texture_base + if kind.texture { 16 } else { 0 };

    let mut at = Attributes { r: 0xFF, g: 0xFF, b: 0xFF, a: 0xFF, z: 0xFFFF_0000u32 as i32, s: 0, t: 0, w: 0x30000 };
    let mut dx = Attributes::default();
    let mut de = Attributes::default();

    if kind.shade {
        let c = |i: usize| word(shade_base + i);
        at.r = hi(c(0), c(4));
        at.g = lo(c(0), c(4));
        at.b = hi(c(1), c(5));
        at.a = lo(c(1), c(5));
        dx.r = hi(c(2), c(6));
        dx.g = lo(c(2), c(6));
        dx.b = hi(c(3), c(7));
        dx.a = lo(c(3), c(7));
        de.r = hi(c(8), c(12));
        de.g = lo(c(8), c(12));
        de.b = hi(c(9), c(13));
        de.a = lo(c(9), c(13));
    }

    if kind.texture {
        let c = |i: usize| word(texture_base + i);
        at.s = hi(c(0), c(4));
        at.t = lo(c(0), c(4));
        at.w = hi(c(1), c(5));
        dx.s = hi(c(2), c(6));
        dx.t = lo(c(2), c(6));
        dx.w = hi(c(3), c(7));
        de.s = hi(c(8), c(12));
        de.t = lo(c(8), c(12));
        de.w = hi(c(9), c(13));
    }

    if kind.zbuffer {
        at.z = word(z_base) as i32;
        dx.z = word(z_base + 1) as i32;
        de.z = word(z_base + 2) as i32;
    }

    at.r = at.r.wrapping_shl(2);
    at.g = at.g.wrapping_shl(2);
    at.b = at.b.wrapping_shl(2);
    at.a = at.a.wrapping_shl(2);
    for d in [&mut dx, &mut de] {
        d.s >>= 2;
        d.t >>= 2;
        d.z >>= 2;
        d.w >>= 2;
    }

    let emitter = Emitter { kind: kind, persp: persp, prim_depth: prim_depth, dx: dx };
    let past = |left: i32, right: i32| -> bool {
        if flip { left > right.wrapping_sub(0x10000) } else { left < right.wrapping_add(0x10000) }
    };

    let mut out = Vec::with_capacity(6);

    let mut xleft = xm;
    let mut xright = xh;
    let mut xleft_inc = dxmdy;
    let xright_inc = dxhdy;

    // skip empty scanlines at the top
    while yh < ym && !past(xleft, xright) {
        xleft = xleft.wrapping_add(xleft_inc);
        xright = xright.wrapping_add(xright_inc);
        at.step(&de, 1);
        yh += 1;
    }

    let j = ym - yh;
    if j > 0 {
        let steps = xleft.wrapping_sub(xright) >> 16;
        if !flip && xleft < xright || flip {
            out.push(emitter.vertex(xleft, yh, &at, steps));
        }
        if !flip || xleft > xright {
            out.push(emitter.vertex(xright, yh, &at, 0));
        }

        xleft = xleft.wrapping_add(xleft_inc.wrapping_mul(j));
        xright = xright.wrapping_add(xright_inc.wrapping_mul(j));
        // w can't become zero
        let w = at.w;
        at.step(&de, j);
        if at.w == 0 {
            at.w = w.wrapping_add(de.w.wrapping_mul(j - 1));
        }
    }

    if xl != xh {
        xleft = xl;
    }

    {
        let steps = xleft.wrapping_sub(xright) >> 16;
        if !flip && xleft <= xright || flip {
            out.push(emitter.vertex(xleft, ym, &at, steps));
        }
        if !flip || xleft >= xright {
            out.push(emitter.vertex(xright, ym, &at, 0));
        }
    }

    xleft_inc = dxldy;
    let mut j = yl - ym;
    xleft = xleft.wrapping_add(xleft_inc.wrapping_mul(j));
    xright = xright.wrapping_add(xright_inc.wrapping_mul(j));
    at.step(&de, j);

    // and at the bottom
    while yl > ym && !past(xleft, xright) {
        xleft = xleft.wrapping_sub(xleft_inc);
        xright = xright.wrapping_sub(xright_inc);
        at.step(&de, -1);
        j -= 1;
        yl -= 1;
    }

    if j >= 0 {
        let steps = xleft.wrapping_sub(xright) >> 16;
        if !flip && xleft <= xright || flip {
            out.push(emitter.vertex(xleft, yl, &at, steps));
        }
        if !flip || xleft >= xright {
            out.push(emitter.vertex(xright, yl, &at, 0));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // 10..20 pixels wide, rows 0 to 4, middle vertex at row 2
    fn box_edges(op: u32) -> Vec<u32> {
        vec![
            (op << 24) | 16,
            (8 << 16) | 0,
            0x000A_0000, 0,
            0x0014_0000, 0,
            0x000A_0000, 0,
        ]
    }

    #[test]
    fn test_kind_from_opcode() {
        assert_eq!(TriangleKind::from_opcode(0x08), TriangleKind::default());
        assert_eq!(TriangleKind::from_opcode(0x0F), TriangleKind { shade: true, texture: true, zbuffer: true });
        assert_eq!(TriangleKind::from_opcode(0x0A), TriangleKind { shade: false, texture: true, zbuffer: false });
    }

    #[test]
    fn test_fill_triangle_outline() {
        let v = walk(&box_edges(0x08), TriangleKind::from_opcode(0x08), false, None);
        let xy: Vec<(f32, f32)> = v.iter().map(|v| (v.x, v.y)).collect();
        assert_eq!(xy, vec![(10.0, 0.0), (20.0, 0.0), (10.0, 2.0), (20.0, 2.0), (10.0, 4.0), (20.0, 4.0)]);
        // no z buffer: far plane
        assert_eq!(v[0].z, 1.0);
        assert_eq!(v[0].w, 1.0);
        assert_eq!(v[0].color, [0xFF; 4]);
    }

    #[test]
    fn test_prim_depth_replaces_z() {
        let v = walk(&box_edges(0x09), TriangleKind::from_opcode(0x09), false, Some(0.5));
        assert!(v.iter().all(|v| v.z == 0.5));
    }

    #[test]
    fn test_shade_colors() {
        let mut words = box_edges(0x0C);
        let mut shade = vec![0u32; 16];
        // r = 255, g = 128, b = 0, a = 255
        shade[0] = 0x00FF_0080;
        shade[1] = 0x0000_00FF;
        words.extend(shade);

        let v = walk(&words, TriangleKind::from_opcode(0x0C), false, None);
        assert_eq!(v.len(), 6);
        assert_eq!(v[0].color, [255, 128, 0, 255]);
        assert_eq!(v[5].color, [255, 128, 0, 255]);
    }

    #[test]
    fn test_texture_coordinates_without_perspective() {
        let mut words = box_edges(0x0A);
        let mut texture = vec![0u32; 16];
        // s = 1.0, t = 2.0
        texture[0] = 0x0020_0040;
        words.extend(texture);

        let v = walk(&words, TriangleKind::from_opcode(0x0A), false, None);
        assert_eq!((v[1].s, v[1].t), (1.0, 2.0));
    }

    #[test]
    fn test_shift_factor() {
        assert_eq!(shift_factor(0), 1.0);
        assert_eq!(shift_factor(3), 0.125);
        assert_eq!(shift_factor(14), 4.0);
    }

    #[test]
    fn test_short_command_does_not_panic() {
        let v = walk(&[0x0800_0010], TriangleKind::from_opcode(0x08), true, None);
        assert!(v.len() <= 6);
    }
}
