//! Edge replication for textures that are smaller than their power of two upload size.
//! Buffers are RGBA8888 with `stride` texels per row.

/// Replicate column `width - 1` out to `clamp_to` on every row
pub fn clamp_s(buf: &mut [u32], stride: usize, width: usize, clamp_to: usize, rows: usize) {
    let clamp_to = clamp_to.min(stride);
    if width == 0 || width >= clamp_to {
        return;
    }

    for row in buf.chunks_mut(stride).take(rows) {
        let edge = row[width - 1];
        row[width..clamp_to].fill(edge);
    }
}

/// Repeat (or mirror) the first `1 << mask` columns across the whole row
pub fn wrap_s(buf: &mut [u32], stride: usize, mask: u8, mirror: bool, rows: usize) {
    let period = 1usize << mask;
    if mask == 0 || period >= stride {
        return;
    }

    for row in buf.chunks_mut(stride).take(rows) {
        for x in period..stride {
            row[x] = row[source_index(x, period, mirror)];
        }
    }
}

/// Replicate row `height - 1` down to `clamp_to`
pub fn clamp_t(buf: &mut [u32], stride: usize, height: usize, clamp_to: usize) {
    if stride == 0 {
        return;
    }
    let clamp_to = clamp_to.min(buf.len() / stride);
    if height == 0 || height >= clamp_to {
        return;
    }

    let (top, bottom) = buf.split_at_mut(height * stride);
    let edge = &top[(height - 1) * stride..];
    for row in bottom.chunks_mut(stride).take(clamp_to - height) {
        row.copy_from_slice(edge);
    }
}

/// Repeat (or mirror) the first `1 << mask` rows down to `rows`
pub fn wrap_t(buf: &mut [u32], stride: usize, mask: u8, mirror: bool, rows: usize) {
    let period = 1usize << mask;
    let rows = rows.min(buf.len() / stride.max(1));
    if mask == 0 || period >= rows {
        return;
    }

    for y in period..rows {
        let src = source_index(y, period, mirror) * stride;
        buf.copy_within(src..src + stride, y * stride);
    }
}

fn source_index(i: usize, period: usize, mirror: bool) -> usize {
    let m = i & (period - 1);
    if mirror && (i & period) != 0 { period - 1 - m } else { m }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_s() {
        let mut buf = vec![1, 2, 0, 0, 3, 4, 0, 0];
        clamp_s(&mut buf, 4, 2, 4, 2);
        assert_eq!(buf, vec![1, 2, 2, 2, 3, 4, 4, 4]);
    }

    #[test]
    fn test_wrap_and_mirror_s() {
        let mut buf = vec![1, 2, 0, 0, 0, 0, 0, 0];
        wrap_s(&mut buf, 8, 1, false, 1);
        assert_eq!(buf, vec![1, 2, 1, 2, 1, 2, 1, 2]);

        let mut buf = vec![1, 2, 0, 0, 0, 0, 0, 0];
        wrap_s(&mut buf, 8, 1, true, 1);
        assert_eq!(buf, vec![1, 2, 2, 1, 1, 2, 2, 1]);

        // no mask means nothing to repeat
        let mut buf = vec![1, 0];
        wrap_s(&mut buf, 2, 0, false, 1);
        assert_eq!(buf, vec![1, 0]);
    }

    #[test]
    fn test_clamp_and_wrap_t() {
        let mut buf = vec![1, 1, 2, 2, 0, 0, 0, 0];
        clamp_t(&mut buf, 2, 2, 4);
        assert_eq!(buf, vec![1, 1, 2, 2, 2, 2, 2, 2]);

        let mut buf = vec![1, 1, 2, 2, 0, 0, 0, 0];
        wrap_t(&mut buf, 2, 1, true, 4);
        assert_eq!(buf, vec![1, 1, 2, 2, 2, 2, 1, 1]);
    }
}
