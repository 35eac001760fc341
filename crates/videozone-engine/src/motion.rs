//! Forward-motion warp applied before every generation.

use videozone_core::Frame;

/// Zooms a frame about its center to simulate flying forward.
#[derive(Clone, Copy, Debug)]
pub struct MotionEngine {
    zoom_factor: f32,
}

impl MotionEngine {
    pub fn new(zoom_factor: f32) -> Self {
        Self { zoom_factor }
    }

    pub fn zoom_factor(&self) -> f32 {
        self.zoom_factor
    }

    /// Scale by `zoom_factor` about `(w / 2, h / 2)` with bilinear sampling.
    /// Samples that fall outside the source replicate the nearest edge pixel.
    pub fn apply_zoom(&self, frame: &Frame) -> Frame {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return frame.clone();
        }
        let inv = 1.0 / self.zoom_factor;
        let xs = taps(w, inv);
        let ys = taps(h, inv);

        let src = frame.as_raw();
        let stride = w as usize * 3;
        let mut out = vec![0u8; src.len()];

        for (row, &(y0, y1, fy)) in out.chunks_exact_mut(stride).zip(ys.iter()) {
            let top = &src[y0 * stride..(y0 + 1) * stride];
            let bottom = &src[y1 * stride..(y1 + 1) * stride];
            for (px, &(x0, x1, fx)) in row.chunks_exact_mut(3).zip(xs.iter()) {
                for c in 0..3 {
                    let a = top[x0 * 3 + c] as f32;
                    let b = top[x1 * 3 + c] as f32;
                    let d = bottom[x0 * 3 + c] as f32;
                    let e = bottom[x1 * 3 + c] as f32;
                    let upper = a + (b - a) * fx;
                    let lower = d + (e - d) * fx;
                    px[c] = (upper + (lower - upper) * fy).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        Frame::from_raw(w, h, out).unwrap_or_else(|| frame.clone())
    }
}

impl Default for MotionEngine {
    fn default() -> Self {
        Self::new(1.05)
    }
}

/// For each output coordinate along one axis: the two source indices to
/// interpolate between and the weight of the second.
fn taps(len: u32, inv_scale: f32) -> Vec<(usize, usize, f32)> {
    let center = (len / 2) as f32;
    let last = (len - 1) as f32;
    (0..len)
        .map(|i| {
            let s = (center + (i as f32 - center) * inv_scale).clamp(0.0, last);
            let i0 = s.floor() as usize;
            let i1 = (i0 + 1).min(len as usize - 1);
            (i0, i1, s - i0 as f32)
        })
        .collect()
}
