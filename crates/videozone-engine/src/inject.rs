//! Grows a seed image into the center of a frame behind a soft Gaussian mask.

use image::imageops::{self, FilterType};
use videozone_core::Frame;

#[derive(Clone, Copy, Debug)]
pub struct SeedInjector {
    min_fraction: f32,
    max_fraction: f32,
}

impl SeedInjector {
    /// Region side runs from `min_fraction * height` at progress 0 to
    /// `max_fraction * height` at progress 1.
    pub fn new(min_fraction: f32, max_fraction: f32) -> Self {
        Self {
            min_fraction,
            max_fraction,
        }
    }

    /// Side of the square blend region for a frame of this size.
    pub fn region_size(&self, width: u32, height: u32, progress: f32) -> u32 {
        let progress = progress.clamp(0.0, 1.0);
        let min_size = (height as f32 * self.min_fraction) as u32;
        let max_size = (height as f32 * self.max_fraction) as u32;
        let size = min_size as f32 + (max_size as f32 - min_size as f32) * progress;
        (size as u32).min(width).min(height)
    }

    /// Blend `seed` into the middle of `frame`. The seed is resized to the
    /// region, weighted 1 at the center and falling off with
    /// `sigma = size / 3`.
    pub fn inject(&self, mut frame: Frame, seed: &Frame, progress: f32) -> Frame {
        let (w, h) = frame.dimensions();
        let size = self.region_size(w, h, progress);
        if size == 0 || seed.width() == 0 || seed.height() == 0 {
            return frame;
        }

        let seed_small = imageops::resize(seed, size, size, FilterType::Triangle);
        let weights = gaussian_profile(size);
        let x_offset = (w - size) / 2;
        let y_offset = (h - size) / 2;

        for (j, wy) in weights.iter().enumerate() {
            for (i, wx) in weights.iter().enumerate() {
                let mask = wy * wx;
                let src = seed_small.get_pixel(i as u32, j as u32);
                let dst = frame.get_pixel_mut(x_offset + i as u32, y_offset + j as u32);
                for c in 0..3 {
                    let blended = src[c] as f32 * mask + dst[c] as f32 * (1.0 - mask);
                    dst[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        frame
    }
}

impl Default for SeedInjector {
    fn default() -> Self {
        Self::new(0.1, 0.8)
    }
}

/// One axis of the separable radial mask: `exp(-d^2 / (2 sigma^2))` with the
/// center at `size / 2`.
fn gaussian_profile(size: u32) -> Vec<f32> {
    let center = size as f32 / 2.0;
    let sigma = size as f32 / 3.0;
    let denom = 2.0 * sigma * sigma;
    (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / denom).exp()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use videozone_core::frame::solid;

    #[test]
    fn region_size_spans_min_to_max() {
        let injector = SeedInjector::default();
        assert_eq!(injector.region_size(912, 512, 0.0), 51);
        assert_eq!(injector.region_size(912, 512, 1.0), 409);
        assert_eq!(injector.region_size(912, 512, 0.5), 230);
    }

    #[test]
    fn region_size_is_monotonic() {
        let injector = SeedInjector::default();
        let mut last = 0;
        for step in 0..=100 {
            let size = injector.region_size(912, 512, step as f32 / 100.0);
            assert!(size >= last);
            last = size;
        }
        assert_eq!(last, 409);
    }

    #[test]
    fn region_size_clamps_progress_and_frame() {
        let injector = SeedInjector::default();
        assert_eq!(injector.region_size(912, 512, -1.0), 51);
        assert_eq!(injector.region_size(912, 512, 3.0), 409);
        // Portrait frame: region never exceeds the narrow side.
        assert_eq!(SeedInjector::new(0.1, 1.5).region_size(100, 400, 1.0), 100);
    }

    #[test]
    fn inject_blends_center_and_leaves_edges() {
        let injector = SeedInjector::default();
        let frame = solid(912, 512, [0, 0, 0]);
        let seed = solid(512, 512, [200, 100, 50]);
        let out = injector.inject(frame, &seed, 1.0);
        assert_eq!(out.dimensions(), (912, 512));

        let size = 409;
        let x0 = (912 - size) / 2;
        let y0 = (512 - size) / 2;
        // center weight ~1
        let center = out.get_pixel(x0 + size / 2, y0 + size / 2);
        assert!((center[0] as i32 - 200).abs() <= 1, "{:?}", center);
        // region corner ~0.1 weight
        let corner = out.get_pixel(x0, y0);
        assert!(corner[0] > 10 && corner[0] < 30, "{:?}", corner);
        // outside the region untouched
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(x0 - 1, y0 + size / 2).0, [0, 0, 0]);
    }

    #[test]
    fn inject_is_deterministic() {
        let injector = SeedInjector::default();
        let seed = solid(64, 64, [255, 255, 255]);
        let a = injector.inject(solid(200, 100, [10, 10, 10]), &seed, 0.3);
        let b = injector.inject(solid(200, 100, [10, 10, 10]), &seed, 0.3);
        assert_eq!(a, b);
    }

    #[test]
    fn mask_peaks_at_center() {
        let profile = gaussian_profile(10);
        assert_eq!(profile[5], 1.0);
        assert!(profile[0] < profile[3]);
        assert!(profile[9] < profile[6]);
    }
}
