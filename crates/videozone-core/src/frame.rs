//! Frame buffers and the still-image codec used for streaming.
//!
//! A frame is a fixed-size 8-bit RGB buffer. Everything that touches pixels
//! (motion, seeding, model adapters) exchanges `Frame` values.

use crate::error::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use rand::Rng;
use std::io::Cursor;

/// Height x width x 3 channels, 8 bits each.
pub type Frame = RgbImage;

/// Default JPEG quality used by `encode_jpeg` callers that do not configure one.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Uniform random noise in the full 0-255 range on every channel.
pub fn random_noise<R: Rng>(width: u32, height: u32, rng: &mut R) -> Frame {
    let mut raw = vec![0u8; (width as usize) * (height as usize) * 3];
    rng.fill(raw.as_mut_slice());
    // Length always matches width * height * 3.
    RgbImage::from_raw(width, height, raw).unwrap_or_else(|| RgbImage::new(width, height))
}

/// A frame filled with one colour.
pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    RgbImage::from_pixel(width, height, Rgb(rgb))
}

/// Mean luminance over all pixels, on the 0-255 scale.
///
/// Each pixel is first reduced to an 8-bit gray value with the BT.601
/// weights (0.299 R + 0.587 G + 0.114 B) in 14-bit fixed point, rounded,
/// so a uniform gray frame reports exactly its gray level.
pub fn mean_luminance(frame: &Frame) -> f64 {
    let pixels = (frame.width() as u64) * (frame.height() as u64);
    if pixels == 0 {
        return 0.0;
    }
    let sum: u64 = frame.pixels().map(|Rgb(rgb)| gray(*rgb) as u64).sum();
    sum as f64 / pixels as f64
}

fn gray([r, g, b]: [u8; 3]) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    ((r as u32 * R + g as u32 * G + b as u32 * B + (1 << 13)) >> 14) as u8
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(frame.as_raw().len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(frame)?;
    Ok(Bytes::from(buf))
}

pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    frame.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Decode any supported still image (JPEG or PNG) into an RGB frame.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn noise_has_requested_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let frame = random_noise(912, 512, &mut rng);
        assert_eq!(frame.dimensions(), (912, 512));
        assert_eq!(frame.as_raw().len(), 912 * 512 * 3);
    }

    #[test]
    fn luminance_of_solid_frames() {
        assert_eq!(mean_luminance(&solid(4, 4, [0, 0, 0])), 0.0);
        let white = mean_luminance(&solid(4, 4, [255, 255, 255]));
        assert!((white - 255.0).abs() < 1e-6);
        assert_eq!(mean_luminance(&solid(3, 3, [40, 40, 40])), 40.0);
        assert_eq!(mean_luminance(&solid(2, 2, [0, 100, 0])), 59.0);
    }

    #[test]
    fn png_is_lossless() {
        let mut rng = StdRng::seed_from_u64(3);
        let frame = random_noise(16, 8, &mut rng);
        let png = encode_png(&frame).unwrap();
        assert_eq!(decode(&png).unwrap(), frame);
    }
}
