//! Detects when the dream has faded into darkness.

use videozone_core::frame::mean_luminance;
use videozone_core::Frame;

/// Mean luminance (0-255) below which a frame counts as collapsed.
pub const STAGNATION_THRESHOLD: f64 = 40.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stagnation {
    pub is_stagnant: bool,
    pub brightness: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct StagnationDetector {
    threshold: f64,
}

impl StagnationDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Strictly below the threshold is stagnant; equal is not.
    pub fn classify(&self, brightness: f64) -> bool {
        brightness < self.threshold
    }

    pub fn check(&self, frame: &Frame) -> Stagnation {
        let brightness = mean_luminance(frame);
        Stagnation {
            is_stagnant: self.classify(brightness),
            brightness,
        }
    }
}

impl Default for StagnationDetector {
    fn default() -> Self {
        Self::new(STAGNATION_THRESHOLD)
    }
}
