//! VideoZone Engine - the self-feeding hallucination loop
//!
//! Each cycle zooms the current frame, checks it for collapse into darkness,
//! optionally grows a freshly generated seed into it, and hands the result
//! to the image model to dream up the next frame.

pub mod engine;
pub mod inject;
pub mod motion;
pub mod seed;
pub mod stagnation;

pub use engine::{CycleReport, EngineError, FrameSnapshot, HallucinationEngine};
pub use inject::SeedInjector;
pub use motion::MotionEngine;
pub use seed::{SeedPolicy, SeedState, SeedTick};
pub use stagnation::{Stagnation, StagnationDetector};
