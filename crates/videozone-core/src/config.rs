//! VideoZone configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use crate::types::{BindMode, GenerationParams};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PROMPT: &str = "A futuristic cyberpunk city, neon lights, fast motion";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideozoneConfig {
    /// HTTP server and stream settings.
    pub server: ServerConfig,
    /// Frame geometry, motion and initial generation parameters.
    pub engine: EngineConfig,
    /// Anti-stagnation seeding.
    pub seed: SeedConfig,
    /// Generative model backend.
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
    /// Delay between multipart chunks on `/video_feed`.
    pub stream_interval_ms: u64,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 16:9 output.
    pub width: u32,
    pub height: u32,
    pub prompt: String,
    pub strength: f32,
    pub guidance_scale: f32,
    /// Per-cycle forward zoom; slightly above 1.
    pub zoom_factor: f32,
    /// Pause between cycles so the runtime can serve readers.
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Off reproduces the plain feedback loop with no recovery.
    pub enabled: bool,
    /// Mean luminance below which a frame counts as stagnant (0-255).
    pub stagnation_threshold: f64,
    /// Cycles a seed takes to grow from min to max size.
    pub duration: u32,
    /// Cycles that must pass after an ignition before the next one.
    pub cooldown: u64,
    /// Square working resolution of the seed image.
    pub size: u32,
    pub strength: f32,
    pub guidance_scale: f32,
    /// Seed region side at progress 0, as a fraction of frame height.
    pub min_fraction: f32,
    /// Seed region side at progress 1, as a fraction of frame height.
    pub max_fraction: f32,
}

/// Which model adapter to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// AUTOMATIC1111-compatible img2img server.
    #[default]
    Remote,
    /// No model; the loop runs on the noise fallback only.
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub endpoint: String,
    /// Checkpoint title to select on the backend. Empty keeps whatever is loaded.
    pub checkpoint: String,
    /// Sampler steps per frame (LCM checkpoints need very few).
    pub steps: u32,
    pub timeout_secs: u64,
    /// Reported in status; the backend decides where inference runs.
    pub device: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: BindMode::default(),
            stream_interval_ms: 10,
            jpeg_quality: crate::frame::DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 912,
            height: 512,
            prompt: DEFAULT_PROMPT.to_string(),
            strength: 0.25,
            guidance_scale: 8.0,
            zoom_factor: 1.05,
            tick_ms: 10,
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stagnation_threshold: 40.0,
            duration: 20,
            cooldown: 30,
            size: 512,
            strength: 0.95,
            guidance_scale: 8.5,
            min_fraction: 0.1,
            max_fraction: 0.8,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            endpoint: "http://127.0.0.1:7860".to_string(),
            checkpoint: "LCM_Dreamshaper_v7".to_string(),
            steps: 4,
            timeout_secs: 60,
            device: "cuda".to_string(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl VideozoneConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::config(e.to_string()))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl EngineConfig {
    pub fn initial_params(&self) -> GenerationParams {
        GenerationParams::new(self.prompt.clone(), self.strength, self.guidance_scale)
    }
}
