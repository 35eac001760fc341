//! Core types for VideoZone

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prompt and sampler settings read once per cycle.
///
/// The prompt is an `Arc<str>` so a per-cycle snapshot is a pointer copy and
/// a concurrent update replaces the whole string at once.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub prompt: Arc<str>,
    pub strength: f32,
    pub guidance_scale: f32,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>, strength: f32, guidance_scale: f32) -> Self {
        Self {
            prompt: Arc::from(prompt.into()),
            strength,
            guidance_scale,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PROMPT, 0.25, 8.0)
    }
}

/// Loop state machine as reported to clients.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LoopStatus {
    #[default]
    Initializing,
    Running,
    Error(String),
}

impl LoopStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, LoopStatus::Error(_))
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopStatus::Initializing => write!(f, "INITIALIZING"),
            LoopStatus::Running => write!(f, "RUNNING"),
            LoopStatus::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

impl Serialize for LoopStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What a generative model adapter reports about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub stage: String,
    pub device: String,
}

impl ModelStatus {
    pub fn idle(device: impl Into<String>) -> Self {
        Self {
            loaded: false,
            stage: "IDLE".to_string(),
            device: device.into(),
        }
    }
}

/// Snapshot served by `/debug/status`.
#[derive(Clone, Debug, Serialize)]
pub struct EngineStatus {
    pub status: LoopStatus,
    pub prompt: String,
    pub frame_count: u64,
    pub last_gen_time_ms: f64,
    pub model_loaded: bool,
    pub loading_state: String,
    pub device: String,
    pub strength: f32,
    pub guidance_scale: f32,
    pub spark_active: bool,
    pub seed_progress: u32,
    pub last_brightness: Option<f64>,
    pub width: u32,
    pub height: u32,
}

/// Bind mode for the HTTP server
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
            _ => BindMode::Lan,
        }
    }
}
