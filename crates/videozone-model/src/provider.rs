//! Image model trait

use std::sync::Arc;
use videozone_core::{Frame, ModelStatus};

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Model error types
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model not loaded")]
    NotLoaded,

    #[error("model load failed: {0}")]
    LoadFailed(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("image decode failed: {0}")]
    Decode(#[from] videozone_core::Error),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// One img2img call.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub prompt: Arc<str>,
    pub image: Frame,
    /// How far the output may drift from `image` (0-1).
    pub strength: f32,
    /// How hard the output follows `prompt`.
    pub guidance_scale: f32,
}

impl GenerateRequest {
    pub fn new(prompt: Arc<str>, image: Frame, strength: f32, guidance_scale: f32) -> Self {
        Self {
            prompt,
            image,
            strength,
            guidance_scale,
        }
    }
}

/// A generative image-to-image model.
///
/// `load_model` may take minutes and is driven from a background task; callers
/// poll `status()` to find out when `generate` becomes usable.
#[async_trait::async_trait]
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn load_model(&self) -> ModelResult<()>;

    /// Produce a new image from `request.image`. The output is expected to have
    /// the input's dimensions; adapters resize when the backend does not.
    async fn generate(&self, request: GenerateRequest) -> ModelResult<Frame>;

    fn status(&self) -> ModelStatus;

    fn is_loaded(&self) -> bool {
        self.status().loaded
    }
}
