//! Stand-in generator for when no model is available.
//!
//! Keeps the stream alive: the input comes back with a light per-channel
//! jitter so the loop still visibly evolves.

use crate::provider::{GenerateRequest, ImageModel, ModelError, ModelResult};
use parking_lot::RwLock;
use rand::Rng;
use videozone_core::{Frame, ModelStatus};

/// Largest per-channel offset applied by `perturb`.
pub const FALLBACK_NOISE: i16 = 5;

/// Input plus uniform noise in `[-FALLBACK_NOISE, FALLBACK_NOISE]`, clamped to 0-255.
pub fn perturb<R: Rng>(frame: &Frame, rng: &mut R) -> Frame {
    let mut out = frame.clone();
    for value in out.iter_mut() {
        let jitter = rng.gen_range(-FALLBACK_NOISE..=FALLBACK_NOISE);
        *value = (*value as i16 + jitter).clamp(0, 255) as u8;
    }
    out
}

/// Run the model when it is loaded, otherwise perturb the input on a
/// blocking thread. Model errors are returned as-is.
pub async fn generate_or_perturb(
    model: &dyn ImageModel,
    request: GenerateRequest,
) -> ModelResult<Frame> {
    if model.is_loaded() {
        return model.generate(request).await;
    }
    let image = request.image;
    tokio::task::spawn_blocking(move || perturb(&image, &mut rand::thread_rng()))
        .await
        .map_err(|e| ModelError::RequestFailed(format!("fallback task failed: {}", e)))
}

/// Model backend that never loads anything.
pub struct OfflineModel {
    status: RwLock<ModelStatus>,
}

impl OfflineModel {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ModelStatus::idle("none")),
        }
    }
}

impl Default for OfflineModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ImageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn load_model(&self) -> ModelResult<()> {
        self.status.write().stage = "OFFLINE".to_string();
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> ModelResult<Frame> {
        Ok(perturb(&request.image, &mut rand::thread_rng()))
    }

    fn status(&self) -> ModelStatus {
        self.status.read().clone()
    }
}
