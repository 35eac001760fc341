//! Subconscious seeding
//!
//! When the loop collapses into darkness a "spark" is ignited: a fresh,
//! high-strength sample is generated from pure noise and grown into the
//! center of the frame over a fixed number of cycles.

use std::sync::Arc;
use tracing::info;
use videozone_core::{frame, Frame, SeedConfig};
use videozone_model::{generate_or_perturb, GenerateRequest, ImageModel, ModelResult};

/// Fixed knobs of a seed episode.
#[derive(Clone, Copy, Debug)]
pub struct SeedPolicy {
    /// Cycles an episode lasts.
    pub duration: u32,
    /// Cycles that must pass after an ignition before the next one.
    pub cooldown: u64,
    /// Square working resolution of the seed sample.
    pub size: u32,
    pub strength: f32,
    pub guidance_scale: f32,
}

impl SeedPolicy {
    pub fn from_config(config: &SeedConfig) -> Self {
        Self {
            duration: config.duration.max(1),
            cooldown: config.cooldown,
            size: config.size,
            strength: config.strength,
            guidance_scale: config.guidance_scale,
        }
    }

    /// Generate a seed from fresh noise, decoupled from the degraded frame.
    /// Falls back to perturbed noise while the model is not loaded; model
    /// errors are returned, never papered over.
    pub async fn generate_seed(
        &self,
        model: &dyn ImageModel,
        prompt: Arc<str>,
    ) -> ModelResult<Frame> {
        info!("Spark ignited, generating {0}x{0} seed", self.size);
        let noise = frame::random_noise(self.size, self.size, &mut rand::thread_rng());
        let request = GenerateRequest::new(prompt, noise, self.strength, self.guidance_scale);
        generate_or_perturb(model, request).await
    }
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self::from_config(&SeedConfig::default())
    }
}

/// One injection step of an active episode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeedTick {
    /// Cycles into the episode, 1..=duration.
    pub progress: u32,
    /// `progress / duration`.
    pub factor: f32,
    /// This was the last step; the episode is over.
    pub completed: bool,
}

#[derive(Debug)]
struct Episode {
    image: Arc<Frame>,
    progress: u32,
}

/// Episode bookkeeping. Owned by the loop; mutated only between the
/// stagnation check and the generative step.
#[derive(Debug, Default)]
pub struct SeedState {
    episode: Option<Episode>,
    last_spark_frame: Option<u64>,
}

impl SeedState {
    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    pub fn progress(&self) -> u32 {
        self.episode.as_ref().map_or(0, |e| e.progress)
    }

    pub fn last_spark_frame(&self) -> Option<u64> {
        self.last_spark_frame
    }

    /// No episode running and more than `cooldown` cycles since the last
    /// ignition. The very first ignition is never held back.
    pub fn can_ignite(&self, frame_count: u64, cooldown: u64) -> bool {
        self.episode.is_none()
            && self
                .last_spark_frame
                .map_or(true, |last| frame_count.saturating_sub(last) > cooldown)
    }

    /// Start the cooldown clock. Called before the seed is generated so a
    /// failed attempt is rate limited too.
    pub fn record_ignition(&mut self, frame_count: u64) {
        self.last_spark_frame = Some(frame_count);
    }

    pub fn begin(&mut self, image: Frame) {
        self.episode = Some(Episode {
            image: Arc::new(image),
            progress: 0,
        });
    }

    /// Advance the active episode by one cycle. Returns the seed image to
    /// inject and where the episode stands; ends the episode once
    /// `duration` steps have been taken.
    pub fn advance(&mut self, duration: u32) -> Option<(Arc<Frame>, SeedTick)> {
        let episode = self.episode.as_mut()?;
        episode.progress += 1;
        let tick = SeedTick {
            progress: episode.progress,
            factor: episode.progress as f32 / duration as f32,
            completed: episode.progress >= duration,
        };
        let image = episode.image.clone();
        if tick.completed {
            self.episode = None;
        }
        Some((image, tick))
    }
}
