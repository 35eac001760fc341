//! HallucinationEngine - the owning state machine of the feedback loop
//!
//! One loop task owns the current frame behind an async mutex held for the
//! whole cycle. Readers never touch that mutex: every commit publishes an
//! immutable `FrameSnapshot` through a watch channel, and status fields live
//! behind their own short-lived locks.

use crate::inject::SeedInjector;
use crate::motion::MotionEngine;
use crate::seed::{SeedPolicy, SeedState, SeedTick};
use crate::stagnation::StagnationDetector;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use videozone_core::{
    frame, EngineStatus, Frame, GenerationParams, LoopStatus, VideozoneConfig,
};
use videozone_model::{generate_or_perturb, GenerateRequest, ImageModel, ModelError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("generation failed: {0}")]
    Generation(ModelError),

    #[error("seed generation failed: {0}")]
    Seed(ModelError),

    #[error(transparent)]
    Frame(#[from] videozone_core::Error),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// The committed frame as readers see it. The JPEG is encoded once, off
/// the runtime, before the snapshot is published.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    pub frame: Arc<Frame>,
    pub frame_count: u64,
    pub jpeg: Option<Bytes>,
}

/// Upper bound on the pause between cycles while generation keeps failing.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What one successful cycle did.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub frame_count: u64,
    pub elapsed: Duration,
    pub brightness: f64,
    pub ignited: bool,
    pub seed: Option<SeedTick>,
}

struct Settings {
    width: u32,
    height: u32,
    tick: Duration,
    jpeg_quality: u8,
    seeding: bool,
}

struct LoopState {
    frame: Arc<Frame>,
    frame_count: u64,
    seed: SeedState,
}

#[derive(Default)]
struct Stats {
    status: LoopStatus,
    last_gen_time_ms: f64,
    spark_active: bool,
    seed_progress: u32,
    last_brightness: Option<f64>,
}

struct Shared {
    settings: Settings,
    motion: MotionEngine,
    detector: StagnationDetector,
    injector: SeedInjector,
    seed_policy: SeedPolicy,
    model: Arc<dyn ImageModel>,
    state: tokio::sync::Mutex<LoopState>,
    snapshot: watch::Sender<FrameSnapshot>,
    params: RwLock<GenerationParams>,
    stats: RwLock<Stats>,
}

struct Tasks {
    cancel: CancellationToken,
    loop_handle: JoinHandle<()>,
    load_handle: JoinHandle<()>,
}

pub struct HallucinationEngine {
    shared: Arc<Shared>,
    tasks: Mutex<Option<Tasks>>,
}

impl HallucinationEngine {
    /// Engine seeded with uniform random noise at the configured size.
    pub fn new(config: &VideozoneConfig, model: Arc<dyn ImageModel>) -> Self {
        let initial = frame::random_noise(
            config.engine.width,
            config.engine.height,
            &mut rand::thread_rng(),
        );
        Self::build(config, model, initial)
    }

    /// Engine seeded with a known frame, which must match the configured size.
    pub fn with_initial_frame(
        config: &VideozoneConfig,
        model: Arc<dyn ImageModel>,
        initial: Frame,
    ) -> Result<Self, EngineError> {
        check_dimensions((config.engine.width, config.engine.height), &initial)?;
        Ok(Self::build(config, model, initial))
    }

    fn build(config: &VideozoneConfig, model: Arc<dyn ImageModel>, initial: Frame) -> Self {
        let jpeg = encode_frame(&initial, config.server.jpeg_quality);
        let frame = Arc::new(initial);
        let (snapshot, _) = watch::channel(FrameSnapshot {
            frame: frame.clone(),
            frame_count: 0,
            jpeg,
        });
        let shared = Shared {
            settings: Settings {
                width: config.engine.width,
                height: config.engine.height,
                tick: Duration::from_millis(config.engine.tick_ms),
                jpeg_quality: config.server.jpeg_quality,
                seeding: config.seed.enabled,
            },
            motion: MotionEngine::new(config.engine.zoom_factor),
            detector: StagnationDetector::new(config.seed.stagnation_threshold),
            injector: SeedInjector::new(config.seed.min_fraction, config.seed.max_fraction),
            seed_policy: SeedPolicy::from_config(&config.seed),
            model,
            state: tokio::sync::Mutex::new(LoopState {
                frame,
                frame_count: 0,
                seed: SeedState::default(),
            }),
            snapshot,
            params: RwLock::new(config.engine.initial_params()),
            stats: RwLock::new(Stats::default()),
        };
        Self {
            shared: Arc::new(shared),
            tasks: Mutex::new(None),
        }
    }

    /// Kick off background model loading and the cycle loop. Returns at once;
    /// calling it on a running engine does nothing.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            debug!("Engine already running");
            return;
        }

        let model = self.shared.model.clone();
        let load_handle = tokio::spawn(async move {
            info!("Loading model via {}", model.name());
            if let Err(e) = model.load_model().await {
                warn!("Model unavailable, continuing on fallback: {}", e);
            }
        });

        let cancel = CancellationToken::new();
        let shared = self.shared.clone();
        let token = cancel.clone();
        let loop_handle = tokio::spawn(async move { shared.run(token).await });

        *tasks = Some(Tasks {
            cancel,
            loop_handle,
            load_handle,
        });
    }

    /// Signal the loop to stop and wait for the in-flight cycle to finish.
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            return;
        };
        tasks.cancel.cancel();
        tasks.load_handle.abort();
        if let Err(e) = tasks.loop_handle.await {
            error!("Engine loop ended abnormally: {}", e);
        }
        info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Run exactly one cycle. Failures are recorded in the status and
    /// returned; the committed frame is left untouched.
    pub async fn step(&self) -> Result<CycleReport, EngineError> {
        self.shared.step().await
    }

    pub fn update_prompt(&self, prompt: impl Into<String>) {
        let prompt: Arc<str> = Arc::from(prompt.into());
        info!("Prompt updated: {}", prompt);
        self.shared.params.write().prompt = prompt;
    }

    pub fn update_params(&self, strength: f32, guidance_scale: f32) {
        info!(
            "Params updated: strength={}, guidance_scale={}",
            strength, guidance_scale
        );
        let mut params = self.shared.params.write();
        params.strength = strength;
        params.guidance_scale = guidance_scale;
    }

    pub fn params(&self) -> GenerationParams {
        self.shared.params.read().clone()
    }

    /// Replace the current frame without running a cycle.
    pub async fn set_frame(&self, frame: Frame) -> Result<(), EngineError> {
        check_dimensions((self.shared.settings.width, self.shared.settings.height), &frame)?;
        let frame = Arc::new(frame);
        let jpeg = self.shared.encode_off_runtime(frame.clone()).await?;
        let mut state = self.shared.state.lock().await;
        state.frame = frame.clone();
        self.shared.snapshot.send_replace(FrameSnapshot {
            frame,
            frame_count: state.frame_count,
            jpeg,
        });
        Ok(())
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Notified after every commit.
    pub fn subscribe(&self) -> watch::Receiver<FrameSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn frame_count(&self) -> u64 {
        self.shared.snapshot.borrow().frame_count
    }

    /// Current frame as JPEG, as encoded at commit time.
    pub fn get_frame(&self) -> Option<Bytes> {
        self.shared.snapshot.borrow().jpeg.clone()
    }

    pub fn get_status(&self) -> EngineStatus {
        let params = self.params();
        let model = self.shared.model.status();
        let stats = self.shared.stats.read();
        EngineStatus {
            status: stats.status.clone(),
            prompt: params.prompt.to_string(),
            frame_count: self.frame_count(),
            last_gen_time_ms: stats.last_gen_time_ms,
            model_loaded: model.loaded,
            loading_state: model.stage,
            device: model.device,
            strength: params.strength,
            guidance_scale: params.guidance_scale,
            spark_active: stats.spark_active,
            seed_progress: stats.seed_progress,
            last_brightness: stats.last_brightness,
            width: self.shared.settings.width,
            height: self.shared.settings.height,
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Engine loop started ({}x{}, seeding {})",
            self.settings.width,
            self.settings.height,
            if self.settings.seeding { "on" } else { "off" }
        );
        self.stats.write().status = LoopStatus::Running;
        let mut failures = 0u32;
        while !cancel.is_cancelled() {
            // Failures are already recorded in the status.
            match self.step().await {
                Ok(_) => failures = 0,
                Err(_) => failures = failures.saturating_add(1),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(retry_delay(self.settings.tick, failures)) => {}
            }
        }
        info!("Engine loop stopped");
    }

    async fn step(&self) -> Result<CycleReport, EngineError> {
        match self.cycle().await {
            Ok(report) => Ok(report),
            Err(e) => {
                let status = LoopStatus::Error(e.to_string());
                let repeated = {
                    let mut stats = self.stats.write();
                    let repeated = stats.status == status;
                    stats.status = status;
                    repeated
                };
                // Only the first of a run of identical failures is an error.
                if repeated {
                    debug!("Error in loop (repeated): {}", e);
                } else {
                    error!("Error in loop: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<CycleReport, EngineError> {
        let started = Instant::now();
        let mut state = self.state.lock().await;
        let params = self.params.read().clone();

        // 1-2. zoom, then look for collapse
        let current = state.frame.clone();
        let motion = self.motion;
        let detector = self.detector;
        let zoomed_and_stagnation = tokio::task::spawn_blocking(move || {
            let zoomed = motion.apply_zoom(&current);
            let stagnation = detector.check(&zoomed);
            (zoomed, stagnation)
        })
        .await;
        let (zoomed, stagnation) = join_blocking(zoomed_and_stagnation)?;
        self.stats.write().last_brightness = Some(stagnation.brightness);

        // 3. ignition
        let mut ignited = false;
        if self.settings.seeding
            && stagnation.is_stagnant
            && state
                .seed
                .can_ignite(state.frame_count, self.seed_policy.cooldown)
        {
            info!(
                "Stagnation detected (brightness {:.1}), igniting spark",
                stagnation.brightness
            );
            let frame_count = state.frame_count;
            state.seed.record_ignition(frame_count);
            let seed = self
                .seed_policy
                .generate_seed(self.model.as_ref(), params.prompt.clone())
                .await
                .map_err(EngineError::Seed)?;
            state.seed.begin(seed);
            ignited = true;
        }

        // 4. injection. The step is spent even if generation below fails.
        let advanced = state.seed.advance(self.seed_policy.duration);
        let tick = advanced.as_ref().map(|(_, tick)| *tick);
        let input = match advanced {
            Some((seed, tick)) => {
                let injector = self.injector;
                let blended = join_blocking(
                    tokio::task::spawn_blocking(move || {
                        injector.inject(zoomed, &seed, tick.factor)
                    })
                    .await,
                )?;
                if tick.completed {
                    info!("Spark complete, releasing control to the model");
                }
                blended
            }
            None => zoomed,
        };
        {
            let mut stats = self.stats.write();
            stats.spark_active = state.seed.is_active();
            stats.seed_progress = state.seed.progress();
        }

        // 5. dream
        let request = GenerateRequest::new(
            params.prompt.clone(),
            input,
            params.strength,
            params.guidance_scale,
        );
        let next = generate_or_perturb(self.model.as_ref(), request)
            .await
            .map_err(EngineError::Generation)?;
        check_dimensions((self.settings.width, self.settings.height), &next)?;

        // 6. commit
        let next = Arc::new(next);
        let jpeg = self.encode_off_runtime(next.clone()).await?;
        state.frame = next.clone();
        state.frame_count += 1;
        let frame_count = state.frame_count;
        self.snapshot.send_replace(FrameSnapshot {
            frame: next,
            frame_count,
            jpeg,
        });
        drop(state);

        let elapsed = started.elapsed();
        {
            let mut stats = self.stats.write();
            stats.status = LoopStatus::Running;
            stats.last_gen_time_ms = elapsed.as_secs_f64() * 1000.0;
        }
        debug!(
            "Frame {} in {:.1}ms (brightness {:.1})",
            frame_count,
            elapsed.as_secs_f64() * 1000.0,
            stagnation.brightness
        );

        Ok(CycleReport {
            frame_count,
            elapsed,
            brightness: stagnation.brightness,
            ignited,
            seed: tick,
        })
    }
}

impl Shared {
    async fn encode_off_runtime(&self, frame: Arc<Frame>) -> Result<Option<Bytes>, EngineError> {
        let quality = self.settings.jpeg_quality;
        join_blocking(tokio::task::spawn_blocking(move || encode_frame(&frame, quality)).await)
    }
}

fn encode_frame(frame: &Frame, quality: u8) -> Option<Bytes> {
    match frame::encode_jpeg(frame, quality) {
        Ok(jpeg) => Some(jpeg),
        Err(e) => {
            warn!("Failed to encode frame: {}", e);
            None
        }
    }
}

/// Panics in pixel work are bugs and are re-raised; only a cancelled
/// worker becomes a cycle error.
fn join_blocking<T>(joined: Result<T, JoinError>) -> Result<T, EngineError> {
    match joined {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(EngineError::Worker(e.to_string())),
    }
}

/// Pause before the next cycle: the configured tick, doubled for each
/// consecutive failure up to `MAX_RETRY_DELAY` (never below the tick).
fn retry_delay(tick: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return tick;
    }
    let backoff = tick
        .max(Duration::from_millis(1))
        .saturating_mul(1u32 << failures.min(16));
    backoff.min(MAX_RETRY_DELAY).max(tick)
}

fn check_dimensions(expected: (u32, u32), frame: &Frame) -> Result<(), EngineError> {
    if frame.dimensions() == expected {
        Ok(())
    } else {
        Err(videozone_core::Error::dimension_mismatch(expected, frame.dimensions()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_backs_off_and_caps() {
        let tick = Duration::from_millis(10);
        assert_eq!(retry_delay(tick, 0), tick);
        assert_eq!(retry_delay(tick, 1), Duration::from_millis(20));
        assert_eq!(retry_delay(tick, 3), Duration::from_millis(80));
        assert_eq!(retry_delay(tick, 10), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(tick, u32::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn retry_delay_never_shortens_a_long_tick() {
        let tick = Duration::from_secs(60);
        assert_eq!(retry_delay(tick, 5), tick);
    }

    #[tokio::test]
    #[should_panic(expected = "zoom exploded")]
    async fn worker_panics_are_reraised() {
        let joined = tokio::task::spawn_blocking(|| -> u32 { panic!("zoom exploded") }).await;
        let _ = join_blocking(joined);
    }

    #[tokio::test]
    async fn cancelled_worker_is_a_cycle_error() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        handle.abort();
        let err = join_blocking(handle.await).unwrap_err();
        assert!(matches!(err, EngineError::Worker(_)));
    }
}
