//! Remote img2img backend over HTTP
//!
//! Talks to an AUTOMATIC1111-compatible server (`/sdapi/v1/*`). Frames travel
//! as base64 PNG in both directions.

use crate::provider::{GenerateRequest, ImageModel, ModelError, ModelResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::imageops::{self, FilterType};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};
use videozone_core::{frame, Frame, ModelConfig, ModelStatus};

/// Side of the throwaway image used to warm the backend up.
const WARMUP_SIZE: u32 = 64;
/// Error detail kept in the loading stage string.
const STAGE_ERROR_CHARS: usize = 50;

pub struct RemoteImg2Img {
    client: Client,
    base_url: String,
    checkpoint: String,
    steps: u32,
    status: RwLock<ModelStatus>,
}

#[derive(Serialize)]
struct Img2ImgRequest<'a> {
    init_images: Vec<String>,
    prompt: &'a str,
    denoising_strength: f32,
    cfg_scale: f32,
    steps: u32,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct Img2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Deserialize)]
struct SdModel {
    title: String,
    #[serde(default)]
    model_name: String,
}

impl RemoteImg2Img {
    pub fn new(config: &ModelConfig) -> ModelResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            checkpoint: config.checkpoint.clone(),
            steps: config.steps,
            status: RwLock::new(ModelStatus::idle(config.device.clone())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn set_stage(&self, stage: &str) {
        debug!("Model stage: {}", stage);
        self.status.write().stage = stage.to_string();
    }

    async fn load_stages(&self) -> ModelResult<()> {
        self.set_stage("CHECKING BACKEND...");
        let models: Vec<SdModel> = self.get_json("/sdapi/v1/sd-models").await?;
        info!("Backend at {} lists {} checkpoints", self.base_url, models.len());

        if !self.checkpoint.is_empty() {
            self.set_stage("SELECTING CHECKPOINT...");
            let wanted = self.checkpoint.as_str();
            let title = models
                .iter()
                .find(|m| m.title.contains(wanted) || m.model_name.contains(wanted))
                .map(|m| m.title.clone())
                .ok_or_else(|| {
                    ModelError::LoadFailed(format!("checkpoint '{}' not available", wanted))
                })?;
            self.post_json(
                "/sdapi/v1/options",
                &serde_json::json!({ "sd_model_checkpoint": title }),
            )
            .await?;
            info!("Selected checkpoint {}", title);
        }

        self.set_stage("WARMING UP...");
        let warmup = frame::random_noise(WARMUP_SIZE, WARMUP_SIZE, &mut rand::thread_rng());
        self.img2img(GenerateRequest::new("warmup".into(), warmup, 0.5, 1.0))
            .await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ModelResult<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ModelResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    /// The raw call, without the loaded check (used by warm-up too).
    async fn img2img(&self, request: GenerateRequest) -> ModelResult<Frame> {
        let (width, height) = request.image.dimensions();
        let image = request.image;
        let init_image = tokio::task::spawn_blocking(move || -> ModelResult<String> {
            Ok(BASE64.encode(frame::encode_png(&image)?))
        })
        .await
        .map_err(|e| ModelError::RequestFailed(format!("encode task failed: {}", e)))??;

        let body = Img2ImgRequest {
            init_images: vec![init_image],
            prompt: &request.prompt,
            denoising_strength: request.strength,
            cfg_scale: request.guidance_scale,
            steps: self.steps,
            width,
            height,
        };
        let response: Img2ImgResponse = self
            .post_json("/sdapi/v1/img2img", &body)
            .await?
            .json()
            .await?;
        let encoded = response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no images in response".into()))?;

        tokio::task::spawn_blocking(move || decode_output(&encoded, width, height))
            .await
            .map_err(|e| ModelError::RequestFailed(format!("decode task failed: {}", e)))?
    }
}

async fn check_status(response: reqwest::Response) -> ModelResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    error!("Backend error {}: {}", status, error_text);
    Err(ModelError::RequestFailed(format!("{}: {}", status, error_text)))
}

/// Decode a base64 image and force it to `width` x `height`.
fn decode_output(encoded: &str, width: u32, height: u32) -> ModelResult<Frame> {
    // Some servers prefix a data URL header.
    let payload = encoded
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded);
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| ModelError::InvalidResponse(format!("bad base64: {}", e)))?;
    let out = frame::decode(&bytes)?;
    if out.dimensions() == (width, height) {
        Ok(out)
    } else {
        debug!(
            "Resizing backend output {:?} to {}x{}",
            out.dimensions(),
            width,
            height
        );
        Ok(imageops::resize(&out, width, height, FilterType::Triangle))
    }
}

fn stage_error(err: &ModelError) -> String {
    let message = err.to_string();
    if message.chars().count() > STAGE_ERROR_CHARS {
        let short: String = message.chars().take(STAGE_ERROR_CHARS).collect();
        format!("ERROR: {}...", short)
    } else {
        format!("ERROR: {}", message)
    }
}

#[async_trait::async_trait]
impl ImageModel for RemoteImg2Img {
    fn name(&self) -> &str {
        "remote-img2img"
    }

    async fn load_model(&self) -> ModelResult<()> {
        info!("Loading model from {}", self.base_url);
        match self.load_stages().await {
            Ok(()) => {
                let mut status = self.status.write();
                status.loaded = true;
                status.stage = "READY".to_string();
                info!("Model loaded successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to load model: {}", e);
                let mut status = self.status.write();
                status.loaded = false;
                status.stage = stage_error(&e);
                Err(e)
            }
        }
    }

    async fn generate(&self, request: GenerateRequest) -> ModelResult<Frame> {
        if !self.status.read().loaded {
            return Err(ModelError::NotLoaded);
        }
        self.img2img(request).await
    }

    fn status(&self) -> ModelStatus {
        self.status.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_output_resizes_mismatched_images() {
        let png = frame::encode_png(&frame::solid(32, 32, [10, 20, 30])).unwrap();
        let encoded = BASE64.encode(png);
        let out = decode_output(&encoded, 48, 16).unwrap();
        assert_eq!(out.dimensions(), (48, 16));
        assert_eq!(out.get_pixel(5, 5).0, [10, 20, 30]);
    }

    #[test]
    fn decode_output_accepts_data_urls() {
        let png = frame::encode_png(&frame::solid(8, 8, [1, 1, 1])).unwrap();
        let encoded = format!("data:image/png;base64,{}", BASE64.encode(png));
        assert_eq!(decode_output(&encoded, 8, 8).unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn decode_output_rejects_bad_base64() {
        assert!(matches!(
            decode_output("!!!", 8, 8),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn stage_error_truncates_long_messages() {
        let long = ModelError::RequestFailed("x".repeat(200));
        let stage = stage_error(&long);
        assert!(stage.starts_with("ERROR: request failed: "));
        assert!(stage.ends_with("..."));
        assert_eq!(stage.chars().count(), "ERROR: ".len() + STAGE_ERROR_CHARS + 3);
        assert_eq!(stage_error(&ModelError::NotLoaded), "ERROR: model not loaded");
    }
}
