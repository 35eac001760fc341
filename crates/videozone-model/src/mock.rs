//! MockModel - deterministic image model for testing
//!
//! Implements `ImageModel` with scripted outputs and records every call so
//! tests can assert on prompts, parameters and ordering.

use crate::provider::{GenerateRequest, ImageModel, ModelError, ModelResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use videozone_core::{frame, Frame, ModelStatus};

/// What a single `generate` call returns.
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Return the input image unchanged
    Echo,
    /// Return a frame of the input's size filled with one colour
    Solid([u8; 3]),
    /// Return an error
    Error(String),
}

/// A recorded `generate` call.
#[derive(Clone, Debug)]
pub struct MockCall {
    pub prompt: String,
    pub strength: f32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
}

/// Behaviours are popped in order; once the script runs out every call gets
/// the default behaviour.
pub struct MockModel {
    script: Mutex<VecDeque<MockBehavior>>,
    default_behavior: MockBehavior,
    calls: Mutex<Vec<MockCall>>,
    loaded: AtomicBool,
    load_error: Option<String>,
    latency: Duration,
}

impl MockModel {
    /// Loaded model that always behaves the same way.
    pub fn constant(behavior: MockBehavior) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_behavior: behavior,
            calls: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(true),
            load_error: None,
            latency: Duration::ZERO,
        }
    }

    /// Loaded model that plays `behaviors` in order, then echoes.
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        let mock = Self::constant(MockBehavior::Echo);
        *mock.script.lock() = behaviors.into();
        mock
    }

    /// Starts unloaded; `load_model` flips it to loaded.
    pub fn unloaded(behavior: MockBehavior) -> Self {
        let mock = Self::constant(behavior);
        mock.loaded.store(false, Ordering::SeqCst);
        mock
    }

    /// Starts unloaded and `load_model` fails with `message`.
    pub fn failing_load(message: impl Into<String>) -> Self {
        let mut mock = Self::unloaded(MockBehavior::Echo);
        mock.load_error = Some(message.into());
        mock
    }

    /// Every `generate` call sleeps this long first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.prompt.clone()).collect()
    }

    fn next_behavior(&self) -> MockBehavior {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

#[async_trait::async_trait]
impl ImageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load_model(&self) -> ModelResult<()> {
        if let Some(message) = &self.load_error {
            return Err(ModelError::LoadFailed(message.clone()));
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> ModelResult<Frame> {
        self.calls.lock().push(MockCall {
            prompt: request.prompt.to_string(),
            strength: request.strength,
            guidance_scale: request.guidance_scale,
            width: request.image.width(),
            height: request.image.height(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.next_behavior() {
            MockBehavior::Echo => Ok(request.image),
            MockBehavior::Solid(rgb) => Ok(frame::solid(
                request.image.width(),
                request.image.height(),
                rgb,
            )),
            MockBehavior::Error(message) => Err(ModelError::RequestFailed(message)),
        }
    }

    fn status(&self) -> ModelStatus {
        let loaded = self.loaded.load(Ordering::SeqCst);
        let stage = match (&self.load_error, loaded) {
            (_, true) => "READY".to_string(),
            (Some(message), false) => format!("ERROR: {}", message),
            (None, false) => "IDLE".to_string(),
        };
        ModelStatus {
            loaded,
            stage,
            device: "mock".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest::new(Arc::from(prompt), frame::solid(4, 2, [9, 9, 9]), 0.3, 7.5)
    }

    #[tokio::test]
    async fn mock_records_calls() {
        let mock = MockModel::constant(MockBehavior::Solid([1, 2, 3]));
        let out = mock.generate(request("first")).await.unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        assert_eq!(out.get_pixel(0, 0).0, [1, 2, 3]);
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "first");
        assert_eq!(calls[0].strength, 0.3);
    }

    #[tokio::test]
    async fn mock_sequence_then_echo() {
        let mock = MockModel::sequence(vec![MockBehavior::Error("boom".into())]);
        assert!(mock.generate(request("a")).await.is_err());
        let echoed = mock.generate(request("b")).await.unwrap();
        assert_eq!(echoed.get_pixel(1, 1).0, [9, 9, 9]);
        assert_eq!(mock.prompts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn mock_load_lifecycle() {
        let mock = MockModel::unloaded(MockBehavior::Echo);
        assert!(!mock.is_loaded());
        mock.load_model().await.unwrap();
        assert!(mock.is_loaded());

        let failing = MockModel::failing_load("weights missing");
        assert!(failing.load_model().await.is_err());
        assert_eq!(failing.status().stage, "ERROR: weights missing");
    }
}
