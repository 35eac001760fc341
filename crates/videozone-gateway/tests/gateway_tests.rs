//! Tests for videozone-gateway: routes driven through the router with oneshot

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use videozone_core::{frame, ServerConfig, VideozoneConfig, DEFAULT_PROMPT};
use videozone_engine::HallucinationEngine;
use videozone_gateway::*;
use videozone_model::{MockBehavior, MockModel};

fn setup() -> (Arc<GatewayState>, Arc<MockModel>) {
    let model = Arc::new(MockModel::constant(MockBehavior::Echo));
    let engine = HallucinationEngine::with_initial_frame(
        &VideozoneConfig::default(),
        model.clone(),
        frame::solid(912, 512, [128, 128, 128]),
    )
    .unwrap();
    let state = Arc::new(GatewayState::new(
        Arc::new(engine),
        &ServerConfig::default(),
    ));
    (state, model)
}

async fn send(state: &Arc<GatewayState>, method: Method, uri: &str) -> axum::response::Response {
    router(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ===========================================================================
// Control endpoints
// ===========================================================================

#[tokio::test]
async fn root_reports_online_with_prompt() {
    let (state, _) = setup();
    let response = send(&state, Method::GET, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["message"], "VideoZone Engine Online");
    assert_eq!(body["prompt"], DEFAULT_PROMPT);
}

#[tokio::test]
async fn health_reports_version_and_progress() {
    let (state, _) = setup();
    state.engine.step().await.unwrap();
    let body = json(send(&state, Method::GET, "/health").await).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["running"], false);
    assert_eq!(body["frame_count"], 1);
}

#[tokio::test]
async fn update_prompt_reaches_next_cycle() {
    let (state, model) = setup();
    let response = send(
        &state,
        Method::POST,
        "/update_prompt?prompt=underwater%20cathedral",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "Prompt updated");
    assert_eq!(body["prompt"], "underwater cathedral");

    state.engine.step().await.unwrap();
    assert_eq!(model.prompts(), vec!["underwater cathedral"]);
}

#[tokio::test]
async fn update_prompt_requires_prompt() {
    let (state, _) = setup();
    let response = send(&state, Method::POST, "/update_prompt").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.engine.params().prompt(), DEFAULT_PROMPT);
}

#[tokio::test]
async fn update_params_passes_values_through() {
    let (state, _) = setup();
    let response = send(
        &state,
        Method::POST,
        "/update_params?strength=0.5&guidance_scale=12",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "Params updated");
    assert_eq!(body["strength"], 0.5);
    assert_eq!(body["guidance_scale"], 12.0);

    let params = state.engine.params();
    assert_eq!(params.strength, 0.5);
    assert_eq!(params.guidance_scale, 12.0);
}

#[tokio::test]
async fn update_prompt_rejects_get() {
    let (state, _) = setup();
    let response = send(&state, Method::GET, "/update_prompt?prompt=x").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ===========================================================================
// Status and frames
// ===========================================================================

#[tokio::test]
async fn debug_status_serializes_engine_status() {
    let (state, _) = setup();
    let body = json(send(&state, Method::GET, "/debug/status").await).await;
    assert_eq!(body["status"], "INITIALIZING");
    assert_eq!(body["frame_count"], 0);
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["loading_state"], "READY");
    assert_eq!(body["device"], "mock");
    assert_eq!(body["spark_active"], false);
    assert_eq!(body["width"], 912);
    assert_eq!(body["height"], 512);

    state.engine.step().await.unwrap();
    let body = json(send(&state, Method::GET, "/debug/status").await).await;
    assert_eq!(body["status"], "RUNNING");
    assert_eq!(body["frame_count"], 1);
    assert_eq!(body["last_brightness"], 128.0);
}

#[tokio::test]
async fn frame_endpoint_serves_jpeg() {
    let (state, _) = setup();
    let response = send(&state, Method::GET, "/frame.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(frame::decode(&body).unwrap().dimensions(), (912, 512));
}

#[tokio::test]
async fn video_feed_streams_multipart_frames() {
    let (state, _) = setup();
    let response = send(&state, Method::GET, "/video_feed").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut chunks = response.into_body().into_data_stream();
    for _ in 0..2 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), chunks.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let header_len = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".len();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(chunk.ends_with(b"\r\n"));
        let jpeg = &chunk[header_len..chunk.len() - 2];
        assert_eq!(frame::decode(jpeg).unwrap().dimensions(), (912, 512));
    }
}

#[tokio::test]
async fn video_feed_ends_on_shutdown() {
    let (state, _) = setup();
    let response = send(&state, Method::GET, "/video_feed").await;
    let mut chunks = response.into_body().into_data_stream();

    assert!(chunks.next().await.is_some());
    state.shutdown.cancel();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while chunks.next().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (state, _) = setup();
    let response = send(&state, Method::GET, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
