//! HTTP gateway: control endpoints, status and the live video feed

use crate::stream::{self, frame_stream};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use videozone_core::ServerConfig;
use videozone_engine::HallucinationEngine;

pub struct GatewayState {
    pub engine: Arc<HallucinationEngine>,
    pub stream_interval: Duration,
    /// Ends open video feeds so graceful shutdown can complete.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(engine: Arc<HallucinationEngine>, config: &ServerConfig) -> Self {
        Self {
            engine,
            stream_interval: Duration::from_millis(config.stream_interval_ms),
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Deserialize)]
struct PromptQuery {
    prompt: String,
}

#[derive(Deserialize)]
struct ParamsQuery {
    strength: f32,
    guidance_scale: f32,
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/update_prompt", post(update_prompt_handler))
        .route("/update_params", post(update_params_handler))
        .route("/debug/status", get(status_handler))
        .route("/frame.jpg", get(frame_handler))
        .route("/video_feed", get(video_feed_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, then close the feeds and stop the engine.
pub async fn start_gateway(
    config: &ServerConfig,
    engine: Arc<HallucinationEngine>,
) -> anyhow::Result<()> {
    let state = Arc::new(GatewayState::new(engine.clone(), config));
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.bind.to_addr(), config.port).parse()?;

    info!("VideoZone Gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Video feed:   http://{}/video_feed", bind_addr);
    info!("  Status:       http://{}/debug/status", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    engine.stop().await;
    Ok(())
}

async fn root_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "VideoZone Engine Online",
        "prompt": state.engine.params().prompt(),
    }))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "running": state.engine.is_running(),
        "frame_count": state.engine.frame_count(),
    }))
}

async fn update_prompt_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PromptQuery>,
) -> impl IntoResponse {
    state.engine.update_prompt(query.prompt.clone());
    Json(serde_json::json!({
        "status": "Prompt updated",
        "prompt": query.prompt,
    }))
}

async fn update_params_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ParamsQuery>,
) -> impl IntoResponse {
    state
        .engine
        .update_params(query.strength, query.guidance_scale);
    Json(serde_json::json!({
        "status": "Params updated",
        "strength": query.strength,
        "guidance_scale": query.guidance_scale,
    }))
}

async fn status_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.engine.get_status())
}

async fn frame_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match state.engine.get_frame() {
        Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        None => (StatusCode::NOT_FOUND, "No frame available").into_response(),
    }
}

async fn video_feed_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let frames = frame_stream(
        state.engine.clone(),
        state.stream_interval,
        state.shutdown.clone(),
    );
    (
        [
            (header::CONTENT_TYPE, stream::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
}
