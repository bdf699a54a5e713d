//! HTTP surface
//!
//! | Method  | Path          | Description                                  |
//! |---------|---------------|----------------------------------------------|
//! | GET     | /health       | Liveness check                               |
//! | GET     | /status       | Capture/listener state and current config    |
//! | POST    | /start        | Start capture and the click listener         |
//! | POST    | /stop         | Stop both                                    |
//! | POST    | /config       | Partial config update (`hz`, `output_base`)  |
//! | POST    | /ext_event    | Browser-extension click                      |
//! | POST    | /capture_once | Take one screenshot now                      |
//! | POST    | /test_log     | Write a `test` record                        |
//!
//! Every route allows any origin, method and header, so the extension can
//! call from pages and preflight requests succeed on all of them.

use crate::capture::config::CaptureConfig;
use crate::capture::input::types::ExtEvent;
use crate::commands::service::{ActivityService, ServiceStatus, TestLogOutcome};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

/// State shared across handlers
pub type AppState = Arc<ActivityService>;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub started: bool,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub stopped: bool,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(default)]
    pub hz: Option<f64>,
    #[serde(default)]
    pub output_base: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtEventResponse {
    pub ok: bool,
    pub merged: bool,
    pub screenshot_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub ok: bool,
    pub path: PathBuf,
    pub x: i32,
    pub y: i32,
    pub monitor_index: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestLogResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub paths: TestLogOutcome,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn status(State(service): State<AppState>) -> Json<ServiceStatus> {
    Json(service.status().await)
}

pub async fn start(State(service): State<AppState>) -> Json<StartResponse> {
    let status = service.start().await;
    Json(StartResponse {
        started: status.capture_running || status.listener_running,
        status,
    })
}

pub async fn stop(State(service): State<AppState>) -> Json<StopResponse> {
    let status = service.stop().await;
    Json(StopResponse {
        stopped: true,
        status,
    })
}

pub async fn set_config(
    State(service): State<AppState>,
    body: Bytes,
) -> Result<Json<CaptureConfig>, ApiError> {
    let request: ConfigRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConfigRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))))?
    };
    Ok(Json(service.set_config(request.hz, request.output_base)))
}

pub async fn ext_event(
    State(service): State<AppState>,
    body: Bytes,
) -> Result<Json<ExtEventResponse>, ApiError> {
    let event: ExtEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("Rejecting malformed extension payload: {}", e);
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string())))
    })?;

    let outcome = service.submit_ext_event(event).await;
    Ok(Json(ExtEventResponse {
        ok: true,
        merged: outcome.merged,
        screenshot_path: outcome.screenshot_path,
    }))
}

pub async fn capture_once(
    State(service): State<AppState>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let event = service.capture_once().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(e.to_string())),
        )
    })?;
    Ok(Json(CaptureResponse {
        ok: true,
        path: event.path,
        x: event.x,
        y: event.y,
        monitor_index: event.monitor_index,
    }))
}

pub async fn test_log(State(service): State<AppState>) -> Result<Json<TestLogResponse>, ApiError> {
    let paths = service.test_log().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
    })?;
    Ok(Json(TestLogResponse { ok: true, paths }))
}

/// Create the router with all routes configured.
pub fn create_router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/config", post(set_config))
        .route("/ext_event", post(ext_event))
        .route("/capture_once", post(capture_once))
        .route("/test_log", post(test_log))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Bind and serve until `shutdown` is cancelled.
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn start_server(
    addr: SocketAddr,
    service: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!("HTTP server listening on {}", actual_addr);

    let app = create_router(service);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, handle))
}
