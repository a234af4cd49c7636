use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::error::{ConfigError, ScanError};
use crate::scanner::Scanner;
use crate::types::{AutoScanConfig, ScanAggregate};

#[derive(Clone)]
pub struct AppState {
    scanner: Arc<Scanner>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceNameRequest {
    pub ip: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceNameResponse {
    pub ip: Ipv4Addr,
    pub name: String,
}

/// Request-scoped failures, rendered as `400 {"detail": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("scan task aborted")]
    Aborted,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Config(_) | ApiError::Scan(_) => StatusCode::BAD_REQUEST,
            ApiError::Aborted => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Build the API router plus static file fallback.
pub fn router(scanner: Arc<Scanner>, static_dir: impl Into<PathBuf>) -> Router {
    let state = AppState { scanner };

    let api = Router::new()
        .route("/config", get(get_config).post(post_config))
        .route("/scan", post(post_scan))
        .route("/device-name", post(post_device_name))
        .route("/results", get(get_results))
        .with_state(state);

    let static_svc = ServeDir::new(static_dir.into()).append_index_html_on_directories(true);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    bind: &str,
    scanner: Arc<Scanner>,
    static_dir: PathBuf,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(scanner, static_dir);
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving dashboard");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_config(State(app): State<AppState>) -> Json<AutoScanConfig> {
    Json(app.scanner.config().await)
}

async fn post_config(
    State(app): State<AppState>,
    Json(cfg): Json<AutoScanConfig>,
) -> Result<Json<AutoScanConfig>, ApiError> {
    Ok(Json(app.scanner.update_config(cfg).await?))
}

async fn post_scan(State(app): State<AppState>) -> Result<Json<ScanAggregate>, ApiError> {
    // Detached so a dropped request cannot abandon a half-merged scan.
    let scanner = app.scanner.clone();
    let joined = tokio::spawn(async move { scanner.run_scan().await }).await;
    match joined {
        Ok(res) => Ok(Json(res?.as_ref().clone())),
        Err(e) => {
            error!(error = %e, "scan task aborted");
            Err(ApiError::Aborted)
        }
    }
}

async fn post_device_name(
    State(app): State<AppState>,
    Json(req): Json<DeviceNameRequest>,
) -> Result<Json<DeviceNameResponse>, ApiError> {
    let ip: Ipv4Addr = req
        .ip
        .trim()
        .parse()
        .map_err(|_| ConfigError::DeviceAddress(req.ip.clone()))?;
    let name = app.scanner.set_device_name(ip, &req.name).await?;
    Ok(Json(DeviceNameResponse { ip, name }))
}

async fn get_results(State(app): State<AppState>) -> Json<ScanAggregate> {
    Json(app.scanner.results().await.as_ref().clone())
}
