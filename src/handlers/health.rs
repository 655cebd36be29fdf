use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub database: ComponentHealth,
    pub response_time_ms: u128,
}

static START_TIME: once_cell::sync::OnceCell<Instant> = once_cell::sync::OnceCell::new();

/// Pins the uptime baseline. Called once from main; later calls are no-ops.
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Liveness probe. Says nothing about dependencies, only that the
/// process answers.
async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Uptime, version and dependency status. Degrades to 503 when the
/// configured database stops answering.
async fn status_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();

    let database = match state.db.as_deref() {
        Some(db) => {
            let check_start = Instant::now();
            let result = crate::db::check_connection(db).await;
            let latency = check_start.elapsed().as_millis() as u64;
            ComponentHealth {
                status: if result.is_ok() {
                    ComponentStatus::Up
                } else {
                    ComponentStatus::Down
                },
                message: result.map_or_else(
                    |e| format!("Connection failed: {}", e),
                    |_| "Connection successful".to_string(),
                ),
                latency_ms: Some(latency),
            }
        }
        None => ComponentHealth {
            status: ComponentStatus::Up,
            message: "Not configured (in-memory repositories)".to_string(),
            latency_ms: None,
        },
    };

    let overall = match database.status {
        ComponentStatus::Up => ComponentStatus::Up,
        ComponentStatus::Down => ComponentStatus::Down,
    };
    let status_code = match overall {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = StatusResponse {
        status: overall,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: get_uptime_secs(),
        database,
        response_time_ms: start.elapsed().as_millis(),
    };

    (status_code, Json(response))
}

/// Creates the router for health endpoints
///
/// Endpoints:
/// - GET /health  - Liveness probe (always 200 while the server runs)
/// - GET /status  - Uptime, version and database connectivity
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness_check))
        .route("/status", get(status_check))
}
