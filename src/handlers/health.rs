use axum::{extract::State, Json};
use crate::models::HealthResponse;
use crate::state::AppState;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint
pub async fn ready_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.registry.session_count();
    debug!("Readiness check requested ({} live sessions)", sessions);
    Json(HealthResponse {
        status: "ok".to_string(),
        message: format!("Service is ready, {} live session(s)", sessions),
    })
}
