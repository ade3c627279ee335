use axum::{Json, extract::State, response::IntoResponse};

use crate::server::AppState;

/// Health check endpoint - returns hub status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.health())
}

/// Metrics endpoint - returns detailed hub metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness check: returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
