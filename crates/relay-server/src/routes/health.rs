use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};

use crate::AppState;

/// Root endpoint for basic liveness checks
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Chat relay is running" }))
}

/// Detailed health check endpoint
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": unix_seconds(),
        "service": "chat-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health of the chat pipeline: provider addressing (no secrets) and the
/// registered tool surface
pub async fn chat_health(State(state): State<AppState>) -> Json<Value> {
    let client = state.orchestrator.client();
    let tools = state.orchestrator.tools();

    Json(json!({
        "status": "healthy",
        "provider": {
            "endpoint": client.endpoint(),
            "deployment": client.deployment(),
            "api_version": client.api_version(),
        },
        "tools_registered": tools.len(),
        "timestamp": unix_seconds(),
    }))
}

fn unix_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}
