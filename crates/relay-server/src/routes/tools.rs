use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::AppState;

/// Registered tools and how often they have been invoked
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let tools = state.orchestrator.tools();

    Json(json!({
        "plugin": tools.plugin_name(),
        "functions": tools.names(),
        "total_invocations": tools.invocation_count(),
    }))
}
