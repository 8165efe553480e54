//! HTTP backend that relays chat completions as server-sent events
//!
//! The router exposes the chat endpoint (streaming and non-streaming), health
//! probes and the tool status listing; shared state is one orchestrator and
//! one chat-log store, both constructed at startup and read-only afterwards.

use anyhow::Context;
use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use relay_azure::ChatOrchestrator;

pub mod config;
pub mod error;
pub mod log_store;
pub mod middleware;
pub mod routes;

pub use config::ServerConfig;
pub use error::ApiError;
pub use log_store::{ChatLogStore, LogEntry, MemoryLogStore, RequestRecord, ResponseRecord};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub log_store: Arc<dyn ChatLogStore>,
}

/// Assemble the router: routes, request logging, CORS restricted to the
/// configured origin. An unparseable origin is a configuration error and
/// fails startup.
pub fn build_router(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    let origin = config
        .allowed_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid allowed origin: {}", config.allowed_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health))
        .route("/api/chat", post(routes::chat::chat))
        .route("/api/chat/health", get(routes::health::chat_health))
        .route("/api/tools", get(routes::tools::list_tools))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(cors)
        .with_state(state))
}
