use anyhow::Context;
use std::sync::Arc;

use relay_azure::{AzureChat, ChatOrchestrator, ToolRegistry};
use relay_server::{AppState, MemoryLogStore, ServerConfig, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env();

    // Provider credentials are startup-fatal: without them there is nothing
    // to serve.
    let client = AzureChat::from_env().context("Azure OpenAI configuration is incomplete")?;
    tracing::info!(
        endpoint = client.endpoint(),
        deployment = client.deployment(),
        api_version = client.api_version(),
        "provider configured"
    );

    let tools = ToolRegistry::demo();
    tracing::info!(plugin = tools.plugin_name(), functions = ?tools.names(), "tools registered");

    let state = AppState {
        orchestrator: Arc::new(ChatOrchestrator::new(client, tools)),
        log_store: Arc::new(MemoryLogStore::default()),
    };
    let app = build_router(state, &config)?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "chat relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}
