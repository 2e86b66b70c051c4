use std::sync::Arc;

use mcp_tool_server::{
    build_app, config::Config, domain::registry::ToolRegistry, logging, mcp::server::McpServer,
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let registry = Arc::new(ToolRegistry::with_builtin_tools());
    let tool_count = registry.len();
    if registry.is_empty() {
        warn!("no tools registered; tools/call will reject every request");
    }
    let state = AppState::new(McpServer::new(registry, config.server_identity()));
    let app = build_app(state);
    let bind_socket = config.bind_socket()?;
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        server_name = %config.server_name,
        tools = tool_count,
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install shutdown signal handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
