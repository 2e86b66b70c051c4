//! Axum HTTP handlers for the web server
//!
//! Provides the MCP endpoints (WebSocket and single-shot HTTP POST) plus the
//! informational `/`, `/health` and `/tools` endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::registry::ToolDescriptor;
use crate::mcp::{rpc::Response as RpcResponse, server::McpServer};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EndpointMap {
    pub websocket: &'static str,
    pub http: &'static str,
    pub health: &'static str,
    pub tools: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServerInfoResponse {
    pub name: String,
    pub version: String,
    pub protocol: &'static str,
    pub endpoints: EndpointMap,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub protocol: &'static str,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDescriptor>,
}

pub async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    let identity = state.server.identity();
    Json(ServerInfoResponse {
        name: identity.name.clone(),
        version: identity.version.clone(),
        protocol: "MCP",
        endpoints: EndpointMap {
            websocket: "/mcp",
            http: "/mcp/http",
            health: "/health",
            tools: "/tools",
        },
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        protocol: "MCP",
        version: state.server.identity().version.clone(),
    })
}

pub async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.server.registry().list_tools(),
    })
}

/// Single-shot transport: one JSON-RPC message per POST. Protocol errors are
/// still answered with HTTP 200.
pub async fn mcp_http(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    Json(state.server.handle_message(&body).await)
}

pub async fn mcp_websocket(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(socket, state.server))
}

/// Duplex transport: each inbound frame is fully dispatched and answered before
/// the next one is read.
async fn serve_socket(mut socket: WebSocket, server: Arc<McpServer>) {
    info!("client connected");

    while let Some(frame) = socket.recv().await {
        let response = match frame {
            Ok(Message::Text(text)) => server.handle_message(text.as_str().as_bytes()).await,
            Ok(Message::Binary(bytes)) => server.handle_message(&bytes).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(err) => {
                warn!(error = %err, "websocket receive failed");
                break;
            }
        };

        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize mcp response");
                break;
            }
        };

        if let Err(err) = socket.send(Message::Text(payload.into())).await {
            warn!(error = %err, "websocket send failed");
            break;
        }
    }

    info!("client disconnected");
}
