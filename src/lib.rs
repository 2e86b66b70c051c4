use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use mcp::server::McpServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
}

impl AppState {
    pub fn new(server: McpServer) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::handlers::server_info))
        .route("/health", get(http::handlers::health))
        .route("/tools", get(http::handlers::list_tools))
        .route("/mcp", get(http::handlers::mcp_websocket))
        .route("/mcp/http", post(http::handlers::mcp_http))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use futures::{SinkExt, StreamExt};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tokio_tungstenite::{connect_async, tungstenite::Message};
    use tower::ServiceExt;

    use crate::domain::registry::ToolRegistry;
    use crate::mcp::server::ServerIdentity;

    use super::*;

    fn state() -> AppState {
        AppState::new(McpServer::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            ServerIdentity {
                name: "mcp-tool-server".to_string(),
                version: "1.0.0".to_string(),
            },
        ))
    }

    fn app() -> Router {
        build_app(state())
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json = serde_json::from_slice(&body).expect("valid json response");
        (status, body_json)
    }

    async fn post_mcp(body: &'static str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/mcp/http")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json = serde_json::from_slice(&body).expect("valid json response");
        (status, body_json)
    }

    #[tokio::test]
    async fn root_describes_endpoints() {
        let (status, body) = get_json("/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "mcp-tool-server");
        assert_eq!(body["protocol"], "MCP");
        assert_eq!(body["endpoints"]["websocket"], "/mcp");
        assert_eq!(body["endpoints"]["http"], "/mcp/http");
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (status, body) = get_json("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "status": "healthy", "protocol": "MCP", "version": "1.0.0" })
        );
    }

    #[tokio::test]
    async fn tools_route_lists_registry() {
        let (status, body) = get_json("/tools").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"][0]["name"], "calculate");
        assert_eq!(body["tools"][1]["name"], "get_time");
        assert_eq!(body["tools"][2]["name"], "echo");
        assert!(body["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/services")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mcp_http_unknown_method_returns_method_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/mcp/http")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"unknown"}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(
            body,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32601,\"message\":\"Method not found: unknown\"}}"
        );
    }

    #[tokio::test]
    async fn mcp_http_initialize_returns_result() {
        let (status, body) = post_mcp(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(body["result"]["serverInfo"]["name"], "mcp-tool-server");
        assert_eq!(body["result"]["serverInfo"]["version"], "1.0.0");
        assert!(body["result"]["capabilities"]["tools"].is_object());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn mcp_http_tools_call_echo() {
        let (status, body) = post_mcp(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let text = body["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        let payload: Value = serde_json::from_str(text).expect("json text");
        assert_eq!(payload, json!({ "success": true, "echo": "hi", "length": 2 }));
    }

    #[tokio::test]
    async fn mcp_http_malformed_body_is_parse_error() {
        let (status, body) = post_mcp("{ this is not json").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn websocket_and_http_answer_identically() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app().into_make_service())
                .await
                .expect("serve test app");
        });

        let (mut socket, _) = connect_async(format!("ws://{addr}/mcp"))
            .await
            .expect("websocket handshake");

        let messages = [
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"calculate","arguments":{"expression":"6 * 7"}}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope"}}"#,
            "not json at all",
        ];

        for message in messages {
            socket
                .send(Message::text(message))
                .await
                .expect("send frame");
            let reply = socket
                .next()
                .await
                .expect("reply frame")
                .expect("valid frame");
            let over_socket: Value =
                serde_json::from_str(reply.to_text().expect("text frame")).expect("json reply");

            let (_, over_http) = post_mcp(message).await;
            assert_eq!(over_socket, over_http, "transport mismatch for {message}");
        }

        socket.close(None).await.expect("close websocket");
    }
}
