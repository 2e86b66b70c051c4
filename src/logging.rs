//! Process-wide tracing setup and the per-request summary middleware
//!
//! Log lines go to stderr; `RUST_LOG` overrides [`DEFAULT_FILTER`].

use std::{fmt, time::Instant};

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Which surface of the server a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    WebSocket,
    Http,
    Info,
}

impl Channel {
    pub fn from_path(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "/mcp" => Self::WebSocket,
            "/mcp/http" => Self::Http,
            _ => Self::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Http => "http",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let channel = Channel::from_path(&path);
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    // An upgraded socket outlives this call; only the handshake is timed here.
    if status == StatusCode::SWITCHING_PROTOCOLS {
        info!(channel = %channel, handshake_ms = elapsed_ms, "websocket session opened");
        return response;
    }

    info!(
        method = %method,
        path = %path,
        channel = %channel,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_server_error() {
        warn!(channel = %channel, status = status.as_u16(), "request failed");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::Channel;

    #[test]
    fn classifies_request_paths() {
        assert_eq!(Channel::from_path("/mcp"), Channel::WebSocket);
        assert_eq!(Channel::from_path("/mcp/"), Channel::WebSocket);
        assert_eq!(Channel::from_path("/mcp/http"), Channel::Http);
        assert_eq!(Channel::from_path("/"), Channel::Info);
        assert_eq!(Channel::from_path("/health"), Channel::Info);
        assert_eq!(Channel::from_path("/tools"), Channel::Info);
    }

    #[test]
    fn channel_labels_are_stable() {
        assert_eq!(Channel::WebSocket.to_string(), "websocket");
        assert_eq!(Channel::Http.to_string(), "http");
        assert_eq!(Channel::Info.as_str(), "info");
    }
}
