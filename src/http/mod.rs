//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing: the `/mcp` WebSocket and `/mcp/http` POST
//! listeners and the informational endpoints.

pub mod handlers;
