//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides request decoding, method dispatch and response formatting. Transports
//! hand raw frames to [`server::McpServer::handle_message`] and send back the
//! response it returns.

pub mod rpc;
pub mod server;
