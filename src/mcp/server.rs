//! The central Model Context Protocol engine
//!
//! Routes decoded requests by method (`initialize`, `ping`, `tools/list`,
//! `tools/call`) to the tool registry and turns every outcome, including handler
//! failures, into a JSON-RPC response.

use std::{str::FromStr, sync::Arc};

use rust_mcp_sdk::schema::{
    CallToolResult, ContentBlock, Implementation, InitializeResult, ServerCapabilities,
    ServerCapabilitiesTools, TextContent,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::registry::{JsonObject, ToolRegistry};
use crate::errors::AppError;
use crate::mcp::rpc::{parse_request, Request, Response};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Every method the server answers. Anything else is `MethodNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }
}

impl FromStr for Method {
    type Err = AppError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "initialize" => Ok(Self::Initialize),
            "ping" => Ok(Self::Ping),
            "tools/list" => Ok(Self::ToolsList),
            "tools/call" => Ok(Self::ToolsCall),
            other => Err(AppError::method_not_found(other)),
        }
    }
}

/// Name and version reported as `serverInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
}

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    identity: ServerIdentity,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, identity: ServerIdentity) -> Self {
        Self { registry, identity }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Parses one raw frame and dispatches it. Frames that do not decode into a
    /// request get a parse error with a null id.
    pub async fn handle_message(&self, raw: &[u8]) -> Response {
        match parse_request(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                warn!(error = %err, "rejected malformed message");
                Response::failure(None, &err)
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let Request {
            id, method, params, ..
        } = request;
        let audit_params = redact_audit_params(params.as_ref());

        let outcome = match method.parse::<Method>() {
            Ok(parsed) => self.dispatch(parsed, params).await,
            Err(err) => Err(err),
        };

        let response = match outcome {
            Ok(result) => Response::success(id, result),
            Err(err) => Response::failure(id, &err),
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome = if response.is_error() { "failure" } else { "success" },
            error_code = response.error().map(|error| error.code),
            "mcp action audited"
        );

        response
    }

    async fn dispatch(
        &self,
        method: Method,
        params: Option<JsonObject>,
    ) -> Result<JsonObject, AppError> {
        debug!(method = method.as_str(), "dispatching request");
        match method {
            Method::Initialize => self.initialize(),
            Method::Ping => Ok(JsonObject::new()),
            Method::ToolsList => self.list_tools(),
            Method::ToolsCall => self.call_tool(params.unwrap_or_default()).await,
        }
    }

    fn initialize(&self) -> Result<JsonObject, AppError> {
        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: self.identity.name.clone(),
                version: self.identity.version.clone(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            protocol_version: SUPPORTED_PROTOCOL_VERSION.to_string(),
            instructions: None,
            meta: None,
        };

        to_object(&initialize_result)
    }

    fn list_tools(&self) -> Result<JsonObject, AppError> {
        let tools = serde_json::to_value(self.registry.list_tools())?;
        Ok(JsonObject::from_iter([("tools".to_string(), tools)]))
    }

    async fn call_tool(&self, mut params: JsonObject) -> Result<JsonObject, AppError> {
        let name = match params.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            None | Some(Value::Null) | Some(Value::String(_)) => {
                return Err(AppError::invalid_params("Missing tool name"))
            }
            Some(_) => return Err(AppError::invalid_params("Tool name must be a string")),
        };

        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => JsonObject::new(),
            Some(Value::Object(arguments)) => arguments,
            Some(_) => {
                return Err(AppError::invalid_params(
                    "Tool arguments must be an object",
                ))
            }
        };

        let result = self.registry.execute_tool(&name, arguments).await?;
        let text = serde_json::to_string_pretty(&result)?;

        to_object(&CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(text, None, None))],
            is_error: None,
            meta: None,
            structured_content: None,
        })
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<JsonObject, AppError> {
    match serde_json::to_value(value)? {
        Value::Object(object) => Ok(object),
        other => Err(AppError::internal(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

pub fn redact_audit_params(params: Option<&JsonObject>) -> Value {
    params
        .map(|params| redact_audit_value(&Value::Object(params.clone())))
        .unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|marker| normalized.contains(marker))
}
