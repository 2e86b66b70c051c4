//! Tool registry exposed through `tools/list` and `tools/call`
//!
//! Owns every registered tool (descriptor plus handler), keeps them in registration
//! order and mediates invocation: lookup, central argument validation against the
//! declared input schema, then the handler call on its own task.

use std::{
    future::Future,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::domain::{tools::register_builtin_tools, utils::validate_arguments};

pub type JsonObject = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Callable behind a registered tool.
///
/// Arguments arrive already validated against the tool's input schema, with schema
/// defaults filled in. Expected failures belong in the returned object; an `Err` is
/// reported to the client as a protocol error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: JsonObject) -> Result<JsonObject, ToolError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(JsonObject) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonObject, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: JsonObject) -> Result<JsonObject, ToolError> {
        (self)(arguments).await
    }
}

/// Public view of a tool, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_tools() -> Self {
        let registry = Self::new();
        register_builtin_tools(&registry);
        registry
    }

    /// Inserts a tool, replacing any tool with the same name in place.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl ToolHandler + 'static,
    ) {
        let entry = RegisteredTool {
            descriptor: ToolDescriptor {
                name: name.into(),
                description: description.into(),
                input_schema,
            },
            handler: Arc::new(handler),
        };

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        let existing = tools
            .iter()
            .position(|tool| tool.descriptor.name == entry.descriptor.name);

        match existing {
            Some(index) => {
                debug!(tool = %entry.descriptor.name, "replacing registered tool");
                tools[index] = entry;
            }
            None => {
                debug!(tool = %entry.descriptor.name, "registering tool");
                tools.push(entry);
            }
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.read()
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub async fn execute_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<JsonObject, ToolError> {
        let (input_schema, handler) = {
            let tools = self.read();
            let tool = tools
                .iter()
                .find(|tool| tool.descriptor.name == name)
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            (tool.descriptor.input_schema.clone(), Arc::clone(&tool.handler))
        };

        let arguments = validate_arguments(&input_schema, arguments)
            .map_err(|reason| ToolError::invalid_arguments(name, reason))?;

        debug!(tool = name, "invoking tool handler");
        match tokio::spawn(async move { handler.call(arguments).await }).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(ToolError::failed(format!(
                "tool '{name}' panicked during execution"
            ))),
            Err(err) => Err(ToolError::failed(err.to_string())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<RegisteredTool>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }
}
