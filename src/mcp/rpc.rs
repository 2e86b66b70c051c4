//! JSON-RPC request and response records
//!
//! Decodes raw frames into [`Request`]s and builds [`Response`]s whose outcome is
//! exactly one of `result` or `error`.

use rust_mcp_sdk::schema::RequestId;
use serde::{Deserialize, Serialize};

use crate::domain::registry::JsonObject;
use crate::errors::AppError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default = "default_jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonObject>,
}

fn default_jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<&AppError> for RpcError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Serialized as a single `result` or `error` key next to `jsonrpc` and `id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(JsonObject),
    Error(RpcError),
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(id: Option<RequestId>, result: JsonObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: Option<RequestId>, err: &AppError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Error(RpcError::from(err)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(error) => Some(error),
        }
    }
}

/// Decodes one frame. Anything that is not a JSON object with a string `method`,
/// an integer or string `id` and object `params` is a parse error.
pub fn parse_request(raw: &[u8]) -> Result<Request, AppError> {
    let request: Request =
        serde_json::from_slice(raw).map_err(|err| AppError::parse(err.to_string()))?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(AppError::parse(format!(
            "unsupported jsonrpc version '{}'",
            request.jsonrpc
        )));
    }

    Ok(request)
}
