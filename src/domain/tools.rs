//! Built-in tools registered at startup
//!
//! `calculate`, `get_time` and `echo`. Each handler is independent and can be
//! replaced by registering another handler under the same name. Expected
//! failures (a bad expression, an unknown timezone) are reported inside the
//! result object with `success: false`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::domain::{
    calculator::{self, Number},
    registry::{JsonObject, ToolError, ToolHandler, ToolRegistry},
};

pub const CALCULATE: &str = "calculate";
pub const GET_TIME: &str = "get_time";
pub const ECHO: &str = "echo";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Deserialize)]
struct CalculateArguments {
    expression: String,
}

#[derive(Debug, Deserialize)]
struct GetTimeArguments {
    #[serde(default = "default_timezone")]
    timezone: String,
}

#[derive(Debug, Deserialize)]
struct EchoArguments {
    message: String,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: JsonObject) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| ToolError::invalid_arguments(tool, err.to_string()))
}

pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register(
        CALCULATE,
        "Perform mathematical calculations safely",
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., '2 + 2', '10 * 5')"
                }
            },
            "required": ["expression"]
        }),
        CalculateTool,
    );

    registry.register(
        GET_TIME,
        "Get current server time in specified timezone",
        json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "Timezone name (e.g., 'UTC', 'America/New_York')",
                    "default": DEFAULT_TIMEZONE
                }
            }
        }),
        GetTimeTool,
    );

    registry.register(
        ECHO,
        "Echo back the input message",
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Message to echo back"
                }
            },
            "required": ["message"]
        }),
        EchoTool,
    );
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CalculateTool;

#[async_trait]
impl ToolHandler for CalculateTool {
    async fn call(&self, arguments: JsonObject) -> Result<JsonObject, ToolError> {
        let arguments: CalculateArguments = parse_arguments(CALCULATE, arguments)?;
        Ok(calculate(&arguments.expression))
    }
}

pub fn calculate(expression: &str) -> JsonObject {
    match calculator::evaluate(expression).and_then(Number::to_json) {
        Ok(result) => JsonObject::from_iter([
            ("success".to_string(), json!(true)),
            ("result".to_string(), result),
            ("expression".to_string(), json!(expression)),
        ]),
        Err(err) => JsonObject::from_iter([
            ("success".to_string(), json!(false)),
            ("error".to_string(), json!(err.to_string())),
            ("expression".to_string(), json!(expression)),
        ]),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetTimeTool;

#[async_trait]
impl ToolHandler for GetTimeTool {
    async fn call(&self, arguments: JsonObject) -> Result<JsonObject, ToolError> {
        let arguments: GetTimeArguments = parse_arguments(GET_TIME, arguments)?;
        Ok(time_in_zone(&arguments.timezone, Utc::now()))
    }
}

pub fn time_in_zone(timezone: &str, now: DateTime<Utc>) -> JsonObject {
    let Ok(zone) = Tz::from_str_insensitive(timezone) else {
        return JsonObject::from_iter([
            ("success".to_string(), json!(false)),
            ("error".to_string(), json!(format!("unknown timezone '{timezone}'"))),
            ("timezone".to_string(), json!(timezone)),
        ]);
    };

    let local = now.with_timezone(&zone);
    JsonObject::from_iter([
        ("success".to_string(), json!(true)),
        (
            "time".to_string(),
            json!(local.to_rfc3339_opts(SecondsFormat::Micros, false)),
        ),
        ("timezone".to_string(), json!(timezone)),
        (
            "formatted".to_string(),
            json!(local.format("%Y-%m-%d %H:%M:%S %Z").to_string()),
        ),
    ])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, arguments: JsonObject) -> Result<JsonObject, ToolError> {
        let arguments: EchoArguments = parse_arguments(ECHO, arguments)?;
        Ok(echo(arguments.message))
    }
}

pub fn echo(message: String) -> JsonObject {
    let length = message.chars().count();
    JsonObject::from_iter([
        ("success".to_string(), json!(true)),
        ("echo".to_string(), json!(message)),
        ("length".to_string(), json!(length)),
    ])
}
