//! JSON-RPC 2.0 framing and the MCP result types shared by both transports.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::config::ConfigError;
use crate::openapi::OpenApiError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "hdx-mcp-server";

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// `None` only when the member is absent; `"id": null` is `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Request {
    /// Requests without an id are notifications and get no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

impl Response {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: ServerError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(ResponseError::from(error)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl From<ServerError> for ResponseError {
    fn from(err: ServerError) -> Self {
        let (code, message) = match err {
            ServerError::InvalidRequest(message) => (-32600, message),
            ServerError::InvalidMethod(method) => (-32601, format!("Unknown method: {method}")),
            ServerError::InvalidParams(message) => (-32602, message),
            ServerError::Json(err) => (-32700, format!("Parse error: {err}")),
            ServerError::Serialization(err) => (-32603, err.to_string()),
            other => {
                tracing::error!("internal error: {other}");
                (-32603, "Internal error".to_string())
            }
        };

        Self {
            code,
            message,
            data: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown method: {0}")]
    InvalidMethod(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    OpenApi(#[from] OpenApiError),
    #[error(transparent)]
    Hapi(#[from] hdx_hapi::HapiError),
    #[error("serialization error: {0}")]
    Serialization(serde_json::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

pub fn parse_required_params<T>(method: &str, params: Option<Value>) -> ServerResult<T>
where
    T: DeserializeOwned,
{
    match params {
        Some(value) => serde_json::from_value(value)
            .map_err(|err| ServerError::InvalidParams(format!("{method}: {err}"))),
        None => Err(ServerError::InvalidParams(format!(
            "{method}: missing parameters"
        ))),
    }
}

pub fn parse_optional_params<T>(method: &str, params: Option<Value>) -> ServerResult<T>
where
    T: DeserializeOwned + Default,
{
    match params {
        Some(Value::Null) | None => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|err| ServerError::InvalidParams(format!("{method}: {err}"))),
    }
}

pub fn to_value<T: Serialize>(value: &T) -> ServerResult<Value> {
    serde_json::to_value(value).map_err(ServerError::Serialization)
}

#[derive(Debug, Default, Deserialize)]
pub struct InitializeParams {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default, rename = "clientInfo")]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
    capabilities: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'static str>,
}

impl InitializeResult {
    pub fn new(params: InitializeParams) -> Self {
        if let Some(client) = &params.client_info {
            tracing::info!(
                "Client connected: {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        Self {
            protocol_version: params
                .protocol_version
                .unwrap_or_else(|| PROTOCOL_VERSION.to_string()),
            server_info: ServerInfo {
                name: SERVER_NAME,
                version: env!("CARGO_PKG_VERSION"),
            },
            capabilities: json!({
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false }
            }),
            instructions: Some(
                "Tools for the HDX Humanitarian API (HAPI). Check data availability with \
                 metadata_data_availability_get before querying a country.",
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GetPromptParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// MCP `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl CallToolResult {
    /// Successful result carrying a JSON value as text, and as structured content
    /// when it is an object.
    pub fn json(value: Value) -> Self {
        Self::from_value(value, false)
    }

    /// Result from an upstream response body. Non-JSON bodies are passed through as text.
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Self::json(value),
            Err(_) => Self {
                content: vec![ToolContent::Text { text: body }],
                structured_content: None,
                is_error: false,
            },
        }
    }

    /// Failed result with a message meant for the caller.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: true,
        }
    }

    pub(crate) fn from_value(value: Value, is_error: bool) -> Self {
        let text = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
        let structured_content = value.is_object().then_some(value);
        Self {
            content: vec![ToolContent::Text { text }],
            structured_content,
            is_error,
        }
    }

    /// Text of the first content item.
    pub fn text(&self) -> &str {
        match self.content.first() {
            Some(ToolContent::Text { text }) => text,
            None => "",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct ListPromptsResult {
    pub prompts: Vec<PromptDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct GetPromptResult {
    pub description: &'static str,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: ToolContent,
}

/// Tool arguments as an object; `null` and absent arguments are an empty object.
pub fn arguments_object(arguments: Option<Value>) -> Result<Map<String, Value>, ServerError> {
    match arguments {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ServerError::InvalidParams(format!(
            "tools/call: arguments must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let cases = [
            (ServerError::InvalidRequest("x".into()), -32600),
            (ServerError::InvalidMethod("x".into()), -32601),
            (ServerError::InvalidParams("x".into()), -32602),
            (
                ServerError::Json(serde_json::from_str::<Value>("{").unwrap_err()),
                -32700,
            ),
            (
                ServerError::Io(std::io::Error::other("pipe closed")),
                -32603,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ResponseError::from(err).code, code);
        }
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let err = ResponseError::from(ServerError::Io(std::io::Error::other("secret detail")));
        assert_eq!(err.message, "Internal error");
    }

    #[test]
    fn call_tool_result_shape() {
        let value = serde_json::to_value(CallToolResult::json(json!({"a": 1}))).unwrap();
        assert_eq!(
            value,
            json!({
                "content": [{"type": "text", "text": "{\"a\":1}"}],
                "structuredContent": {"a": 1},
                "isError": false
            })
        );

        let arr = CallToolResult::json(json!([1, 2]));
        assert!(arr.structured_content.is_none());

        let err = serde_json::to_value(CallToolResult::error("nope")).unwrap();
        assert_eq!(err["isError"], true);
        assert!(err.get("structuredContent").is_none());
    }

    #[test]
    fn non_json_body_is_text() {
        let result = CallToolResult::from_body("plain".to_string());
        assert_eq!(result.text(), "plain");
        assert!(!result.is_error);
    }

    #[test]
    fn arguments_must_be_an_object() {
        assert!(arguments_object(None).unwrap().is_empty());
        assert!(arguments_object(Some(Value::Null)).unwrap().is_empty());
        assert!(matches!(
            arguments_object(Some(json!([1]))),
            Err(ServerError::InvalidParams(_))
        ));
    }

    #[test]
    fn notifications_have_no_id() {
        let request: Request =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn null_id_is_a_request() {
        let request: Request =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).unwrap();
        assert!(!request.is_notification());
        assert_eq!(request.id, Some(Value::Null));
    }
}
