use hdx_hapi::HapiClient;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::config::Settings;
use crate::generated::generate_tools;
use crate::openapi;
use crate::prompts;
use crate::protocol::{
    CallToolParams, GetPromptParams, InitializeParams, InitializeResult, JSONRPC_VERSION,
    ListPromptsResult, ListToolsResult, Request, Response, ServerError, ServerResult,
    arguments_object, parse_optional_params, parse_required_params, to_value,
};
use crate::registry::{CUSTOM_TOOL_NAMES, ToolContext, ToolRegistry};

/// The MCP server: HAPI client, tool registry and JSON-RPC dispatch.
///
/// Holds no mutable state, so one instance serves any number of concurrent requests.
pub struct HdxMcpServer {
    settings: Arc<Settings>,
    client: HapiClient,
    registry: ToolRegistry,
    total_endpoints: usize,
}

impl std::fmt::Debug for HdxMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdxMcpServer")
            .field("base_url", &self.settings.base_url)
            .field("tools", &self.registry.len())
            .field("total_endpoints", &self.total_endpoints)
            .finish()
    }
}

impl HdxMcpServer {
    /// Fetch and prepare the OpenAPI document, then build every tool.
    pub async fn bootstrap(settings: Settings) -> ServerResult<Self> {
        let document = openapi::fetch_document(&settings.openapi_url, settings.timeout).await?;
        let document = openapi::prepare_document(document)?;
        Self::from_document(settings, &document)
    }

    /// Build the server from an already prepared OpenAPI document.
    pub fn from_document(settings: Settings, document: &Value) -> ServerResult<Self> {
        let client = HapiClient::new(Arc::new(settings.hapi_configuration()))?;
        let registry = ToolRegistry::new(generate_tools(document, CUSTOM_TOOL_NAMES));
        let total_endpoints = openapi::path_count(document);

        tracing::info!(
            "HDX MCP server ready: {} tools over {} endpoints at {}",
            registry.len(),
            total_endpoints,
            settings.base_url
        );

        Ok(Self {
            settings: Arc::new(settings),
            client,
            registry,
            total_endpoints,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve newline-delimited JSON-RPC over stdin/stdout until stdin closes.
    pub async fn run_stdio(&self) -> ServerResult<()> {
        tracing::info!("Starting HDX MCP server on stdio");
        self.serve_lines(BufReader::new(io::stdin()), BufWriter::new(io::stdout()))
            .await
    }

    /// Serve one JSON-RPC message per line from `reader`, answering on `writer`.
    pub async fn serve_lines<R, W>(&self, reader: R, mut writer: W) -> ServerResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(trimmed).await {
                let payload = serde_json::to_string(&response).map_err(ServerError::Serialization)?;
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        tracing::info!("stdin closed, stopping");
        Ok(())
    }

    /// Handle one raw JSON-RPC message. Notifications produce no response.
    pub async fn handle_message(&self, raw: &str) -> Option<Response> {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("unparseable message: {err}");
                return Some(Response::error(None, ServerError::Json(err)));
            }
        };

        let id = value.get("id").cloned();
        let request = match serde_json::from_value::<Request>(value) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!("invalid request: {err}");
                return Some(Response::error(id, ServerError::InvalidRequest(err.to_string())));
            }
        };

        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: Request) -> Option<Response> {
        if let Some(version) = request.jsonrpc.as_deref()
            && version != JSONRPC_VERSION
        {
            return Some(Response::error(
                request.id,
                ServerError::InvalidRequest(format!("unsupported jsonrpc version {version}")),
            ));
        }

        let notification = request.is_notification();
        let outcome = self.dispatch(&request.method, request.params).await;

        if notification {
            if let Err(err) = outcome {
                tracing::debug!("notification {} failed: {err}", request.method);
            }
            return None;
        }

        Some(match outcome {
            Ok(result) => Response::success(request.id, result),
            Err(err) => Response::error(request.id, err),
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> ServerResult<Value> {
        match method {
            "initialize" => {
                let params: InitializeParams = parse_optional_params(method, params)?;
                to_value(&InitializeResult::new(params))
            }
            "notifications/initialized" | "initialized" => Ok(Value::Null),
            "ping" => Ok(serde_json::json!({})),
            "shutdown" => {
                tracing::info!("shutdown requested");
                Ok(Value::Null)
            }
            // Single page; `cursor` is ignored.
            "tools/list" => to_value(&ListToolsResult {
                tools: self.registry.descriptors(),
                next_cursor: None,
            }),
            "tools/call" => {
                let params: CallToolParams = parse_required_params(method, params)?;
                let arguments = arguments_object(params.arguments)?;
                let context = ToolContext {
                    client: &self.client,
                    base_url: &self.settings.base_url,
                    total_endpoints: self.total_endpoints,
                };
                let result = self.registry.call(&params.name, arguments, &context).await?;
                to_value(&result)
            }
            "prompts/list" => to_value(&ListPromptsResult {
                prompts: prompts::list_prompts(),
            }),
            "prompts/get" => {
                let params: GetPromptParams = parse_required_params(method, params)?;
                to_value(&prompts::get_prompt(&params.name)?)
            }
            other => Err(ServerError::InvalidMethod(other.to_string())),
        }
    }
}
