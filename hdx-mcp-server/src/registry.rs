use hdx_hapi::HapiClient;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

use crate::generated::GeneratedTool;
use crate::protocol::{CallToolResult, ServerError, ServerResult, ToolDescriptor};
use crate::tools::{
    self, DATASET_INFO_TOOL, DatasetEnvelope, DatasetInfoArgs, Envelope, LocationFilter,
    LocationSearchEnvelope, SEARCH_LOCATIONS_TOOL, SERVER_INFO_TOOL,
};

/// Names taken by the hand-written tools.
pub const CUSTOM_TOOL_NAMES: &[&str] = &[SERVER_INFO_TOOL, DATASET_INFO_TOOL, SEARCH_LOCATIONS_TOOL];

#[derive(Debug)]
pub enum ToolHandler {
    Generated(GeneratedTool),
    ServerInfo,
    DatasetInfo,
    SearchLocations,
}

#[derive(Debug)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: ToolHandler,
}

/// What a tool call may need besides its arguments.
pub struct ToolContext<'a> {
    pub client: &'a HapiClient,
    pub base_url: &'a str,
    pub total_endpoints: usize,
}

/// Every tool the server exposes, built once at startup and read-only afterwards.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(generated: Vec<GeneratedTool>) -> Self {
        let mut tools: Vec<RegisteredTool> = generated
            .into_iter()
            .map(|tool| RegisteredTool {
                descriptor: ToolDescriptor {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema.clone(),
                    meta: Some(tool.meta()),
                },
                handler: ToolHandler::Generated(tool),
            })
            .collect();
        tools.extend(custom_tools());

        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if index.insert(tool.descriptor.name.clone(), position).is_some() {
                tracing::warn!("Duplicate tool name {}", tool.descriptor.name);
            }
        }

        tracing::info!("Registered {} tools", tools.len());
        Self { tools, index }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor.clone()).collect()
    }

    /// Run a tool by name.
    ///
    /// Unknown names are protocol errors. Malformed arguments and everything that goes
    /// wrong once the tool runs are reported inside the result.
    pub async fn call(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        context: &ToolContext<'_>,
    ) -> ServerResult<CallToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| ServerError::InvalidParams(format!("Unknown tool: {name}")))?;
        tracing::debug!("Calling tool {name}");

        let result = match &tool.handler {
            ToolHandler::Generated(generated) => generated.call(context.client, &arguments).await,
            ToolHandler::ServerInfo => {
                tools::server_info(context.base_url, context.total_endpoints, self.len())
                    .into_call_result()
            }
            ToolHandler::DatasetInfo => {
                let arguments = Value::Object(arguments);
                match parse_arguments::<DatasetInfoArgs>(name, &arguments) {
                    Some(args) => tools::get_dataset_info(context.client, &args.dataset_hdx_id)
                        .await
                        .into_call_result(),
                    None => DatasetEnvelope::invalid_arguments(&arguments).into_call_result(),
                }
            }
            ToolHandler::SearchLocations => {
                match parse_arguments::<LocationFilter>(name, &Value::Object(arguments)) {
                    Some(filter) => tools::search_locations(context.client, filter)
                        .await
                        .into_call_result(),
                    None => LocationSearchEnvelope::invalid_arguments().into_call_result(),
                }
            }
        };

        Ok(result)
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(tool: &str, arguments: &Value) -> Option<T> {
    match serde::Deserialize::deserialize(arguments) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!("Rejected arguments for {tool}: {err}");
            None
        }
    }
}

fn custom_tools() -> Vec<RegisteredTool> {
    let meta = Some(json!({ "tags": ["hdx", "humanitarian", "data"] }));

    vec![
        RegisteredTool {
            descriptor: ToolDescriptor {
                name: SERVER_INFO_TOOL.to_string(),
                description: "Get information about the HDX MCP server instance".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
                meta: meta.clone(),
            },
            handler: ToolHandler::ServerInfo,
        },
        RegisteredTool {
            descriptor: ToolDescriptor {
                name: DATASET_INFO_TOOL.to_string(),
                description: "Get detailed information about a specific HDX dataset".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "dataset_hdx_id": {"type": "string", "description": "The HDX dataset identifier"}
                    },
                    "required": ["dataset_hdx_id"],
                    "additionalProperties": false
                }),
                meta: meta.clone(),
            },
            handler: ToolHandler::DatasetInfo,
        },
        RegisteredTool {
            descriptor: ToolDescriptor {
                name: SEARCH_LOCATIONS_TOOL.to_string(),
                description: "Search for locations (countries) in the HDX system by name and \
                              Humanitarian Response Plan status"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "name_pattern": {"type": ["string", "null"], "description": "Case-insensitive substring of the location name"},
                        "has_hrp": {"type": ["boolean", "null"], "description": "Only locations with (true) or without (false) a Humanitarian Response Plan"}
                    },
                    "additionalProperties": false
                }),
                meta,
            },
            handler: ToolHandler::SearchLocations,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::generate_tools;

    fn registry() -> ToolRegistry {
        let document = json!({"paths": {
            "/api/v2/metadata/location": {"get": {"operationId": "metadata_location_get"}},
            "/api/v2/util/version": {"get": {"operationId": "hdx_server_info"}}
        }});
        ToolRegistry::new(generate_tools(&document, CUSTOM_TOOL_NAMES))
    }

    #[test]
    fn custom_tools_follow_generated_ones() {
        let names: Vec<_> = registry()
            .descriptors()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            [
                "metadata_location_get",
                "hdx_server_info_1",
                "hdx_server_info",
                "hdx_get_dataset_info",
                "hdx_search_locations"
            ]
        );
    }

    #[test]
    fn lookup_by_name() {
        let registry = registry();
        assert_eq!(registry.len(), 5);
        assert!(matches!(
            registry.get("hdx_search_locations").map(|t| &t.handler),
            Some(ToolHandler::SearchLocations)
        ));
        assert!(registry.get("missing").is_none());
    }
}
