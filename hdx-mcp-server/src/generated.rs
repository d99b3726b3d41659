//! Tools generated from the prepared OpenAPI document, one per operation.

use hdx_hapi::{APP_IDENTIFIER_PARAM, HapiClient, HapiError};
use reqwest::{Method, RequestBuilder};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use thiserror::Error;

use crate::protocol::CallToolResult;

const TOOL_METHODS: &[&str] = &["get", "post", "put", "patch", "delete"];
const MAX_TOOL_NAME_LEN: usize = 64;
const BASE_TAGS: &[&str] = &["hdx", "humanitarian", "data"];

/// Path category markers and the tags tools under them get.
const CATEGORY_TAGS: &[(&str, &[&str])] = &[
    ("/metadata/", &["metadata", "reference"]),
    ("/affected-people/", &["affected-people", "humanitarian"]),
    ("/climate/", &["climate", "environmental"]),
    ("/coordination-context/", &["coordination", "humanitarian"]),
    ("/food-security-nutrition-poverty/", &["food-security", "nutrition", "poverty"]),
    ("/geography-infrastructure/", &["geography", "infrastructure", "population"]),
    ("/util/", &["utility", "system"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
    Header,
    /// One property of a flattened JSON object body
    BodyField,
    /// The whole JSON body, for non-object body schemas
    Body,
}

#[derive(Debug, Clone)]
struct ToolParameter {
    name: String,
    location: ParamLocation,
    required: bool,
    schema: Value,
}

impl ToolParameter {
    fn default_value(&self) -> Option<&Value> {
        self.schema.get("default")
    }
}

/// A tool backed by one HAPI operation.
#[derive(Debug, Clone)]
pub struct GeneratedTool {
    pub name: String,
    pub description: String,
    pub method: Method,
    /// Path template as written in the document, e.g. `/api/v2/metadata/location`
    pub path: String,
    pub input_schema: Value,
    pub tags: Vec<String>,
    parameters: Vec<ToolParameter>,
}

#[derive(Debug, Error)]
enum InvocationError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error(transparent)]
    Client(#[from] HapiError),
}

/// Build one tool per `get|post|put|patch|delete` operation.
///
/// Names in `reserved` are never handed out, so generated tools cannot shadow the
/// hand-written ones.
pub fn generate_tools(document: &Value, reserved: &[&str]) -> Vec<GeneratedTool> {
    let mut tool_names: HashSet<String> = reserved.iter().map(|n| n.to_string()).collect();
    let mut tools = Vec::new();

    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return tools;
    };

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for (method, operation) in item {
            if !TOOL_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Some(operation) = operation.as_object() else {
                continue;
            };
            let Ok(http_method) = Method::from_bytes(method.to_uppercase().as_bytes()) else {
                continue;
            };

            let tool = generate_tool(path, method, http_method, item, operation, &mut tool_names);
            tracing::debug!(
                "Generated tool {} for {} {}",
                tool.name,
                method.to_uppercase(),
                path
            );
            tools.push(tool);
        }
    }

    tracing::info!("Generated {} tools from the OpenAPI document", tools.len());
    tools
}

fn generate_tool(
    path: &str,
    method: &str,
    http_method: Method,
    path_item: &Map<String, Value>,
    operation: &Map<String, Value>,
    tool_names: &mut HashSet<String>,
) -> GeneratedTool {
    let base_name = operation
        .get("operationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generate_canonical_name(method, path));
    let name = reserve_unique_tool_name(tool_names, &base_name);

    let description = ["summary", "description"]
        .iter()
        .find_map(|key| operation.get(*key).and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Calls {} {}", method.to_uppercase(), path));

    let mut parameters: Vec<ToolParameter> = merge_parameters(path_item, operation)
        .into_iter()
        .filter_map(extract_parameter)
        .filter(|p| p.name != APP_IDENTIFIER_PARAM)
        .collect();

    let taken: HashSet<String> = parameters.iter().map(|p| p.name.clone()).collect();
    parameters.extend(body_parameters(operation, &taken));

    GeneratedTool {
        input_schema: build_input_schema(&parameters),
        tags: tags_for_path(path),
        name,
        description,
        method: http_method,
        path: path.to_string(),
        parameters,
    }
}

fn parameter_list(object: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    object
        .get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Path-item parameters overlaid by operation parameters with the same name and location.
fn merge_parameters<'a>(
    path_item: &'a Map<String, Value>,
    operation: &'a Map<String, Value>,
) -> Vec<&'a Map<String, Value>> {
    fn key(p: &Map<String, Value>) -> (Option<&Value>, Option<&Value>) {
        (p.get("name"), p.get("in"))
    }

    let mut merged: Vec<&Map<String, Value>> = Vec::new();
    for parameter in parameter_list(path_item).chain(parameter_list(operation)) {
        match merged.iter().position(|m| key(m) == key(parameter)) {
            Some(index) => merged[index] = parameter,
            None => merged.push(parameter),
        }
    }
    merged
}

fn extract_parameter(parameter: &Map<String, Value>) -> Option<ToolParameter> {
    let name = parameter.get("name").and_then(Value::as_str)?;
    let location = match parameter.get("in").and_then(Value::as_str)? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        "header" => ParamLocation::Header,
        other => {
            tracing::debug!("Skipping {other} parameter {name}");
            return None;
        }
    };

    let required = location == ParamLocation::Path
        || parameter
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);

    let mut schema = parameter.get("schema").cloned().unwrap_or_else(|| json!({}));
    if let (Some(obj), Some(description)) = (
        schema.as_object_mut(),
        parameter.get("description").and_then(Value::as_str),
    ) && !obj.contains_key("description")
    {
        obj.insert("description".to_string(), json!(description));
    }

    Some(ToolParameter {
        name: name.to_string(),
        location,
        required,
        schema,
    })
}

fn body_parameters(operation: &Map<String, Value>, taken: &HashSet<String>) -> Vec<ToolParameter> {
    let Some(body) = operation.get("requestBody") else {
        return Vec::new();
    };
    let Some(schema) = body.pointer("/content/application~1json/schema") else {
        return Vec::new();
    };
    let body_required = body.get("required").and_then(Value::as_bool).unwrap_or(false);

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        if taken.contains("body") {
            return Vec::new();
        }
        return vec![ToolParameter {
            name: "body".to_string(),
            location: ParamLocation::Body,
            required: body_required,
            schema: schema.clone(),
        }];
    };

    let required_fields: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    properties
        .iter()
        .filter(|(name, _)| {
            let clash = taken.contains(name.as_str());
            if clash {
                tracing::warn!("Body property {name} collides with a parameter; skipping it");
            }
            !clash && name.as_str() != APP_IDENTIFIER_PARAM
        })
        .map(|(name, property)| ToolParameter {
            name: name.clone(),
            location: ParamLocation::BodyField,
            required: body_required && required_fields.contains(name.as_str()),
            schema: property.clone(),
        })
        .collect()
}

fn build_input_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(param.name.clone());
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn tags_for_path(path: &str) -> Vec<String> {
    let mut tags: Vec<String> = BASE_TAGS.iter().map(|t| t.to_string()).collect();
    for (marker, category_tags) in CATEGORY_TAGS {
        if path.contains(marker) {
            for tag in *category_tags {
                if !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
            }
        }
    }
    tags
}

/// `<method>_<path>` with every run of non-alphanumerics collapsed to `_`.
fn generate_canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);

    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }

    let mut name = name.trim_matches('_').to_string();
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

fn reserve_unique_tool_name(tool_names: &mut HashSet<String>, base: &str) -> String {
    if tool_names.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if tool_names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Caller-facing message for a failed upstream call. Never carries the upstream body.
pub(crate) fn upstream_failure_message(status: Option<u16>) -> String {
    match status {
        Some(status) => format!("HDX API request failed (HTTP {status})"),
        None => "HDX API request failed".to_string(),
    }
}

impl GeneratedTool {
    /// `_meta` entry advertised in `tools/list`.
    pub fn meta(&self) -> Value {
        json!({ "tags": self.tags })
    }

    /// Run the operation with the given arguments.
    pub async fn call(&self, client: &HapiClient, arguments: &Map<String, Value>) -> CallToolResult {
        let outcome = match self.build_request(client, arguments) {
            Ok(request) => client.send_text(request).await.map_err(InvocationError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(body) => {
                tracing::debug!(tool = %self.name, bytes = body.len(), "tool call succeeded");
                CallToolResult::from_body(body)
            }
            Err(err @ InvocationError::MissingArgument(_)) => CallToolResult::error(err.to_string()),
            Err(InvocationError::Client(err)) => {
                tracing::error!(tool = %self.name, "HAPI request failed: {err}");
                CallToolResult::error(upstream_failure_message(err.status()))
            }
        }
    }

    fn build_request(
        &self,
        client: &HapiClient,
        arguments: &Map<String, Value>,
    ) -> Result<RequestBuilder, InvocationError> {
        let mut path = self.path.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body_fields = Map::new();
        let mut body: Option<Value> = None;

        for param in &self.parameters {
            let value = match arguments.get(&param.name) {
                Some(Value::Null) | None => match param.location {
                    ParamLocation::Query => param.default_value().cloned(),
                    _ => None,
                },
                Some(value) => Some(value.clone()),
            };

            let Some(value) = value else {
                if param.required {
                    return Err(InvocationError::MissingArgument(param.name.clone()));
                }
                continue;
            };

            match param.location {
                ParamLocation::Path => {
                    let encoded = urlencoding::encode(&value_to_string(&value)).into_owned();
                    path = path.replace(&format!("{{{}}}", param.name), &encoded);
                }
                ParamLocation::Query => match &value {
                    Value::Array(items) => query.extend(
                        items
                            .iter()
                            .map(|item| (param.name.clone(), value_to_string(item))),
                    ),
                    other => query.push((param.name.clone(), value_to_string(other))),
                },
                ParamLocation::Header => headers.push((param.name.clone(), value_to_string(&value))),
                ParamLocation::BodyField => {
                    body_fields.insert(param.name.clone(), value);
                }
                ParamLocation::Body => body = Some(value),
            }
        }

        let mut request = client.request(self.method.clone(), &path)?;
        if !query.is_empty() {
            request = request.query(&query);
        }
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.json(&body);
        } else if !body_fields.is_empty() {
            request = request.json(&Value::Object(body_fields));
        }

        Ok(request)
    }
}
