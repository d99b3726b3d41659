//! Fetching and preparing the HAPI OpenAPI document.
//!
//! The document is pulled once at startup, then run through a fixed sequence of pure
//! `Value -> Value` passes before tools are generated from it:
//!
//! 1. drop excluded operations (the app-identifier helper endpoint),
//! 2. inline `#/components/schemas` references,
//! 3. set friendlier parameter defaults,
//! 4. shorten operation ids so they make good tool names,
//! 5. rewrite doc links in descriptions into tool references,
//! 6. append usage guidance to operation summaries.

use regex::Regex;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value, json};
use std::time::Duration;
use thiserror::Error;

/// Operations whose path ends with one of these are never exposed.
pub const EXCLUDED_PATH_SUFFIXES: &[&str] = &["/encode_app_identifier"];

pub(crate) const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";
const MAX_REF_DEPTH: usize = 10;

const DEFAULT_LIMIT: i64 = 10;

/// Known HAPI paths and the tool names their operations should get.
const OPERATION_IDS: &[(&str, &str)] = &[
    ("/api/v2/affected-people/refugees-persons-of-concern", "affected_people_refugees_get"),
    ("/api/v2/affected-people/humanitarian-needs", "affected_people_humanitarian_needs_get"),
    ("/api/v2/affected-people/idps", "affected_people_idps_get"),
    ("/api/v2/affected-people/returnees", "affected_people_returnees_get"),
    ("/api/v2/coordination-context/operational-presence", "coordination_operational_presence_get"),
    ("/api/v2/coordination-context/funding", "coordination_funding_get"),
    ("/api/v2/coordination-context/conflict-events", "coordination_conflict_events_get"),
    ("/api/v2/coordination-context/national-risk", "coordination_national_risk_get"),
    ("/api/v2/food-security-nutrition-poverty/food-security", "food_security_get"),
    ("/api/v2/food-security-nutrition-poverty/food-prices-market-monitor", "food_prices_get"),
    ("/api/v2/food-security-nutrition-poverty/poverty-rate", "poverty_rate_get"),
    ("/api/v2/geography-infrastructure/baseline-population", "baseline_population_get"),
    ("/api/v2/climate/rainfall", "climate_rainfall_get"),
    ("/api/v2/metadata/dataset", "metadata_dataset_get"),
    ("/api/v2/metadata/resource", "metadata_resource_get"),
    ("/api/v2/metadata/location", "metadata_location_get"),
    ("/api/v2/metadata/admin1", "metadata_admin1_get"),
    ("/api/v2/metadata/admin2", "metadata_admin2_get"),
    ("/api/v2/metadata/currency", "metadata_currency_get"),
    ("/api/v2/metadata/org", "metadata_org_get"),
    ("/api/v2/metadata/org-type", "metadata_org_type_get"),
    ("/api/v2/metadata/sector", "metadata_sector_get"),
    ("/api/v2/metadata/wfp-commodity", "metadata_wfp_commodity_get"),
    ("/api/v2/metadata/wfp-market", "metadata_wfp_market_get"),
    ("/api/v2/metadata/data-availability", "metadata_data_availability_get"),
    ("/api/v2/util/version", "util_version_get"),
];

/// A metadata endpoint that other operations point readers to.
struct MetadataReference {
    /// Anchor prefix in the interactive docs, as a regex fragment
    anchor: &'static str,
    /// Middle part of the tool name, `metadata_<tool>_get`
    tool: &'static str,
    /// How the descriptions name the endpoint
    label: &'static str,
    /// What the tool lists
    provides: &'static str,
}

// Order matters: "org type" must be rewritten before "org".
const METADATA_REFERENCES: &[MetadataReference] = &[
    MetadataReference { anchor: "get_locations?", tool: "location", label: "location", provides: "location codes and names" },
    MetadataReference { anchor: "get_admin1", tool: "admin1", label: "admin1", provides: "admin1 codes and names" },
    MetadataReference { anchor: "get_admin2", tool: "admin2", label: "admin2", provides: "admin2 codes and names" },
    MetadataReference { anchor: "get_org_type", tool: "org_type", label: "org type", provides: "organization type codes and descriptions" },
    MetadataReference { anchor: "get_orgs?", tool: "org", label: "org", provides: "organization codes and names" },
    MetadataReference { anchor: "get_sectors?", tool: "sector", label: "sector", provides: "sector codes and names" },
    MetadataReference { anchor: "get_currencies?", tool: "currency", label: "currency", provides: "currency codes" },
    MetadataReference { anchor: "get_wfp_commodities?", tool: "wfp_commodity", label: "wfp commodity", provides: "WFP commodity codes and names" },
    MetadataReference { anchor: "get_wfp_markets?", tool: "wfp_market", label: "wfp market", provides: "WFP market codes and names" },
    MetadataReference { anchor: "get_datasets?", tool: "dataset", label: "dataset", provides: "dataset information" },
    MetadataReference { anchor: "get_resources?", tool: "resource", label: "resource", provides: "resource information" },
];

const DATA_ENDPOINT_MARKERS: &[&str] = &[
    "affected-people",
    "baseline-population",
    "humanitarian-needs",
    "refugees",
    "idps",
    "returnees",
    "population",
    "food-security",
    "nutrition",
    "poverty",
    "conflict",
    "funding",
];

const LOCATION_ENDPOINT_MARKERS: &[&str] = &["location", "admin1", "admin2"];

const DATA_GUIDANCE: &str = "\n\n**Data coverage**: only metadata_data_availability_get tells \
whether a country actually has data; being listed as a location is not enough. Check it before \
querying.\n\n**Admin levels**: for totals and country-wide figures, query the lowest admin level \
that has data (0 = country, 1 = state/province, 2 = district). Do not pull admin level 2 records \
when level 0 or 1 answers the question.";

const LOCATION_GUIDANCE: &str = "\n\n**Data coverage**: appearing in location metadata does not \
mean a country has data. Confirm with metadata_data_availability_get before making data queries.";

const PAGINATION_GUIDANCE: &str = "\n\n**Pagination**: page through results with `limit` \
(records per page) and `offset` (starting position).";

#[derive(Debug, Error)]
pub enum OpenApiError {
    #[error("failed to fetch OpenAPI document from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("OpenAPI document at {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("OpenAPI document at {url} is not valid JSON: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("OpenAPI document has no `paths` object")]
    MissingPaths,

    #[error("invalid description pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Download the OpenAPI document.
pub async fn fetch_document(url: &str, timeout: Duration) -> Result<Value, OpenApiError> {
    tracing::info!("Loading HAPI OpenAPI document from {url}");

    let fetch_error = |source| OpenApiError::Fetch {
        url: url.to_string(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(fetch_error)?;

    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(fetch_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(OpenApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(fetch_error)?;
    serde_json::from_str(&body).map_err(|source| OpenApiError::Parse {
        url: url.to_string(),
        source,
    })
}

/// Run every preparation pass over a freshly fetched document.
pub fn prepare_document(document: Value) -> Result<Value, OpenApiError> {
    if !document.get("paths").is_some_and(Value::is_object) {
        return Err(OpenApiError::MissingPaths);
    }

    let document = exclude_operations(document, EXCLUDED_PATH_SUFFIXES);
    let document = inline_schema_refs(document);
    let document = apply_parameter_defaults(document);
    let document = simplify_operation_ids(document);
    let document = rewrite_descriptions(document)?;
    let document = add_guidance(document);

    tracing::info!(
        "Prepared OpenAPI document with {} endpoints",
        path_count(&document)
    );
    Ok(document)
}

/// Number of path items in the document.
pub fn path_count(document: &Value) -> usize {
    document
        .get("paths")
        .and_then(Value::as_object)
        .map_or(0, Map::len)
}

fn for_each_operation<F>(document: &mut Value, mut f: F)
where
    F: FnMut(&str, &str, &mut Map<String, Value>),
{
    let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) else {
        return;
    };

    for (path, item) in paths.iter_mut() {
        let Some(item) = item.as_object_mut() else {
            continue;
        };
        for (method, operation) in item.iter_mut() {
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }
            if let Some(operation) = operation.as_object_mut() {
                f(path, method, operation);
            }
        }
    }
}

/// Remove every path item whose path ends with one of `excluded_suffixes`.
pub fn exclude_operations(mut document: Value, excluded_suffixes: &[&str]) -> Value {
    let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) else {
        return document;
    };

    paths.retain(|path, _| {
        let excluded = excluded_suffixes.iter().any(|suffix| path.ends_with(suffix));
        if excluded {
            tracing::debug!("Excluding {path} from tool generation");
        }
        !excluded
    });

    document
}

/// Replace `#/components/schemas/*` references in parameter, request-body and response
/// schemas with copies of the referenced schema.
///
/// Keys next to a `$ref` (typically `description`) override the referenced schema's.
/// References that cannot be resolved are kept as they are.
pub fn inline_schema_refs(mut document: Value) -> Value {
    let schemas = document
        .pointer("/components/schemas")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut inlined = 0usize;
    for_each_operation(&mut document, |_, _, operation| {
        if let Some(Value::Array(parameters)) = operation.get_mut("parameters") {
            for parameter in parameters.iter_mut() {
                if let Some(schema) = parameter.get_mut("schema") {
                    *schema = resolve_refs(schema, &schemas, 0);
                    inlined += 1;
                }
            }
        }

        let mut resolve_content = |content: &mut Map<String, Value>| {
            for media_type in content.values_mut() {
                if let Some(schema) = media_type.get_mut("schema") {
                    *schema = resolve_refs(schema, &schemas, 0);
                    inlined += 1;
                }
            }
        };

        if let Some(Value::Object(content)) = operation
            .get_mut("requestBody")
            .and_then(|body| body.get_mut("content"))
        {
            resolve_content(content);
        }
        if let Some(Value::Object(responses)) = operation.get_mut("responses") {
            for response in responses.values_mut() {
                if let Some(Value::Object(content)) = response.get_mut("content") {
                    resolve_content(content);
                }
            }
        }
    });

    tracing::info!("Inlined schema references in {inlined} schemas");
    document
}

fn resolve_refs(value: &Value, schemas: &Map<String, Value>, depth: usize) -> Value {
    match value {
        Value::Object(object) => {
            if let Some(Value::String(reference)) = object.get("$ref") {
                let target = reference
                    .strip_prefix(SCHEMA_REF_PREFIX)
                    .and_then(|name| schemas.get(name));

                let Some(target) = target else {
                    if reference.starts_with(SCHEMA_REF_PREFIX) {
                        tracing::warn!("Schema {reference} not found in components/schemas");
                    }
                    return value.clone();
                };

                if depth >= MAX_REF_DEPTH {
                    tracing::warn!("Stopped inlining {reference}: nesting deeper than {MAX_REF_DEPTH}");
                    return value.clone();
                }

                let mut resolved = target.clone();
                if let Value::Object(resolved) = &mut resolved {
                    for (key, sibling) in object.iter().filter(|(key, _)| *key != "$ref") {
                        resolved.insert(key.clone(), sibling.clone());
                    }
                }
                return resolve_refs(&resolved, schemas, depth + 1);
            }

            Value::Object(
                object
                    .iter()
                    .map(|(key, child)| (key.clone(), resolve_refs(child, schemas, depth)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_refs(item, schemas, depth))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Default `limit` to 10 and `age_range`/`gender` to `"all"`.
pub fn apply_parameter_defaults(mut document: Value) -> Value {
    for_each_operation(&mut document, |path, method, operation| {
        let Some(Value::Array(parameters)) = operation.get_mut("parameters") else {
            return;
        };

        for parameter in parameters.iter_mut() {
            let default = match parameter.get("name").and_then(Value::as_str) {
                Some("limit") => json!(DEFAULT_LIMIT),
                Some("age_range") | Some("gender") => json!("all"),
                _ => continue,
            };
            if let Some(Value::Object(schema)) = parameter.get_mut("schema") {
                tracing::debug!(
                    "Set default {default} for {} {path}",
                    method.to_uppercase()
                );
                schema.insert("default".to_string(), default);
            }
        }
    });

    document
}

/// Swap the generated operation ids of known HAPI endpoints for short tool names.
pub fn simplify_operation_ids(mut document: Value) -> Value {
    let mut updated = 0usize;
    for_each_operation(&mut document, |path, _, operation| {
        let Some((_, simplified)) = OPERATION_IDS.iter().find(|(known, _)| *known == path) else {
            return;
        };
        if let Some(operation_id) = operation.get_mut("operationId") {
            *operation_id = Value::String((*simplified).to_string());
            updated += 1;
        }
    });

    tracing::info!("Simplified {updated} operation IDs");
    document
}

fn description_rewrites() -> Result<Vec<(Regex, String)>, regex::Error> {
    let mut rewrites = Vec::with_capacity(METADATA_REFERENCES.len() * 2);

    for reference in METADATA_REFERENCES {
        let pattern = format!(
            r#"See the <a href="/docs#/Metadata/{anchor}_api_v[12]_metadata_{tool}_get" target="_blank">{label} endpoint</a> for details\.?"#,
            anchor = reference.anchor,
            tool = reference.tool,
            label = regex::escape(reference.label),
        );
        let replacement = format!(
            "Use the metadata_{}_get tool to get available {}.",
            reference.tool, reference.provides
        );
        rewrites.push((Regex::new(&pattern)?, replacement));
    }

    for reference in METADATA_REFERENCES {
        let pattern = format!("{} endpoint", regex::escape(reference.label));
        let replacement = format!("metadata_{}_get tool", reference.tool);
        rewrites.push((Regex::new(&pattern)?, replacement));
    }

    Ok(rewrites)
}

/// Point descriptions at the metadata tools instead of the interactive API docs.
pub fn rewrite_descriptions(mut document: Value) -> Result<Value, OpenApiError> {
    let rewrites = description_rewrites()?;
    let mut updated = 0usize;

    for_each_operation(&mut document, |_, _, operation| {
        for value in operation.values_mut() {
            updated += rewrite_descriptions_in(value, &rewrites);
        }
    });
    if let Some(schemas) = document.pointer_mut("/components/schemas") {
        updated += rewrite_descriptions_in(schemas, &rewrites);
    }

    tracing::info!("Updated {updated} descriptions to reference MCP tools");
    Ok(document)
}

fn rewrite_descriptions_in(value: &mut Value, rewrites: &[(Regex, String)]) -> usize {
    let mut updated = 0;
    match value {
        Value::Object(object) => {
            if let Some(Value::String(description)) = object.get_mut("description") {
                let mut text = description.clone();
                for (pattern, replacement) in rewrites {
                    if let std::borrow::Cow::Owned(rewritten) =
                        pattern.replace_all(&text, replacement.as_str())
                    {
                        text = rewritten;
                    }
                }
                if text != *description {
                    *description = text;
                    updated += 1;
                }
            }
            for child in object.values_mut() {
                updated += rewrite_descriptions_in(child, rewrites);
            }
        }
        Value::Array(items) => {
            for item in items {
                updated += rewrite_descriptions_in(item, rewrites);
            }
        }
        _ => {}
    }
    updated
}

/// Append coverage, admin-level and pagination notes to operation summaries.
///
/// Operations without a summary get the notes on their description instead. Running the
/// pass twice leaves the document unchanged.
pub fn add_guidance(mut document: Value) -> Value {
    let mut touched = 0usize;

    for_each_operation(&mut document, |path, _, operation| {
        if path.contains("app-identifier") {
            return;
        }

        let is_data = DATA_ENDPOINT_MARKERS.iter().any(|m| path.contains(m));
        let is_location = LOCATION_ENDPOINT_MARKERS.iter().any(|m| path.contains(m));

        let (field, notes): (&str, Vec<&str>) = if operation.get("summary").is_some_and(Value::is_string) {
            let topical = if is_data {
                Some(DATA_GUIDANCE)
            } else if is_location {
                Some(LOCATION_GUIDANCE)
            } else {
                None
            };
            ("summary", topical.into_iter().chain([PAGINATION_GUIDANCE]).collect())
        } else if operation.get("description").is_some_and(Value::is_string) {
            let topical = is_location.then_some(LOCATION_GUIDANCE);
            ("description", topical.into_iter().chain([PAGINATION_GUIDANCE]).collect())
        } else {
            return;
        };

        if let Some(Value::String(text)) = operation.get_mut(field) {
            let before = text.len();
            for note in notes {
                if !text.contains(note) {
                    text.push_str(note);
                }
            }
            if text.len() != before {
                touched += 1;
            }
        }
    });

    tracing::info!("Added usage guidance to {touched} operations");
    document
}
