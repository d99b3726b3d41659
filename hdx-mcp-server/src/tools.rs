//! Hand-written tools registered next to the generated ones.
//!
//! Every tool answers with an envelope carrying `status`. Failures are logged here
//! in full and returned to the caller as a fixed message plus, at most, the upstream
//! HTTP status code.

use hdx_hapi::{HapiClient, Location};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::CallToolResult;

pub const SERVER_INFO_TOOL: &str = "hdx_server_info";
pub const DATASET_INFO_TOOL: &str = "hdx_get_dataset_info";
pub const SEARCH_LOCATIONS_TOOL: &str = "hdx_search_locations";

pub const SERVER_DISPLAY_NAME: &str = "HDX MCP Server";

const SEARCH_FAILED: &str = "Failed to search locations";
const DATASET_FAILED: &str = "Failed to fetch dataset information";
const DATASET_NOT_FOUND: &str = "Dataset not found";
const DATASET_ID_BLANK: &str = "dataset_hdx_id must not be blank";
const INVALID_ARGUMENTS: &str = "Invalid tool arguments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Envelope types that can be handed back as a tool result.
pub trait Envelope: Serialize {
    fn status(&self) -> Status;

    fn into_call_result(self) -> CallToolResult
    where
        Self: Sized,
    {
        let is_error = self.status() == Status::Error;
        match serde_json::to_value(&self) {
            Ok(value) => CallToolResult::from_value(value, is_error),
            Err(err) => {
                tracing::error!("failed to serialize tool envelope: {err}");
                CallToolResult::error("Internal error")
            }
        }
    }
}

/// Location search criteria. Both parts are optional and combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFilter {
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub has_hrp: Option<bool>,
}

impl LocationFilter {
    pub fn new(name_pattern: Option<&str>, has_hrp: Option<bool>) -> Self {
        Self {
            name_pattern: name_pattern.map(str::to_string),
            has_hrp,
        }
    }

    /// Case-insensitive substring match on the name and exact match on the HRP flag.
    /// An empty pattern matches every name.
    pub fn matches(&self, location: &Location) -> bool {
        let name_matches = match self.name_pattern.as_deref() {
            None | Some("") => true,
            Some(pattern) => location
                .name
                .to_lowercase()
                .contains(&pattern.to_lowercase()),
        };
        let hrp_matches = self.has_hrp.is_none_or(|wanted| location.has_hrp == wanted);

        name_matches && hrp_matches
    }
}

/// Keep the locations matching `filter`, in their original order.
pub fn filter_locations(locations: Vec<Location>, filter: &LocationFilter) -> Vec<Location> {
    locations
        .into_iter()
        .filter(|location| filter.matches(location))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSearchEnvelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub filters_applied: LocationFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl LocationSearchEnvelope {
    /// Error envelope for arguments that do not fit [`LocationFilter`]. No call is made.
    pub fn invalid_arguments() -> Self {
        Self {
            status: Status::Error,
            locations: None,
            count: None,
            filters_applied: LocationFilter::default(),
            message: Some(INVALID_ARGUMENTS.to_string()),
            upstream_status: None,
        }
    }
}

impl Envelope for LocationSearchEnvelope {
    fn status(&self) -> Status {
        self.status
    }
}

/// Fetch every location and filter locally.
///
/// One upstream request per call, no query filters, nothing cached.
pub async fn search_locations(client: &HapiClient, filter: LocationFilter) -> LocationSearchEnvelope {
    match client.metadata_locations().await {
        Ok(locations) => {
            let fetched = locations.len();
            let locations = filter_locations(locations, &filter);
            tracing::debug!(
                fetched,
                matched = locations.len(),
                "location search finished"
            );
            LocationSearchEnvelope {
                status: Status::Success,
                count: Some(locations.len()),
                locations: Some(locations),
                filters_applied: filter,
                message: None,
                upstream_status: None,
            }
        }
        Err(err) => {
            tracing::error!(
                name_pattern = ?filter.name_pattern,
                has_hrp = ?filter.has_hrp,
                "Error searching locations: {err}"
            );
            LocationSearchEnvelope {
                status: Status::Error,
                locations: None,
                count: None,
                filters_applied: filter,
                message: Some(SEARCH_FAILED.to_string()),
                upstream_status: err.status(),
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetInfoArgs {
    #[serde(default)]
    pub dataset_hdx_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetEnvelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Value>,
    pub dataset_hdx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl DatasetEnvelope {
    fn failure(dataset_hdx_id: &str, message: &str, upstream_status: Option<u16>) -> Self {
        Self {
            status: Status::Error,
            dataset: None,
            dataset_hdx_id: dataset_hdx_id.to_string(),
            message: Some(message.to_string()),
            upstream_status,
        }
    }
}

impl DatasetEnvelope {
    /// Error envelope for arguments that do not fit [`DatasetInfoArgs`]. No call is made.
    pub fn invalid_arguments(arguments: &Value) -> Self {
        let dataset_hdx_id = arguments
            .get("dataset_hdx_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Self::failure(dataset_hdx_id, INVALID_ARGUMENTS, None)
    }
}

impl Envelope for DatasetEnvelope {
    fn status(&self) -> Status {
        self.status
    }
}

/// Look up one dataset. Blank ids are rejected without calling HAPI.
pub async fn get_dataset_info(client: &HapiClient, dataset_hdx_id: &str) -> DatasetEnvelope {
    if dataset_hdx_id.trim().is_empty() {
        return DatasetEnvelope::failure(dataset_hdx_id, DATASET_ID_BLANK, None);
    }

    match client.metadata_dataset(dataset_hdx_id).await {
        Ok(records) => match records.into_iter().next() {
            Some(dataset) => DatasetEnvelope {
                status: Status::Success,
                dataset: Some(dataset),
                dataset_hdx_id: dataset_hdx_id.to_string(),
                message: None,
                upstream_status: None,
            },
            None => DatasetEnvelope::failure(dataset_hdx_id, DATASET_NOT_FOUND, None),
        },
        Err(err) => {
            tracing::error!("Error fetching dataset info for {dataset_hdx_id}: {err}");
            DatasetEnvelope::failure(dataset_hdx_id, DATASET_FAILED, err.status())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub status: Status,
    pub server_name: &'static str,
    pub version: &'static str,
    pub base_url: String,
    pub total_endpoints: usize,
    pub total_tools: usize,
    pub available_tools: &'static str,
    pub description: &'static str,
}

impl Envelope for ServerInfo {
    fn status(&self) -> Status {
        self.status
    }
}

/// Static description of this process. Makes no outbound call.
pub fn server_info(base_url: &str, total_endpoints: usize, total_tools: usize) -> ServerInfo {
    ServerInfo {
        status: Status::Success,
        server_name: SERVER_DISPLAY_NAME,
        version: env!("CARGO_PKG_VERSION"),
        base_url: base_url.to_string(),
        total_endpoints,
        total_tools,
        available_tools: "Multiple tools available (see tools/list)",
        description: "MCP server for the Humanitarian Data Exchange API",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Location> {
        vec![
            Location::new("AFG", "Afghanistan", true),
            Location::new("SYR", "Syria", false),
        ]
    }

    fn codes(locations: &[Location]) -> Vec<&str> {
        locations.iter().map(|l| l.code.as_str()).collect()
    }

    #[test]
    fn pattern_is_case_insensitive() {
        let found = filter_locations(sample(), &LocationFilter::new(Some("AF"), None));
        assert_eq!(codes(&found), ["AFG"]);
        let found = filter_locations(sample(), &LocationFilter::new(Some("sYr"), None));
        assert_eq!(codes(&found), ["SYR"]);
    }

    #[test]
    fn hrp_flag_matches_exactly() {
        let found = filter_locations(sample(), &LocationFilter::new(None, Some(true)));
        assert_eq!(codes(&found), ["AFG"]);
        let found = filter_locations(sample(), &LocationFilter::new(None, Some(false)));
        assert_eq!(codes(&found), ["SYR"]);
    }

    #[test]
    fn criteria_combine_with_and() {
        let found = filter_locations(sample(), &LocationFilter::new(Some("a"), Some(false)));
        assert_eq!(codes(&found), ["SYR"]);
        let found = filter_locations(sample(), &LocationFilter::new(Some("af"), Some(false)));
        assert!(found.is_empty());
    }

    #[test]
    fn empty_pattern_is_no_filter() {
        let absent = filter_locations(sample(), &LocationFilter::default());
        let empty = filter_locations(sample(), &LocationFilter::new(Some(""), None));
        assert_eq!(absent, empty);
        assert_eq!(codes(&absent), ["AFG", "SYR"]);
    }

    #[test]
    fn order_is_preserved() {
        let locations = vec![
            Location::new("ZWE", "Zimbabwe", false),
            Location::new("AFG", "Afghanistan", true),
            Location::new("MOZ", "Mozambique", true),
        ];
        let found = filter_locations(locations, &LocationFilter::new(Some("m"), None));
        assert_eq!(codes(&found), ["ZWE", "MOZ"]);
    }

    #[test]
    fn filters_applied_keeps_nulls() {
        let value = serde_json::to_value(LocationFilter::new(Some("af"), None)).unwrap();
        assert_eq!(value, json!({"name_pattern": "af", "has_hrp": null}));
    }

    #[test]
    fn error_envelopes_omit_payload() {
        let envelope = DatasetEnvelope::failure("abc", DATASET_FAILED, Some(503));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "error",
                "dataset_hdx_id": "abc",
                "message": "Failed to fetch dataset information",
                "upstream_status": 503
            })
        );

        let result = envelope.into_call_result();
        assert!(result.is_error);
    }

    #[test]
    fn server_info_is_static() {
        let info = server_info("https://hapi.humdata.org/api/v2", 26, 29);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["server_name"], "HDX MCP Server");
        assert_eq!(value["total_endpoints"], 26);
        assert_eq!(value["total_tools"], 29);
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    }
}
