use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A country-level location record from `/metadata/location`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// ISO3 code, e.g. `AFG`
    pub code: String,
    /// Display name
    pub name: String,
    /// Whether the location has a Humanitarian Response Plan
    pub has_hrp: bool,
    /// Remaining upstream fields (`in_gho`, reference periods, ...), passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn new(code: impl Into<String>, name: impl Into<String>, has_hrp: bool) -> Location {
        Location {
            code: code.into(),
            name: name.into(),
            has_hrp,
            extra: Map::new(),
        }
    }
}
