mod location;

pub use location::Location;

use serde::{Deserialize, Serialize};

/// Standard HAPI list envelope: `{"data": [...]}`.
///
/// A body without a `data` key is rejected as malformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HapiResponse<T> {
    pub data: Vec<T>,
}
