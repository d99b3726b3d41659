//! Async client for the HDX Humanitarian API (HAPI).
//!
//! ```rust,no_run
//! use hdx_hapi::{Configuration, HapiClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), hdx_hapi::HapiError> {
//! let config = Configuration::new("my-api-key").with_app_identity("my-app", "me@example.org");
//! let client = HapiClient::new(Arc::new(config))?;
//!
//! for location in client.metadata_locations().await? {
//!     println!("{} {} (HRP: {})", location.code, location.name, location.has_hrp);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod models;

pub use client::{ApiKey, Configuration, HapiClient, HapiError, encode_app_identifier};
pub use models::{HapiResponse, Location};

/// Production HAPI base URL (v2).
pub const HAPI_BASE_URL: &str = "https://hapi.humdata.org/api/v2";

/// Location of the HAPI OpenAPI document.
pub const HAPI_OPENAPI_URL: &str = "https://hapi.humdata.org/openapi.json";

/// Header carrying the API key on every request.
pub const APP_IDENTIFIER_HEADER: &str = "X-HDX-HAPI-APP-IDENTIFIER";

/// Query parameter carrying the encoded application identity.
pub const APP_IDENTIFIER_PARAM: &str = "app_identifier";
